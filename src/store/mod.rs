pub mod dual;
pub mod filelock;
pub mod gittree;
pub mod local;
pub mod records;
pub mod shared;
pub mod sync;

use tracing::warn;

use crate::error::{CtxError, Result};
use crate::model::{Lock, Memory, Origin, Task};

/// Mutation applied by [`Storage::update_task`]; an error aborts the update
/// and leaves the persisted task untouched.
pub type TaskMutator<'a> = dyn FnMut(&mut Task) -> Result<()> + 'a;

/// The capability set every backend provides, per entity kind.
///
/// Reads report `NotFound` for absent entries and `Corrupt` for entries that
/// exist but do not parse. Listings treat a missing storage area as empty and
/// skip corrupt entries. Entity `shared` flags always reflect [`Storage::origin`].
pub trait Storage {
    fn origin(&self) -> Origin;

    fn write_memory(&self, memory: &Memory) -> Result<()>;
    fn read_memory(&self, id: &str) -> Result<Memory>;
    fn list_memories(&self) -> Result<Vec<Memory>>;
    fn delete_memory(&self, id: &str) -> Result<()>;

    fn search_memories(&self, query: &str) -> Result<Vec<Memory>> {
        let mut memories = self.list_memories()?;
        memories.retain(|m| m.matches(query));
        Ok(memories)
    }

    fn write_task(&self, task: &Task) -> Result<()>;
    fn read_task(&self, id: &str) -> Result<Task>;
    fn list_tasks(&self) -> Result<Vec<Task>>;
    fn delete_task(&self, id: &str) -> Result<()>;

    fn search_tasks(&self, query: &str) -> Result<Vec<Task>> {
        let mut tasks = self.list_tasks()?;
        tasks.retain(|t| t.matches(query));
        Ok(tasks)
    }

    /// Read-modify-write of one task; returns the state that was written.
    fn update_task(&self, id: &str, mutate: &mut TaskMutator<'_>) -> Result<Task> {
        let mut task = self.read_task(id)?;
        mutate(&mut task)?;
        self.write_task(&task)?;
        Ok(task)
    }

    /// Upsert keyed by the lock target.
    fn write_lock(&self, lock: &Lock) -> Result<()>;
    fn read_lock(&self, target: &str) -> Result<Lock>;
    fn list_locks(&self) -> Result<Vec<Lock>>;
    fn delete_lock(&self, target: &str) -> Result<()>;
}

/// Keep listing past entries that fail to parse; anything else aborts.
pub(crate) fn keep_or_skip<T>(origin: Origin, outcome: Result<T>, out: &mut Vec<T>) -> Result<()> {
    match outcome {
        Ok(item) => out.push(item),
        Err(CtxError::Corrupt(location, reason)) => {
            warn!(%origin, %location, %reason, "skipping corrupt record");
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }
    Ok(())
}
