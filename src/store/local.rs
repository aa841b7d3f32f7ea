use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::entry_id;
use crate::error::{CtxError, Result};
use crate::model::{Lock, Memory, Origin, Task};
use crate::store::records::{self, CONTENT_FILE, LOCKS_DIR, MEMORY_DIR, META_FILE, TASKS_DIR};
use crate::store::filelock::{self, FileGuard};
use crate::store::{Storage, TaskMutator, keep_or_skip};

/// Private, never-synchronized storage under `<git-dir>/context/`.
///
/// Directories are created on first write; a missing directory lists as empty.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub const DIR_NAME: &'static str = "context";

    /// Open the store for a git directory. Nothing is created until the first write.
    pub fn open(git_dir: &Path) -> Self {
        Self {
            root: git_dir.join(Self::DIR_NAME),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn memory_dir(&self) -> PathBuf {
        self.root.join(MEMORY_DIR)
    }

    fn memory_entry_dir(&self, id: &str) -> PathBuf {
        self.memory_dir().join(id)
    }

    fn tasks_dir(&self) -> PathBuf {
        self.root.join(TASKS_DIR)
    }

    fn task_path(&self, id: &str) -> PathBuf {
        self.tasks_dir().join(records::task_file_name(id))
    }

    fn locks_dir(&self) -> PathBuf {
        self.root.join(LOCKS_DIR)
    }

    fn lock_path(&self, target: &str) -> PathBuf {
        self.locks_dir().join(records::lock_file_name(target))
    }

    /// Take the advisory file lock `<root>/<name>.lock` for a read-modify-write
    /// section. Contention surfaces as `Busy` instead of blocking.
    pub fn mutation_guard(&self, name: &str) -> Result<FileGuard> {
        fs::create_dir_all(&self.root)?;
        filelock::acquire(&self.root.join(format!("{name}.lock")), &format!("{name} update"))
    }

    fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Read a file, mapping "does not exist" to `Ok(None)`.
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Directory entries, or nothing if the directory has not been created yet.
fn read_dir_if_exists(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    match fs::read_dir(dir) {
        Ok(entries) => Ok(entries.collect::<io::Result<Vec<_>>>()?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(vec![]),
        Err(e) => Err(e.into()),
    }
}

impl Storage for LocalStore {
    fn origin(&self) -> Origin {
        Origin::Local
    }

    fn write_memory(&self, memory: &Memory) -> Result<()> {
        if !entry_id::is_storable(&memory.id) {
            return Err(CtxError::InvalidId(memory.id.clone()));
        }
        let dir = self.memory_entry_dir(&memory.id);
        fs::create_dir_all(&dir)?;
        let (meta, content) = records::encode_memory(memory)?;
        fs::write(dir.join(META_FILE), meta)?;
        fs::write(dir.join(CONTENT_FILE), content)?;
        debug!(id = %memory.id, "wrote local memory");
        Ok(())
    }

    fn read_memory(&self, id: &str) -> Result<Memory> {
        if !entry_id::is_storable(id) {
            return Err(CtxError::MemoryNotFound(id.to_string()));
        }
        let dir = self.memory_entry_dir(id);
        let meta = read_optional(&dir.join(META_FILE))?
            .ok_or_else(|| CtxError::MemoryNotFound(id.to_string()))?;
        let location = self.display(&dir);
        let content = read_optional(&dir.join(CONTENT_FILE))?.ok_or_else(|| {
            CtxError::Corrupt(location.clone(), format!("missing {CONTENT_FILE}"))
        })?;
        records::decode_memory(&location, &meta, &content, Origin::Local)
    }

    fn list_memories(&self) -> Result<Vec<Memory>> {
        let mut memories = Vec::new();
        for entry in read_dir_if_exists(&self.memory_dir())? {
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            keep_or_skip(Origin::Local, self.read_memory(&name.to_string_lossy()), &mut memories)?;
        }
        Ok(memories)
    }

    fn delete_memory(&self, id: &str) -> Result<()> {
        let dir = self.memory_entry_dir(id);
        if !entry_id::is_storable(id) || !dir.is_dir() {
            return Err(CtxError::MemoryNotFound(id.to_string()));
        }
        fs::remove_dir_all(dir)?;
        debug!(%id, "deleted local memory");
        Ok(())
    }

    fn write_task(&self, task: &Task) -> Result<()> {
        if !entry_id::is_storable(&task.id) {
            return Err(CtxError::InvalidId(task.id.clone()));
        }
        fs::create_dir_all(self.tasks_dir())?;
        fs::write(self.task_path(&task.id), records::encode_task(task)?)?;
        debug!(id = %task.id, status = %task.status, "wrote local task");
        Ok(())
    }

    fn read_task(&self, id: &str) -> Result<Task> {
        if !entry_id::is_storable(id) {
            return Err(CtxError::TaskNotFound(id.to_string()));
        }
        let path = self.task_path(id);
        let data = read_optional(&path)?.ok_or_else(|| CtxError::TaskNotFound(id.to_string()))?;
        records::decode_task(&self.display(&path), &data, Origin::Local)
    }

    fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for entry in read_dir_if_exists(&self.tasks_dir())? {
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = records::task_id_from_file_name(&name) {
                keep_or_skip(Origin::Local, self.read_task(id), &mut tasks)?;
            }
        }
        Ok(tasks)
    }

    fn delete_task(&self, id: &str) -> Result<()> {
        let path = self.task_path(id);
        if !entry_id::is_storable(id) || !path.is_file() {
            return Err(CtxError::TaskNotFound(id.to_string()));
        }
        fs::remove_file(path)?;
        debug!(%id, "deleted local task");
        Ok(())
    }

    fn update_task(&self, id: &str, mutate: &mut TaskMutator<'_>) -> Result<Task> {
        let guard = self.mutation_guard(TASKS_DIR)?;
        let mut task = self.read_task(id)?;
        mutate(&mut task)?;
        self.write_task(&task)?;
        guard.release()?;
        Ok(task)
    }

    fn write_lock(&self, lock: &Lock) -> Result<()> {
        fs::create_dir_all(self.locks_dir())?;
        fs::write(self.lock_path(&lock.target), records::encode_lock(lock)?)?;
        debug!(target = %lock.target, holder = %lock.locked_by, "wrote local lock");
        Ok(())
    }

    fn read_lock(&self, target: &str) -> Result<Lock> {
        let path = self.lock_path(target);
        let data =
            read_optional(&path)?.ok_or_else(|| CtxError::NotLocked(target.to_string()))?;
        let lock = records::decode_lock(&self.display(&path), &data)?;
        if lock.target != target {
            return Err(CtxError::NotLocked(target.to_string()));
        }
        Ok(lock)
    }

    fn list_locks(&self) -> Result<Vec<Lock>> {
        let mut locks = Vec::new();
        for entry in read_dir_if_exists(&self.locks_dir())? {
            let name = entry.file_name();
            if !entry.file_type()?.is_file() || !records::is_record_file(&name.to_string_lossy()) {
                continue;
            }
            let path = entry.path();
            let outcome = fs::read(&path)
                .map_err(CtxError::from)
                .and_then(|data| records::decode_lock(&self.display(&path), &data));
            keep_or_skip(Origin::Local, outcome, &mut locks)?;
        }
        Ok(locks)
    }

    /// Removes the record even when it no longer parses.
    fn delete_lock(&self, target: &str) -> Result<()> {
        let path = self.lock_path(target);
        if !path.is_file() {
            return Err(CtxError::NotLocked(target.to_string()));
        }
        fs::remove_file(path)?;
        debug!(%target, "deleted local lock");
        Ok(())
    }
}
