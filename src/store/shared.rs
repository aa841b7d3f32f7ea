use git2::Repository;
use tracing::debug;

use crate::entry_id;
use crate::error::{CtxError, Result};
use crate::identity;
use crate::model::{Lock, Memory, Origin, Task};
use crate::store::gittree::{self, Change, Snapshot};
use crate::store::records::{self, CONTENT_FILE, LOCKS_DIR, MEMORY_DIR, META_FILE, TASKS_DIR};
use crate::store::{Storage, TaskMutator, keep_or_skip};

/// Sync-eligible storage: the record layout committed as a tree on a git ref.
///
/// Every mutation is one commit on top of the current tip. If the ref moves
/// between the read and the commit, the write fails with `StaleRef`.
pub struct SharedStore {
    repo: Repository,
    refname: String,
}

pub(crate) fn memory_path(id: &str, file: &str) -> String {
    format!("{MEMORY_DIR}/{id}/{file}")
}

pub(crate) fn task_path(id: &str) -> String {
    format!("{TASKS_DIR}/{}", records::task_file_name(id))
}

pub(crate) fn lock_path(target: &str) -> String {
    format!("{LOCKS_DIR}/{}", records::lock_file_name(target))
}

impl SharedStore {
    pub fn open(repo: Repository, refname: impl Into<String>) -> Self {
        Self {
            repo,
            refname: refname.into(),
        }
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn refname(&self) -> &str {
        &self.refname
    }

    fn snapshot(&self) -> Result<Snapshot<'_>> {
        Snapshot::load(&self.repo, &self.refname)
    }

    fn commit(&self, base: &Snapshot<'_>, changes: &[Change], message: &str) -> Result<()> {
        let signature = identity::signature(&self.repo)?;
        let id = gittree::commit_changes(&self.repo, &self.refname, base, changes, &signature, message)?;
        debug!(refname = %self.refname, commit = %id, message, "committed shared change");
        Ok(())
    }

    fn memory_in(&self, snap: &Snapshot<'_>, id: &str) -> Result<Memory> {
        if !entry_id::is_storable(id) {
            return Err(CtxError::MemoryNotFound(id.to_string()));
        }
        let meta = snap
            .read(&memory_path(id, META_FILE))?
            .ok_or_else(|| CtxError::MemoryNotFound(id.to_string()))?;
        let location = format!("{}:{MEMORY_DIR}/{id}", self.refname);
        let content = snap.read(&memory_path(id, CONTENT_FILE))?.ok_or_else(|| {
            CtxError::Corrupt(location.clone(), format!("missing {CONTENT_FILE}"))
        })?;
        records::decode_memory(&location, &meta, &content, Origin::Shared)
    }

    fn task_in(&self, snap: &Snapshot<'_>, id: &str) -> Result<Task> {
        if !entry_id::is_storable(id) {
            return Err(CtxError::TaskNotFound(id.to_string()));
        }
        let path = task_path(id);
        let data = snap
            .read(&path)?
            .ok_or_else(|| CtxError::TaskNotFound(id.to_string()))?;
        records::decode_task(&format!("{}:{path}", self.refname), &data, Origin::Shared)
    }

    fn lock_in(&self, snap: &Snapshot<'_>, target: &str) -> Result<Lock> {
        let path = lock_path(target);
        let data = snap
            .read(&path)?
            .ok_or_else(|| CtxError::NotLocked(target.to_string()))?;
        let lock = records::decode_lock(&format!("{}:{path}", self.refname), &data)?;
        if lock.target != target {
            return Err(CtxError::NotLocked(target.to_string()));
        }
        Ok(lock)
    }
}

impl Storage for SharedStore {
    fn origin(&self) -> Origin {
        Origin::Shared
    }

    fn write_memory(&self, memory: &Memory) -> Result<()> {
        if !entry_id::is_storable(&memory.id) {
            return Err(CtxError::InvalidId(memory.id.clone()));
        }
        let (meta, content) = records::encode_memory(memory)?;
        let base = self.snapshot()?;
        self.commit(
            &base,
            &[
                Change::Put(memory_path(&memory.id, META_FILE), meta),
                Change::Put(memory_path(&memory.id, CONTENT_FILE), content),
            ],
            &format!("write memory {}", memory.id),
        )
    }

    fn read_memory(&self, id: &str) -> Result<Memory> {
        self.memory_in(&self.snapshot()?, id)
    }

    fn list_memories(&self) -> Result<Vec<Memory>> {
        let snap = self.snapshot()?;
        let mut memories = Vec::new();
        for (name, is_dir) in snap.list_dir(MEMORY_DIR)? {
            if is_dir {
                keep_or_skip(Origin::Shared, self.memory_in(&snap, &name), &mut memories)?;
            }
        }
        Ok(memories)
    }

    fn delete_memory(&self, id: &str) -> Result<()> {
        let base = self.snapshot()?;
        let dir = format!("{MEMORY_DIR}/{id}");
        if !entry_id::is_storable(id) || !base.is_dir(&dir) {
            return Err(CtxError::MemoryNotFound(id.to_string()));
        }
        self.commit(&base, &[Change::Remove(dir)], &format!("delete memory {id}"))
    }

    fn write_task(&self, task: &Task) -> Result<()> {
        if !entry_id::is_storable(&task.id) {
            return Err(CtxError::InvalidId(task.id.clone()));
        }
        let data = records::encode_task(task)?;
        let base = self.snapshot()?;
        self.commit(
            &base,
            &[Change::Put(task_path(&task.id), data)],
            &format!("write task {}", task.id),
        )
    }

    fn read_task(&self, id: &str) -> Result<Task> {
        self.task_in(&self.snapshot()?, id)
    }

    fn list_tasks(&self) -> Result<Vec<Task>> {
        let snap = self.snapshot()?;
        let mut tasks = Vec::new();
        for (name, is_dir) in snap.list_dir(TASKS_DIR)? {
            if is_dir {
                continue;
            }
            if let Some(id) = records::task_id_from_file_name(&name) {
                keep_or_skip(Origin::Shared, self.task_in(&snap, id), &mut tasks)?;
            }
        }
        Ok(tasks)
    }

    fn delete_task(&self, id: &str) -> Result<()> {
        let base = self.snapshot()?;
        let path = task_path(id);
        if !entry_id::is_storable(id) || base.read(&path)?.is_none() {
            return Err(CtxError::TaskNotFound(id.to_string()));
        }
        self.commit(&base, &[Change::Remove(path)], &format!("delete task {id}"))
    }

    fn update_task(&self, id: &str, mutate: &mut TaskMutator<'_>) -> Result<Task> {
        let base = self.snapshot()?;
        let mut task = self.task_in(&base, id)?;
        mutate(&mut task)?;
        let data = records::encode_task(&task)?;
        self.commit(
            &base,
            &[Change::Put(task_path(id), data)],
            &format!("update task {id}"),
        )?;
        Ok(task)
    }

    fn write_lock(&self, lock: &Lock) -> Result<()> {
        let data = records::encode_lock(lock)?;
        let base = self.snapshot()?;
        self.commit(
            &base,
            &[Change::Put(lock_path(&lock.target), data)],
            &format!("lock {}", lock.target),
        )
    }

    fn read_lock(&self, target: &str) -> Result<Lock> {
        self.lock_in(&self.snapshot()?, target)
    }

    fn list_locks(&self) -> Result<Vec<Lock>> {
        let snap = self.snapshot()?;
        let mut locks = Vec::new();
        for (name, is_dir) in snap.list_dir(LOCKS_DIR)? {
            if is_dir || !records::is_record_file(&name) {
                continue;
            }
            let path = format!("{LOCKS_DIR}/{name}");
            let outcome = snap.read(&path).and_then(|data| match data {
                Some(data) => records::decode_lock(&format!("{}:{path}", self.refname), &data),
                None => Err(CtxError::NotLocked(name.clone())),
            });
            keep_or_skip(Origin::Shared, outcome, &mut locks)?;
        }
        Ok(locks)
    }

    fn delete_lock(&self, target: &str) -> Result<()> {
        let base = self.snapshot()?;
        if base.read(&lock_path(target))?.is_none() {
            return Err(CtxError::NotLocked(target.to_string()));
        }
        self.commit(
            &base,
            &[Change::Remove(lock_path(target))],
            &format!("unlock {target}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{self, Status};
    use chrono::Duration;
    use tempfile::tempdir;

    const REF: &str = "refs/context/shared";

    fn setup() -> (tempfile::TempDir, SharedStore) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Tester").unwrap();
            config.set_str("user.email", "tester@example.com").unwrap();
        }
        (dir, SharedStore::open(repo, REF))
    }

    fn task(id: &str, title: &str) -> Task {
        Task::new(
            id.into(),
            title.into(),
            "details".into(),
            "alice".into(),
            Origin::Shared,
            model::now(),
        )
    }

    fn commit_count(store: &SharedStore) -> usize {
        let mut walk = store.repo().revwalk().unwrap();
        walk.push_ref(REF).unwrap();
        walk.count()
    }

    #[test]
    fn empty_ref_lists_empty_and_reads_not_found() {
        let (_dir, store) = setup();
        assert!(store.list_memories().unwrap().is_empty());
        assert!(store.list_tasks().unwrap().is_empty());
        assert!(store.list_locks().unwrap().is_empty());
        assert!(store.read_task("task-0000000000000001").unwrap_err().is_not_found());
        assert!(store.repo().find_reference(REF).is_err());
    }

    #[test]
    fn memory_round_trip_is_flagged_shared() {
        let (_dir, store) = setup();
        let memory = Memory::new(
            "00000000000000a1".into(),
            "Why JWT".into(),
            "Because stateless".into(),
            "alice".into(),
            vec!["auth".into()],
            Origin::Shared,
            model::now(),
        );
        store.write_memory(&memory).unwrap();

        let read = store.read_memory(&memory.id).unwrap();
        assert_eq!(read, memory);
        assert!(read.shared);
        assert_eq!(store.list_memories().unwrap(), vec![memory.clone()]);

        store.delete_memory(&memory.id).unwrap();
        assert!(matches!(
            store.delete_memory(&memory.id).unwrap_err(),
            CtxError::MemoryNotFound(_)
        ));
    }

    #[test]
    fn each_write_is_one_commit() {
        let (_dir, store) = setup();
        store.write_task(&task("task-00000000000000b1", "one")).unwrap();
        store.write_task(&task("task-00000000000000b2", "two")).unwrap();
        store.delete_task("task-00000000000000b1").unwrap();
        assert_eq!(commit_count(&store), 3);
        assert_eq!(store.list_tasks().unwrap().len(), 1);
    }

    #[test]
    fn update_task_commits_the_mutated_state() {
        let (_dir, store) = setup();
        store.write_task(&task("task-00000000000000c1", "claim me")).unwrap();
        let updated = store
            .update_task("task-00000000000000c1", &mut |t| {
                t.claim("bob", model::now());
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.status, Status::Claimed);
        assert_eq!(store.read_task("task-00000000000000c1").unwrap().owner, "bob");
    }

    #[test]
    fn update_racing_another_writer_is_stale() {
        let (_dir, store) = setup();
        store.write_task(&task("task-00000000000000c2", "race")).unwrap();

        let err = store
            .update_task("task-00000000000000c2", &mut |t| {
                // Another writer lands a commit between our read and our commit.
                store.write_task(&task("task-00000000000000c3", "other")).unwrap();
                t.complete(model::now());
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, CtxError::StaleRef(_)));
        assert_eq!(
            store.read_task("task-00000000000000c2").unwrap().status,
            Status::Open
        );
    }

    #[test]
    fn corrupt_blob_is_distinct_on_read_and_skipped_on_list() {
        let (_dir, store) = setup();
        store.write_task(&task("task-00000000000000d1", "good")).unwrap();
        let base = store.snapshot().unwrap();
        store
            .commit(
                &base,
                &[Change::Put(task_path("task-00000000000000d2"), b"{oops".to_vec())],
                "corrupt",
            )
            .unwrap();

        assert!(matches!(
            store.read_task("task-00000000000000d2").unwrap_err(),
            CtxError::Corrupt(_, _)
        ));
        let tasks = store.list_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "good");
    }

    #[test]
    fn corrupt_lock_blob_can_be_deleted() {
        let (_dir, store) = setup();
        let base = store.snapshot().unwrap();
        store
            .commit(&base, &[Change::Put(lock_path("src/x"), b"{oops".to_vec())], "corrupt")
            .unwrap();
        assert!(matches!(store.read_lock("src/x").unwrap_err(), CtxError::Corrupt(_, _)));

        store.delete_lock("src/x").unwrap();
        assert!(matches!(store.delete_lock("src/x").unwrap_err(), CtxError::NotLocked(_)));
        assert!(store.list_locks().unwrap().is_empty());
    }

    #[test]
    fn locks_round_trip_and_release() {
        let (_dir, store) = setup();
        let lock = Lock::new("src/auth/", "alice", model::now(), Duration::hours(4));
        store.write_lock(&lock).unwrap();
        assert_eq!(store.read_lock("src/auth/").unwrap(), lock);
        assert_eq!(store.list_locks().unwrap(), vec![lock]);

        store.delete_lock("src/auth/").unwrap();
        assert!(matches!(
            store.read_lock("src/auth/").unwrap_err(),
            CtxError::NotLocked(_)
        ));
    }
}
