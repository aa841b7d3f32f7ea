//! The per-invocation context: one local backend, one shared backend, and
//! the coordination rules that span them.

use std::collections::HashMap;
use std::path::Path;

use chrono::SecondsFormat;
use git2::Repository;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::entry_id;
use crate::error::{CtxError, Result};
use crate::git;
use crate::identity;
use crate::model::{self, Lock, Memory, Origin, Status, Task};
use crate::store::local::LocalStore;
use crate::store::records::LOCKS_DIR;
use crate::store::shared::SharedStore;
use crate::store::sync::{PullOutcome, PushOutcome};
use crate::store::Storage;

/// Which backends a listing or search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Shared,
    All,
}

impl Scope {
    /// `--all` wins over `--shared`; neither means local only.
    pub fn from_flags(shared: bool, all: bool) -> Self {
        match (shared, all) {
            (_, true) => Scope::All,
            (true, false) => Scope::Shared,
            (false, false) => Scope::Local,
        }
    }

    pub fn includes(self, origin: Origin) -> bool {
        match self {
            Scope::All => true,
            Scope::Local => origin == Origin::Local,
            Scope::Shared => origin == Origin::Shared,
        }
    }
}

/// A lock tagged with the backend it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockEntry {
    #[serde(flatten)]
    pub lock: Lock,
    pub shared: bool,
}

impl LockEntry {
    fn new(lock: Lock, origin: Origin) -> Self {
        Self {
            lock,
            shared: origin.is_shared(),
        }
    }

    pub fn origin(&self) -> Origin {
        Origin::from_shared(self.shared)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseFailure {
    pub target: String,
    pub shared: bool,
    pub error: String,
}

/// Outcome of releasing every lock held by one actor.
#[derive(Debug, Default, Serialize)]
pub struct ReleaseReport {
    pub released: Vec<LockEntry>,
    pub failures: Vec<ReleaseFailure>,
}

/// What a removal deleted. `entry` is absent when the record was unreadable.
#[derive(Debug, Clone, Serialize)]
pub struct Removed<T> {
    pub id: String,
    pub shared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<T>,
}

impl<T> Removed<T> {
    fn readable(id: String, origin: Origin, entry: T) -> Self {
        Self {
            id,
            shared: origin.is_shared(),
            entry: Some(entry),
        }
    }

    pub fn origin(&self) -> Origin {
        Origin::from_shared(self.shared)
    }
}

/// Replacement fields for a memory; `None` keeps the current value.
#[derive(Debug, Default)]
pub struct MemoryEdit {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl MemoryEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.tags.is_none()
    }
}

pub struct DualStore {
    local: LocalStore,
    shared: SharedStore,
    config: Config,
}

impl DualStore {
    pub fn open(repo: Repository) -> Result<Self> {
        let local = LocalStore::open(repo.path());
        let config = Config::load(local.root())?;
        let shared = SharedStore::open(repo, config.shared_ref.clone());
        debug!(root = %local.root().display(), shared_ref = %config.shared_ref, "opened context stores");
        Ok(Self {
            local,
            shared,
            config,
        })
    }

    pub fn discover(start: &Path) -> Result<Self> {
        Self::open(git::discover(start)?)
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn shared(&self) -> &SharedStore {
        &self.shared
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn select(&self, origin: Origin) -> &dyn Storage {
        match origin {
            Origin::Local => &self.local,
            Origin::Shared => &self.shared,
        }
    }

    /// The acting user's display name, resolved against this repository.
    pub fn author(&self) -> String {
        identity::resolve_author(Some(self.shared.repo()))
    }

    /// Backends in lookup order: local first.
    fn backends(&self, scope: Scope) -> Vec<&dyn Storage> {
        [Origin::Local, Origin::Shared]
            .into_iter()
            .filter(|origin| scope.includes(*origin))
            .map(|origin| self.select(origin))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Fan-out queries
    // -----------------------------------------------------------------------

    pub fn list_memories(&self, scope: Scope) -> Result<Vec<Memory>> {
        self.collect_memories(scope, |backend| backend.list_memories())
    }

    pub fn search_memories(&self, scope: Scope, query: &str) -> Result<Vec<Memory>> {
        self.collect_memories(scope, |backend| backend.search_memories(query))
    }

    fn collect_memories<F>(&self, scope: Scope, fetch: F) -> Result<Vec<Memory>>
    where
        F: Fn(&dyn Storage) -> Result<Vec<Memory>>,
    {
        let mut out = Vec::new();
        for backend in self.backends(scope) {
            out.extend(fetch(backend)?);
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    pub fn list_tasks(&self, scope: Scope) -> Result<Vec<Task>> {
        self.collect_tasks(scope, |backend| backend.list_tasks())
    }

    pub fn search_tasks(&self, scope: Scope, query: &str) -> Result<Vec<Task>> {
        self.collect_tasks(scope, |backend| backend.search_tasks(query))
    }

    fn collect_tasks<F>(&self, scope: Scope, fetch: F) -> Result<Vec<Task>>
    where
        F: Fn(&dyn Storage) -> Result<Vec<Task>>,
    {
        let mut out = Vec::new();
        for backend in self.backends(scope) {
            out.extend(fetch(backend)?);
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    /// Locks in `scope`, oldest first. Expired locks are dropped unless asked for.
    pub fn list_locks(&self, scope: Scope, include_expired: bool) -> Result<Vec<LockEntry>> {
        let now = model::now();
        let mut out = Vec::new();
        for backend in self.backends(scope) {
            out.extend(
                backend
                    .list_locks()?
                    .into_iter()
                    .filter(|lock| include_expired || !lock.is_expired_at(now))
                    .map(|lock| LockEntry::new(lock, backend.origin())),
            );
        }
        out.sort_by(|a, b| {
            a.lock
                .locked_at
                .cmp(&b.lock.locked_at)
                .then_with(|| a.lock.target.cmp(&b.lock.target))
        });
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Lookup by identifier
    // -----------------------------------------------------------------------

    /// Exact id in local, then shared, then a unique prefix across both.
    pub fn find_memory(&self, input: &str) -> Result<Memory> {
        self.find(
            input,
            |backend, id| backend.read_memory(id),
            |backend| Ok(backend.list_memories()?.into_iter().map(|m| m.id).collect()),
            CtxError::MemoryNotFound,
        )
    }

    pub fn find_task(&self, input: &str) -> Result<Task> {
        self.find(
            input,
            |backend, id| backend.read_task(id),
            |backend| Ok(backend.list_tasks()?.into_iter().map(|t| t.id).collect()),
            CtxError::TaskNotFound,
        )
    }

    fn find<T, R, L>(&self, input: &str, read: R, ids: L, not_found: fn(String) -> CtxError) -> Result<T>
    where
        R: Fn(&dyn Storage, &str) -> Result<T>,
        L: Fn(&dyn Storage) -> Result<Vec<String>>,
    {
        let input = input.trim();
        if let Some(found) = self.read_first(input, &read)? {
            return Ok(found);
        }

        let mut known = Vec::new();
        for backend in self.backends(Scope::All) {
            known.extend(ids(backend)?);
        }
        match entry_id::resolve_prefix(input, &known)? {
            Some(id) => self
                .read_first(&id, &read)?
                .ok_or_else(|| not_found(input.to_string())),
            None => Err(not_found(input.to_string())),
        }
    }

    fn read_first<T, R>(&self, id: &str, read: &R) -> Result<Option<T>>
    where
        R: Fn(&dyn Storage, &str) -> Result<T>,
    {
        for backend in self.backends(Scope::All) {
            match read(backend, id) {
                Ok(found) => return Ok(Some(found)),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Draw ids until one is unused in both backends.
    fn fresh_id<G, R, T>(&self, generate: G, read: R) -> Result<String>
    where
        G: Fn() -> Result<String>,
        R: Fn(&dyn Storage, &str) -> Result<T>,
    {
        loop {
            let id = generate()?;
            // An unreadable record still occupies its id.
            let occupied = |backend: &dyn Storage, id: &str| match read(backend, id) {
                Err(CtxError::Corrupt(..)) => Ok(()),
                other => other.map(|_| ()),
            };
            if self.read_first(&id, &occupied)?.is_none() {
                return Ok(id);
            }
            warn!(%id, "generated id already in use; drawing another");
        }
    }

    // -----------------------------------------------------------------------
    // Memories
    // -----------------------------------------------------------------------

    pub fn add_memory(
        &self,
        origin: Origin,
        title: &str,
        content: &str,
        author: &str,
        tags: Vec<String>,
    ) -> Result<Memory> {
        let id = self.fresh_id(entry_id::generate_memory_id, |b, id| b.read_memory(id))?;
        let memory = Memory::new(
            id,
            title.trim().to_string(),
            content.to_string(),
            author.to_string(),
            tags,
            origin,
            model::now(),
        );
        self.select(origin).write_memory(&memory)?;
        Ok(memory)
    }

    pub fn edit_memory(&self, input: &str, edit: MemoryEdit) -> Result<Memory> {
        let mut memory = self.find_memory(input)?;
        let at = model::now();
        if let Some(title) = edit.title {
            memory.retitle(title.trim().to_string(), at);
        }
        if let Some(content) = edit.content {
            memory.replace_content(content, at);
        }
        if let Some(tags) = edit.tags {
            memory.replace_tags(tags, at);
        }
        self.select(memory.origin()).write_memory(&memory)?;
        Ok(memory)
    }

    pub fn remove_memory(&self, input: &str) -> Result<Removed<Memory>> {
        match self.find_memory(input) {
            Ok(memory) => {
                self.select(memory.origin()).delete_memory(&memory.id)?;
                Ok(Removed::readable(memory.id.clone(), memory.origin(), memory))
            }
            Err(CtxError::Corrupt(location, reason)) => {
                warn!(%location, %reason, "removing unreadable memory");
                self.remove_unreadable(input.trim(), |backend, id| backend.delete_memory(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Delete a record that exists but no longer parses, by exact id.
    ///
    /// Lookup only reports `Corrupt` for an exact id, from the first backend
    /// holding it, so deleting in lookup order removes that same record.
    fn remove_unreadable<T, D>(&self, id: &str, delete: D) -> Result<Removed<T>>
    where
        D: Fn(&dyn Storage, &str) -> Result<()>,
    {
        let mut last = None;
        for backend in self.backends(Scope::All) {
            match delete(backend, id) {
                Ok(()) => {
                    return Ok(Removed {
                        id: id.to_string(),
                        shared: backend.origin().is_shared(),
                        entry: None,
                    });
                }
                Err(e) if e.is_not_found() => last = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| CtxError::InvalidId(id.to_string())))
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub fn add_task(&self, origin: Origin, title: &str, description: &str, actor: &str) -> Result<Task> {
        let id = self.fresh_id(entry_id::generate_task_id, |b, id| b.read_task(id))?;
        let task = Task::new(
            id,
            title.trim().to_string(),
            description.to_string(),
            actor.to_string(),
            origin,
            model::now(),
        );
        self.select(origin).write_task(&task)?;
        Ok(task)
    }

    fn update_found<F>(&self, input: &str, mut mutate: F) -> Result<Task>
    where
        F: FnMut(&mut Task) -> Result<()>,
    {
        let task = self.find_task(input)?;
        self.select(task.origin()).update_task(&task.id, &mut mutate)
    }

    pub fn claim_task(&self, input: &str, actor: &str) -> Result<Task> {
        self.update_found(input, |task| {
            if task.status == Status::Done {
                return Err(CtxError::TaskDone(task.id.clone()));
            }
            if task.status == Status::Claimed && task.owner != actor {
                return Err(CtxError::AlreadyClaimed(task.owner.clone()));
            }
            task.claim(actor, model::now());
            Ok(())
        })
    }

    pub fn drop_task(&self, input: &str, actor: &str) -> Result<Task> {
        self.update_found(input, |task| {
            if task.status != Status::Claimed {
                return Err(CtxError::NotClaimed(task.id.clone()));
            }
            if task.owner != actor {
                return Err(CtxError::NotOwner(task.owner.clone()));
            }
            task.drop_owner(model::now());
            Ok(())
        })
    }

    pub fn complete_task(&self, input: &str) -> Result<Task> {
        self.update_found(input, |task| {
            task.complete(model::now());
            Ok(())
        })
    }

    pub fn comment_task(&self, input: &str, actor: &str, content: &str) -> Result<Task> {
        self.update_found(input, |task| {
            task.add_comment(actor, content, model::now());
            Ok(())
        })
    }

    pub fn remove_task(&self, input: &str) -> Result<Removed<Task>> {
        match self.find_task(input) {
            Ok(task) => {
                self.select(task.origin()).delete_task(&task.id)?;
                Ok(Removed::readable(task.id.clone(), task.origin(), task))
            }
            Err(CtxError::Corrupt(location, reason)) => {
                warn!(%location, %reason, "removing unreadable task");
                self.remove_unreadable(input.trim(), |backend, id| backend.delete_task(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Record that `dependent` cannot proceed until `blocker` is done.
    /// Returns both tasks as written.
    pub fn block_task(&self, dependent: &str, blocker: &str) -> Result<(Task, Task)> {
        let (dependent, blocker) = self.find_edge(dependent, blocker)?;
        let blocker_id = blocker.id.clone();
        let dependent_id = dependent.id.clone();
        let dependent = self.select(dependent.origin()).update_task(&dependent_id, &mut |t| {
            t.add_blocker(&blocker_id, model::now());
            Ok(())
        })?;
        let blocker = self.select(blocker.origin()).update_task(&blocker_id, &mut |t| {
            t.add_dependent(&dependent_id, model::now());
            Ok(())
        })?;
        Ok((dependent, blocker))
    }

    pub fn unblock_task(&self, dependent: &str, blocker: &str) -> Result<(Task, Task)> {
        let (dependent, blocker) = self.find_edge(dependent, blocker)?;
        let blocker_id = blocker.id.clone();
        let dependent_id = dependent.id.clone();
        let dependent = self.select(dependent.origin()).update_task(&dependent_id, &mut |t| {
            t.remove_blocker(&blocker_id, model::now());
            Ok(())
        })?;
        let blocker = self.select(blocker.origin()).update_task(&blocker_id, &mut |t| {
            t.remove_dependent(&dependent_id, model::now());
            Ok(())
        })?;
        Ok((dependent, blocker))
    }

    fn find_edge(&self, dependent: &str, blocker: &str) -> Result<(Task, Task)> {
        let dependent = self.find_task(dependent)?;
        let blocker = self.find_task(blocker)?;
        if dependent.id == blocker.id {
            return Err(CtxError::SelfDependency(dependent.id));
        }
        Ok((dependent, blocker))
    }

    /// Status of every task in both backends; local wins on a shared id.
    pub fn status_index(&self) -> Result<HashMap<String, Status>> {
        let mut index = HashMap::new();
        for backend in self.backends(Scope::All).into_iter().rev() {
            for task in backend.list_tasks()? {
                index.insert(task.id, task.status);
            }
        }
        Ok(index)
    }

    pub fn task_is_blocked(&self, task: &Task) -> Result<bool> {
        let index = self.status_index()?;
        Ok(task.is_blocked(|id| index.get(id).copied()))
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    /// Take a lock on `target` in `origin`'s backend.
    ///
    /// Fails while another holder has an active lock on the target in either
    /// backend. An expired lock is replaced; the current holder renews. Any
    /// record the new lock supersedes in the other backend is removed, so a
    /// target has at most one lock record afterwards.
    pub fn acquire_lock(&self, origin: Origin, target: &str, actor: &str) -> Result<Lock> {
        let guard = self.local.mutation_guard(LOCKS_DIR)?;
        let now = model::now();
        let mut superseded = Vec::new();
        for backend in self.backends(Scope::All) {
            match backend.read_lock(target) {
                Ok(existing) if !existing.is_expired_at(now) && !existing.is_held_by(actor) => {
                    return Err(CtxError::AlreadyLocked {
                        holder: existing.locked_by,
                        expires_at: existing
                            .expires_at
                            .to_rfc3339_opts(SecondsFormat::Secs, true),
                    });
                }
                Ok(_) => superseded.push(backend),
                Err(CtxError::Corrupt(location, reason)) => {
                    warn!(%location, %reason, "replacing unreadable lock record");
                    superseded.push(backend);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let lock = Lock::new(target, actor, now, self.config.lock_ttl());
        self.select(origin).write_lock(&lock)?;
        for backend in superseded.into_iter().filter(|b| b.origin() != origin) {
            match backend.delete_lock(target) {
                Ok(()) => debug!(%target, from = %backend.origin(), "moved lock"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        guard.release()?;
        debug!(%target, holder = actor, %origin, "acquired lock");
        Ok(lock)
    }

    /// Release `target`, probing local then shared. Only the holder may release.
    /// Unreadable records carry no holder and are passed over.
    pub fn release_lock(&self, target: &str, actor: &str) -> Result<LockEntry> {
        for backend in self.backends(Scope::All) {
            match backend.read_lock(target) {
                Ok(lock) => {
                    if !lock.is_held_by(actor) {
                        return Err(CtxError::LockNotOwned(lock.locked_by));
                    }
                    backend.delete_lock(target)?;
                    return Ok(LockEntry::new(lock, backend.origin()));
                }
                Err(CtxError::Corrupt(location, reason)) => {
                    warn!(%location, %reason, "skipping unreadable lock record");
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(CtxError::NotLocked(target.to_string()))
    }

    /// Release every lock `actor` holds in both backends, continuing past
    /// individual failures.
    pub fn release_all(&self, actor: &str) -> Result<ReleaseReport> {
        let mut report = ReleaseReport::default();
        for backend in self.backends(Scope::All) {
            for lock in backend.list_locks()? {
                if !lock.is_held_by(actor) {
                    continue;
                }
                match backend.delete_lock(&lock.target) {
                    Ok(()) => report.released.push(LockEntry::new(lock, backend.origin())),
                    Err(e) => {
                        warn!(target = %lock.target, error = %e, "failed to release lock");
                        report.failures.push(ReleaseFailure {
                            target: lock.target,
                            shared: backend.origin().is_shared(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------------

    pub fn push(&self, remote: Option<&str>) -> Result<PushOutcome> {
        self.shared.push(remote.unwrap_or(&self.config.remote))
    }

    pub fn pull(&self, remote: Option<&str>) -> Result<PullOutcome> {
        self.shared.pull(remote.unwrap_or(&self.config.remote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::gittree::{self, Change, Snapshot};
    use crate::store::records;
    use chrono::Duration;
    use std::fs;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, DualStore) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Tester").unwrap();
            config.set_str("user.email", "tester@example.com").unwrap();
        }
        let store = DualStore::open(repo).unwrap();
        (dir, store)
    }

    #[test]
    fn scope_from_flags() {
        assert_eq!(Scope::from_flags(false, false), Scope::Local);
        assert_eq!(Scope::from_flags(true, false), Scope::Shared);
        assert_eq!(Scope::from_flags(false, true), Scope::All);
        assert_eq!(Scope::from_flags(true, true), Scope::All);
        assert!(Scope::All.includes(Origin::Shared));
        assert!(!Scope::Local.includes(Origin::Shared));
    }

    #[test]
    fn memories_are_tagged_and_scoped() {
        let (_dir, store) = setup();
        let local = store
            .add_memory(Origin::Local, "Why JWT", "Because stateless", "alice", vec![])
            .unwrap();
        let shared = store
            .add_memory(Origin::Shared, "DB choice", "Postgres", "bob", vec![])
            .unwrap();

        assert_eq!(store.list_memories(Scope::Local).unwrap(), vec![local.clone()]);
        assert_eq!(store.list_memories(Scope::Shared).unwrap(), vec![shared.clone()]);
        let all = store.list_memories(Scope::All).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|m| m.shared && m.id == shared.id));

        assert_eq!(store.find_memory(&shared.id).unwrap(), shared);
        assert!(store.search_memories(Scope::All, "postgres").unwrap()[0].shared);
    }

    #[test]
    fn local_entry_wins_exact_lookup() {
        let (_dir, store) = setup();
        let at = model::now();
        let local = Memory::new("00000000000000f1".into(), "mine".into(), "l".into(), "a".into(), vec![], Origin::Local, at);
        let shared = Memory::new("00000000000000f1".into(), "theirs".into(), "s".into(), "b".into(), vec![], Origin::Shared, at);
        store.local().write_memory(&local).unwrap();
        store.shared().write_memory(&shared).unwrap();

        assert_eq!(store.find_memory("00000000000000f1").unwrap().title, "mine");
    }

    #[test]
    fn prefix_lookup_spans_both_backends() {
        let (_dir, store) = setup();
        let at = model::now();
        store
            .local()
            .write_task(&Task::new("task-abc0000000000001".into(), "one".into(), String::new(), "a".into(), Origin::Local, at))
            .unwrap();
        store
            .shared()
            .write_task(&Task::new("task-abd0000000000002".into(), "two".into(), String::new(), "a".into(), Origin::Shared, at))
            .unwrap();

        assert_eq!(store.find_task("abd").unwrap().title, "two");
        assert_eq!(store.find_task("task-abc").unwrap().title, "one");
        assert!(matches!(store.find_task("ab").unwrap_err(), CtxError::AmbiguousId(_, _)));
        assert!(matches!(store.find_task("ffff").unwrap_err(), CtxError::TaskNotFound(_)));
    }

    #[test]
    fn claim_drop_and_done_rules() {
        let (_dir, store) = setup();
        let task = store.add_task(Origin::Shared, "Implement auth", "", "carol").unwrap();

        let claimed = store.claim_task(&task.id, "alice").unwrap();
        assert_eq!((claimed.status, claimed.owner.as_str()), (Status::Claimed, "alice"));
        assert!(store.claim_task(&task.id, "alice").is_ok());

        let err = store.claim_task(&task.id, "bob").unwrap_err();
        assert_eq!(err.to_string(), "already claimed by alice");
        let err = store.drop_task(&task.id, "bob").unwrap_err();
        assert_eq!(err.to_string(), "not owned by you (owner: alice)");

        let dropped = store.drop_task(&task.id, "alice").unwrap();
        assert_eq!((dropped.status, dropped.owner.as_str()), (Status::Open, ""));
        assert!(matches!(
            store.drop_task(&task.id, "alice").unwrap_err(),
            CtxError::NotClaimed(_)
        ));

        store.claim_task(&task.id, "bob").unwrap();
        let done = store.complete_task(&task.id).unwrap();
        assert_eq!(done.status, Status::Done);
        assert!(done.owner.is_empty());
        assert!(done.done_at.is_some());
        assert!(matches!(
            store.claim_task(&task.id, "alice").unwrap_err(),
            CtxError::TaskDone(_)
        ));
    }

    #[test]
    fn comments_append_without_status_change() {
        let (_dir, store) = setup();
        let task = store.add_task(Origin::Local, "t", "", "a").unwrap();
        store.comment_task(&task.id, "alice", "first").unwrap();
        let task = store.comment_task(&task.id, "bob", "second").unwrap();
        assert_eq!(task.status, Status::Open);
        let authors: Vec<_> = task.comments.iter().map(|c| c.author.as_str()).collect();
        assert_eq!(authors, vec!["alice", "bob"]);
    }

    #[test]
    fn dependencies_link_both_ends_across_backends() {
        let (_dir, store) = setup();
        let schema = store.add_task(Origin::Shared, "Schema", "", "a").unwrap();
        let api = store.add_task(Origin::Local, "API", "", "a").unwrap();

        let (api_after, schema_after) = store.block_task(&api.id, &schema.id).unwrap();
        assert_eq!(api_after.blocked_by, vec![schema.id.clone()]);
        assert_eq!(schema_after.blocks, vec![api.id.clone()]);
        assert!(store.task_is_blocked(&api_after).unwrap());

        store.complete_task(&schema.id).unwrap();
        assert!(!store.task_is_blocked(&api_after).unwrap());

        let (api_after, schema_after) = store.unblock_task(&api.id, &schema.id).unwrap();
        assert!(api_after.blocked_by.is_empty());
        assert!(schema_after.blocks.is_empty());

        assert!(matches!(
            store.block_task(&api.id, &api.id).unwrap_err(),
            CtxError::SelfDependency(_)
        ));
    }

    #[test]
    fn lock_acquisition_rules() {
        let (_dir, store) = setup();
        let lock = store.acquire_lock(Origin::Local, "src/auth/", "alice").unwrap();
        assert_eq!(lock.expires_at - lock.locked_at, Duration::hours(4));

        let err = store.acquire_lock(Origin::Shared, "src/auth/", "bob").unwrap_err();
        assert!(matches!(err, CtxError::AlreadyLocked { ref holder, .. } if holder == "alice"));

        let renewed = store.acquire_lock(Origin::Local, "src/auth/", "alice").unwrap();
        assert!(renewed.expires_at >= lock.expires_at);
        assert_eq!(store.list_locks(Scope::Local, false).unwrap().len(), 1);
    }

    #[test]
    fn expired_lock_is_replaced() {
        let (_dir, store) = setup();
        let stale = Lock::new("task-1", "bob", model::now() - Duration::hours(5), Duration::hours(4));
        store.local().write_lock(&stale).unwrap();
        assert!(store.list_locks(Scope::All, false).unwrap().is_empty());
        assert_eq!(store.list_locks(Scope::All, true).unwrap().len(), 1);

        let fresh = store.acquire_lock(Origin::Local, "task-1", "alice").unwrap();
        assert_eq!(store.local().read_lock("task-1").unwrap(), fresh);
    }

    #[test]
    fn release_is_holder_only() {
        let (_dir, store) = setup();
        store.acquire_lock(Origin::Shared, "src/db/", "alice").unwrap();

        let err = store.release_lock("src/db/", "bob").unwrap_err();
        assert_eq!(err.to_string(), "cannot unlock: owned by alice");

        let released = store.release_lock("src/db/", "alice").unwrap();
        assert_eq!(released.origin(), Origin::Shared);
        assert!(matches!(
            store.release_lock("src/db/", "alice").unwrap_err(),
            CtxError::NotLocked(_)
        ));
    }

    #[test]
    fn oversized_lock_ttl_is_refused_at_open() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let root = repo.path().join(LocalStore::DIR_NAME);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("config.json"), r#"{"lockTtlMinutes": 9000000000000000}"#).unwrap();
        assert!(matches!(DualStore::open(repo), Err(CtxError::Corrupt(_, _))));
    }

    #[test]
    fn renewing_in_the_other_backend_moves_the_lock() {
        let (_dir, store) = setup();
        store.acquire_lock(Origin::Local, "src/y", "alice").unwrap();
        store.acquire_lock(Origin::Shared, "src/y", "alice").unwrap();

        let locks = store.list_locks(Scope::All, true).unwrap();
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].origin(), Origin::Shared);

        store.release_lock("src/y", "alice").unwrap();
        assert!(store.list_locks(Scope::All, true).unwrap().is_empty());
        assert!(store.acquire_lock(Origin::Local, "src/y", "bob").is_ok());
    }

    #[test]
    fn release_passes_over_unreadable_local_record() {
        let (_dir, store) = setup();
        store.acquire_lock(Origin::Shared, "src/x", "alice").unwrap();
        let locks_dir = store.local().root().join("locks");
        fs::create_dir_all(&locks_dir).unwrap();
        fs::write(locks_dir.join(records::lock_file_name("src/x")), "{oops").unwrap();

        let released = store.release_lock("src/x", "alice").unwrap();
        assert_eq!(released.origin(), Origin::Shared);
        assert!(store.shared().list_locks().unwrap().is_empty());

        store.local().delete_lock("src/x").unwrap();
        assert!(store.list_locks(Scope::All, true).unwrap().is_empty());
    }

    #[test]
    fn unreadable_local_entries_can_be_removed() {
        let (_dir, store) = setup();
        let task = store.add_task(Origin::Local, "t", "", "a").unwrap();
        let path = store.local().root().join("tasks").join(format!("{}.json", task.id));
        fs::write(&path, "{oops").unwrap();
        assert!(matches!(store.find_task(&task.id).unwrap_err(), CtxError::Corrupt(_, _)));

        let removed = store.remove_task(&task.id).unwrap();
        assert_eq!(removed.id, task.id);
        assert_eq!(removed.origin(), Origin::Local);
        assert!(removed.entry.is_none());
        assert!(!path.exists());
        assert!(store.remove_task(&task.id).unwrap_err().is_not_found());

        let memory = store.add_memory(Origin::Local, "m", "c", "a", vec![]).unwrap();
        let meta = store.local().root().join("memory").join(&memory.id).join("meta.json");
        fs::write(&meta, "{oops").unwrap();
        let removed = store.remove_memory(&memory.id).unwrap();
        assert!(removed.entry.is_none());
        assert!(store.list_memories(Scope::All).unwrap().is_empty());
    }

    #[test]
    fn unreadable_shared_task_is_removed_from_shared() {
        let (_dir, store) = setup();
        let id = "task-00000000000000e1";
        let repo = store.shared().repo();
        let refname = store.shared().refname();
        let base = Snapshot::load(repo, refname).unwrap();
        let signature = identity::signature(repo).unwrap();
        gittree::commit_changes(
            repo,
            refname,
            &base,
            &[Change::Put(format!("tasks/{id}.json"), b"{oops".to_vec())],
            &signature,
            "corrupt",
        )
        .unwrap();

        let removed = store.remove_task(id).unwrap();
        assert_eq!(removed.origin(), Origin::Shared);
        assert!(store.shared().read_task(id).unwrap_err().is_not_found());
    }

    #[test]
    fn readable_removal_echoes_the_entry() {
        let (_dir, store) = setup();
        let task = store.add_task(Origin::Shared, "keep a copy", "", "a").unwrap();
        let removed = store.remove_task(&task.id).unwrap();
        assert_eq!(removed.entry, Some(task));
        assert_eq!(removed.origin(), Origin::Shared);
    }

    #[test]
    fn release_all_counts_only_own_locks() {
        let (_dir, store) = setup();
        store.acquire_lock(Origin::Local, "a", "alice").unwrap();
        store.acquire_lock(Origin::Shared, "b", "alice").unwrap();
        store.acquire_lock(Origin::Local, "c", "bob").unwrap();

        let report = store.release_all("alice").unwrap();
        assert_eq!(report.released.len(), 2);
        assert!(report.failures.is_empty());
        let remaining = store.list_locks(Scope::All, true).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].lock.locked_by, "bob");
    }
}
