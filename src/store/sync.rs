//! Exchange of the shared ref with a remote peer.
//!
//! Push sends the local shared ref to the same ref on the remote. Pull fetches
//! the remote's ref into `refs/context/remotes/<remote>/shared`, then either
//! fast-forwards or records a merge commit whose tree is the union of both
//! sides, keeping the newer copy of any entry present on both.

use chrono::{DateTime, Utc};
use git2::{
    Cred, CredentialType, ErrorCode, FetchOptions, Oid, PushOptions, Remote, RemoteCallbacks,
    Repository,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{CtxError, Result};
use crate::identity;
use crate::model::Origin;
use crate::store::gittree::{self, Change, Snapshot};
use crate::store::records::{self, CONTENT_FILE, LOCKS_DIR, MEMORY_DIR, META_FILE, TASKS_DIR};
use crate::store::shared::{self, SharedStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PushOutcome {
    NothingToPush,
    Pushed { commit: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PullOutcome {
    NothingToPull,
    UpToDate,
    FastForwarded { commit: String },
    Merged { commit: String },
}

/// Where pull records the last fetched remote tip.
pub fn tracking_ref(remote: &str) -> String {
    format!("refs/context/remotes/{remote}/shared")
}

fn find_remote<'r>(repo: &'r Repository, name: &str) -> Result<Remote<'r>> {
    repo.find_remote(name).map_err(|e| match e.code() {
        ErrorCode::NotFound | ErrorCode::InvalidSpec => CtxError::RemoteNotFound(name.to_string()),
        _ => CtxError::Git(e),
    })
}

/// SSH agent for ssh remotes, the configured credential helper for http(s).
fn remote_callbacks<'a>(repo: &Repository) -> RemoteCallbacks<'a> {
    let config = repo.config().ok();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username, allowed| {
        if allowed.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username.unwrap_or("git"));
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT)
            && let Some(config) = &config
        {
            return Cred::credential_helper(config, url, username);
        }
        Cred::default()
    });
    callbacks
}

impl SharedStore {
    pub fn push(&self, remote_name: &str) -> Result<PushOutcome> {
        let Some(tip) = Snapshot::load(self.repo(), self.refname())?.tip_id() else {
            return Ok(PushOutcome::NothingToPush);
        };
        let mut remote = find_remote(self.repo(), remote_name)?;
        let refspec = format!("{0}:{0}", self.refname());

        let mut rejection: Option<String> = None;
        let outcome = {
            let mut callbacks = remote_callbacks(self.repo());
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    rejection = Some(format!("{refname}: {message}"));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote.push(&[refspec.as_str()], Some(&mut options))
        };
        match outcome {
            Err(e) if e.code() == ErrorCode::NotFastForward => {
                return Err(CtxError::PushRejected(
                    self.refname().to_string(),
                    e.message().to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
            Ok(()) => {}
        }
        if let Some(reason) = rejection {
            return Err(CtxError::PushRejected(self.refname().to_string(), reason));
        }

        self.repo()
            .reference(&tracking_ref(remote_name), tip, true, "git-ctx push")?;
        info!(remote = remote_name, commit = %tip, "pushed shared context");
        Ok(PushOutcome::Pushed {
            commit: tip.to_string(),
        })
    }

    pub fn pull(&self, remote_name: &str) -> Result<PullOutcome> {
        let mut remote = find_remote(self.repo(), remote_name)?;
        let tracking = tracking_ref(remote_name);
        let refspec = format!("+{}:{tracking}", self.refname());
        let mut options = FetchOptions::new();
        options.remote_callbacks(remote_callbacks(self.repo()));
        remote.fetch(&[refspec.as_str()], Some(&mut options), None)?;

        let theirs = match self.repo().refname_to_id(&tracking) {
            Ok(id) => id,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(PullOutcome::NothingToPull),
            Err(e) => return Err(e.into()),
        };
        let ours = Snapshot::load(self.repo(), self.refname())?;
        let message = format!("git-ctx pull {remote_name}");

        let Some(ours_id) = ours.tip_id() else {
            gittree::move_ref(self.repo(), self.refname(), None, theirs, &message)?;
            return Ok(fast_forwarded(remote_name, theirs));
        };
        if ours_id == theirs || self.repo().graph_descendant_of(ours_id, theirs)? {
            return Ok(PullOutcome::UpToDate);
        }
        if self.repo().graph_descendant_of(theirs, ours_id)? {
            gittree::move_ref(self.repo(), self.refname(), Some(ours_id), theirs, &message)?;
            return Ok(fast_forwarded(remote_name, theirs));
        }

        let merged = self.merge_union(&ours, theirs, &message)?;
        info!(remote = remote_name, commit = %merged, "merged shared context");
        Ok(PullOutcome::Merged {
            commit: merged.to_string(),
        })
    }

    fn merge_union(&self, ours: &Snapshot<'_>, theirs_id: Oid, message: &str) -> Result<Oid> {
        let repo = self.repo();
        let theirs = Snapshot::at_commit(repo, repo.find_commit(theirs_id)?)?;
        let mut changes = Vec::new();

        for (id, is_dir) in theirs.list_dir(MEMORY_DIR)? {
            if !is_dir {
                continue;
            }
            let meta = shared::memory_path(&id, META_FILE);
            if theirs_is_newer(stamp(ours, &meta, memory_stamp)?, stamp(&theirs, &meta, memory_stamp)?) {
                for file in [META_FILE, CONTENT_FILE] {
                    let path = shared::memory_path(&id, file);
                    if let Some(data) = theirs.read(&path)? {
                        changes.push(Change::Put(path, data));
                    }
                }
            }
        }
        for (name, is_dir) in theirs.list_dir(TASKS_DIR)? {
            if is_dir || !records::is_record_file(&name) {
                continue;
            }
            take_newer(ours, &theirs, &format!("{TASKS_DIR}/{name}"), task_stamp, &mut changes)?;
        }
        for (name, is_dir) in theirs.list_dir(LOCKS_DIR)? {
            if is_dir || !records::is_record_file(&name) {
                continue;
            }
            take_newer(ours, &theirs, &format!("{LOCKS_DIR}/{name}"), lock_stamp, &mut changes)?;
        }
        debug!(changes = changes.len(), "union of diverged shared refs");

        let tree_id = gittree::apply_changes(repo, ours.tree(), &changes)?;
        let tree = repo.find_tree(tree_id)?;
        let parents: Vec<_> = ours.tip().into_iter().chain(theirs.tip()).collect();
        let signature = identity::signature(repo)?;
        gittree::commit_tree(
            repo,
            self.refname(),
            ours.tip_id(),
            &tree,
            &parents,
            &signature,
            message,
        )
    }
}

fn fast_forwarded(remote: &str, to: Oid) -> PullOutcome {
    info!(remote, commit = %to, "fast-forwarded shared context");
    PullOutcome::FastForwarded {
        commit: to.to_string(),
    }
}

/// `None` when the path is absent, `Some(None)` when it does not parse.
type Stamp = Option<Option<DateTime<Utc>>>;

fn stamp(snap: &Snapshot<'_>, path: &str, parse: fn(&[u8]) -> Option<DateTime<Utc>>) -> Result<Stamp> {
    Ok(snap.read(path)?.map(|data| parse(&data)))
}

fn memory_stamp(meta: &[u8]) -> Option<DateTime<Utc>> {
    records::decode_memory("", meta, b"", Origin::Shared)
        .ok()
        .map(|m| m.updated_at)
}

fn task_stamp(data: &[u8]) -> Option<DateTime<Utc>> {
    records::decode_task("", data, Origin::Shared)
        .ok()
        .map(|t| t.updated_at)
}

fn lock_stamp(data: &[u8]) -> Option<DateTime<Utc>> {
    records::decode_lock("", data).ok().map(|l| l.locked_at)
}

fn take_newer(
    ours: &Snapshot<'_>,
    theirs: &Snapshot<'_>,
    path: &str,
    parse: fn(&[u8]) -> Option<DateTime<Utc>>,
    changes: &mut Vec<Change>,
) -> Result<()> {
    if theirs_is_newer(stamp(ours, path, parse)?, stamp(theirs, path, parse)?)
        && let Some(data) = theirs.read(path)?
    {
        changes.push(Change::Put(path.to_string(), data));
    }
    Ok(())
}

/// Ties and unreadable remote copies keep ours.
fn theirs_is_newer(ours: Stamp, theirs: Stamp) -> bool {
    match (ours, theirs) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(_), Some(None)) => false,
        (Some(None), Some(Some(_))) => true,
        (Some(Some(ours)), Some(Some(theirs))) => theirs > ours,
    }
}
