//! Path-level reads and edits of a tree committed on a git ref.

use std::path::Path;

use git2::{Commit, ErrorCode, ObjectType, Oid, Repository, Signature, Tree};

use crate::error::{CtxError, Result};

const FILE_MODE: i32 = 0o100644;
const DIR_MODE: i32 = 0o040000;

/// The tree at a ref's tip, or an empty view if the ref does not exist yet.
pub struct Snapshot<'r> {
    repo: &'r Repository,
    tip: Option<Commit<'r>>,
    tree: Option<Tree<'r>>,
}

impl<'r> Snapshot<'r> {
    pub fn load(repo: &'r Repository, refname: &str) -> Result<Self> {
        let tip = match repo.find_reference(refname) {
            Ok(reference) => Some(reference.peel_to_commit()?),
            Err(e) if e.code() == ErrorCode::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let tree = tip.as_ref().map(|c| c.tree()).transpose()?;
        Ok(Self { repo, tip, tree })
    }

    /// View of an arbitrary commit, e.g. a fetched remote tip.
    pub fn at_commit(repo: &'r Repository, commit: Commit<'r>) -> Result<Self> {
        let tree = commit.tree()?;
        Ok(Self {
            repo,
            tip: Some(commit),
            tree: Some(tree),
        })
    }

    pub fn tip_id(&self) -> Option<Oid> {
        self.tip.as_ref().map(|c| c.id())
    }

    pub fn tip(&self) -> Option<&Commit<'r>> {
        self.tip.as_ref()
    }

    pub fn tree(&self) -> Option<&Tree<'r>> {
        self.tree.as_ref()
    }

    /// Blob content at `path`, or `None` when no blob lives there.
    pub fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(tree) = &self.tree else {
            return Ok(None);
        };
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }
        let blob = self.repo.find_blob(entry.id())?;
        Ok(Some(blob.content().to_vec()))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.tree
            .as_ref()
            .and_then(|tree| tree.get_path(Path::new(path)).ok())
            .is_some_and(|entry| entry.kind() == Some(ObjectType::Tree))
    }

    /// Names directly under directory `path`, with a flag marking subdirectories.
    pub fn list_dir(&self, path: &str) -> Result<Vec<(String, bool)>> {
        let Some(tree) = &self.tree else {
            return Ok(vec![]);
        };
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(ObjectType::Tree) {
            return Ok(vec![]);
        }
        let dir = self.repo.find_tree(entry.id())?;
        Ok(dir
            .iter()
            .filter_map(|child| {
                let name = child.name()?.to_string();
                Some((name, child.kind() == Some(ObjectType::Tree)))
            })
            .collect())
    }
}

/// One path-level change to a tree.
pub enum Change {
    Put(String, Vec<u8>),
    Remove(String),
}

/// Commit `changes` on top of `base` and advance `refname` to the new commit.
///
/// The ref only moves if it still points at `base`'s tip; otherwise the
/// commit is refused with `StaleRef`.
pub fn commit_changes(
    repo: &Repository,
    refname: &str,
    base: &Snapshot<'_>,
    changes: &[Change],
    signature: &Signature<'_>,
    message: &str,
) -> Result<Oid> {
    let tree_id = apply_changes(repo, base.tree.as_ref(), changes)?;
    let tree = repo.find_tree(tree_id)?;
    let parents: Vec<&Commit<'_>> = base.tip().into_iter().collect();
    commit_tree(repo, refname, base.tip_id(), &tree, &parents, signature, message)
}

/// Commit `tree` with explicit parents, guarding the ref update against concurrent moves.
pub fn commit_tree(
    repo: &Repository,
    refname: &str,
    expected_tip: Option<Oid>,
    tree: &Tree<'_>,
    parents: &[&Commit<'_>],
    signature: &Signature<'_>,
    message: &str,
) -> Result<Oid> {
    let commit_id = repo.commit(None, signature, signature, message, tree, parents)?;
    move_ref(repo, refname, expected_tip, commit_id, message)?;
    Ok(commit_id)
}

/// Point `refname` at `new_id` if it currently points at `expected_tip`
/// (or does not exist when `expected_tip` is `None`).
pub fn move_ref(
    repo: &Repository,
    refname: &str,
    expected_tip: Option<Oid>,
    new_id: Oid,
    message: &str,
) -> Result<()> {
    let outcome = match expected_tip {
        Some(old) => repo
            .reference_matching(refname, new_id, true, old, message)
            .map(|_| ()),
        None => repo.reference(refname, new_id, false, message).map(|_| ()),
    };
    outcome.map_err(|e| match e.code() {
        ErrorCode::Modified | ErrorCode::Exists | ErrorCode::Locked => {
            CtxError::StaleRef(refname.to_string())
        }
        _ => CtxError::Git(e),
    })
}

/// Build the tree resulting from applying `changes` to `base`.
pub fn apply_changes(repo: &Repository, base: Option<&Tree<'_>>, changes: &[Change]) -> Result<Oid> {
    let mut current: Option<Oid> = base.map(|t| t.id());
    for change in changes {
        let tree = current.map(|id| repo.find_tree(id)).transpose()?;
        let (path, payload) = match change {
            Change::Put(path, data) => (path.as_str(), Some(repo.blob(data)?)),
            Change::Remove(path) => (path.as_str(), None),
        };
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        current = rewrite(repo, tree.as_ref(), &components, payload)?;
    }
    match current {
        Some(id) => Ok(id),
        None => Ok(repo.treebuilder(None)?.write()?),
    }
}

/// Rewrite one path below `base`. `blob = None` removes the entry (file or
/// whole subtree). Returns `None` when the rewritten tree ends up empty.
fn rewrite(
    repo: &Repository,
    base: Option<&Tree<'_>>,
    path: &[&str],
    blob: Option<Oid>,
) -> Result<Option<Oid>> {
    let Some((&head, rest)) = path.split_first() else {
        return Ok(base.map(|t| t.id()));
    };
    let mut builder = repo.treebuilder(base)?;

    if rest.is_empty() {
        match blob {
            Some(id) => {
                builder.insert(head, id, FILE_MODE)?;
            }
            None => {
                if builder.get(head)?.is_some() {
                    builder.remove(head)?;
                }
            }
        }
    } else {
        let child_id = builder
            .get(head)?
            .filter(|entry| entry.kind() == Some(ObjectType::Tree))
            .map(|entry| entry.id());
        let child = child_id.map(|id| repo.find_tree(id)).transpose()?;
        match rewrite(repo, child.as_ref(), rest, blob)? {
            Some(id) => {
                builder.insert(head, id, DIR_MODE)?;
            }
            None => {
                if builder.get(head)?.is_some() {
                    builder.remove(head)?;
                }
            }
        }
    }

    if builder.is_empty() {
        return Ok(None);
    }
    Ok(Some(builder.write()?))
}
