use thiserror::Error;

/// Coarse failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Corrupt,
    Io,
    Invalid,
}

#[derive(Debug, Error)]
pub enum CtxError {
    #[error("not a git repository (or any of the parent directories)")]
    NotGitRepository,

    #[error("not found: {0}")]
    MemoryNotFound(String),

    #[error("not found: {0}")]
    TaskNotFound(String),

    #[error("not locked: {0}")]
    NotLocked(String),

    #[error("no remote named '{0}'")]
    RemoteNotFound(String),

    #[error("ambiguous id prefix '{0}' (matches: {1})")]
    AmbiguousId(String, String),

    #[error("invalid id '{0}'")]
    InvalidId(String),

    #[error("already claimed by {0}")]
    AlreadyClaimed(String),

    #[error("not owned by you (owner: {0})")]
    NotOwner(String),

    #[error("task {0} is not claimed")]
    NotClaimed(String),

    #[error("task {0} is already done")]
    TaskDone(String),

    #[error("task {0} cannot depend on itself")]
    SelfDependency(String),

    #[error("already locked by {holder} (expires: {expires_at})")]
    AlreadyLocked { holder: String, expires_at: String },

    #[error("cannot unlock: owned by {0}")]
    LockNotOwned(String),

    #[error("busy: {0} is held by another process")]
    Busy(String),

    #[error("shared ref {0} moved during update; retry the command")]
    StaleRef(String),

    #[error("push of {0} rejected: {1} (run `git ctx pull` first)")]
    PushRejected(String, String),

    #[error("corrupt record '{0}': {1}")]
    Corrupt(String, String),

    #[error("random source unavailable: {0}")]
    RandomSource(String),

    #[error("editor failed: {0}")]
    Editor(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

impl CtxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MemoryNotFound(_)
            | Self::TaskNotFound(_)
            | Self::NotLocked(_)
            | Self::RemoteNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyClaimed(_)
            | Self::NotOwner(_)
            | Self::NotClaimed(_)
            | Self::TaskDone(_)
            | Self::AlreadyLocked { .. }
            | Self::LockNotOwned(_)
            | Self::Busy(_)
            | Self::StaleRef(_)
            | Self::PushRejected(_, _) => ErrorKind::Conflict,
            Self::Corrupt(_, _) => ErrorKind::Corrupt,
            Self::Io(_) | Self::Git(_) => ErrorKind::Io,
            Self::NotGitRepository
            | Self::AmbiguousId(_, _)
            | Self::InvalidId(_)
            | Self::SelfDependency(_)
            | Self::RandomSource(_)
            | Self::Editor(_)
            | Self::Json(_) => ErrorKind::Invalid,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotGitRepository => "not_git_repository",
            Self::MemoryNotFound(_) => "memory_not_found",
            Self::TaskNotFound(_) => "task_not_found",
            Self::NotLocked(_) => "not_locked",
            Self::RemoteNotFound(_) => "remote_not_found",
            Self::AmbiguousId(_, _) => "ambiguous_id",
            Self::InvalidId(_) => "invalid_id",
            Self::AlreadyClaimed(_) => "already_claimed",
            Self::NotOwner(_) => "not_owner",
            Self::NotClaimed(_) => "not_claimed",
            Self::TaskDone(_) => "task_done",
            Self::SelfDependency(_) => "self_dependency",
            Self::AlreadyLocked { .. } => "already_locked",
            Self::LockNotOwned(_) => "lock_not_owned",
            Self::Busy(_) => "busy",
            Self::StaleRef(_) => "stale_ref",
            Self::PushRejected(_, _) => "push_rejected",
            Self::Corrupt(_, _) => "corrupt_record",
            Self::RandomSource(_) => "random_source",
            Self::Editor(_) => "editor_failed",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Git(_) => "git_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, CtxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_distinct_from_not_found() {
        let claimed = CtxError::AlreadyClaimed("alice".into());
        assert_eq!(claimed.kind(), ErrorKind::Conflict);
        assert!(!claimed.is_not_found());
        assert_eq!(claimed.to_string(), "already claimed by alice");

        let missing = CtxError::TaskNotFound("task-1".into());
        assert!(missing.is_not_found());
        assert_eq!(missing.code(), "task_not_found");
    }

    #[test]
    fn corrupt_records_have_their_own_kind() {
        let err = CtxError::Corrupt("tasks/x.json".into(), "eof".into());
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.code(), "corrupt_record");
    }
}
