use std::path::Path;

use git2::{ErrorCode, Repository};

use crate::error::{CtxError, Result};

/// Open the repository containing `start`, walking up parent directories.
pub fn discover(start: &Path) -> Result<Repository> {
    Repository::discover(start).map_err(|e| match e.code() {
        ErrorCode::NotFound => CtxError::NotGitRepository,
        _ => CtxError::Git(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn discovers_from_nested_directory() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let repo = discover(&nested).unwrap();
        assert!(repo.path().ends_with(".git/"));
    }

    #[test]
    fn outside_a_repository_is_reported() {
        let dir = tempdir().unwrap();
        let err = discover(dir.path()).err().expect("expected an error");
        assert!(matches!(err, CtxError::NotGitRepository));
    }
}
