use git2::{Repository, Signature};

/// Environment override for the acting user's display name.
pub const AUTHOR_ENV: &str = "GIT_CTX_AUTHOR";

/// Sentinel returned when no identity is configured anywhere.
pub const UNKNOWN: &str = "Unknown";

const FALLBACK_EMAIL: &str = "git-ctx@localhost";

/// Resolve the acting user's display name.
///
/// Checks `GIT_CTX_AUTHOR` first, then git config `user.name` (repository,
/// then global), and falls back to `Unknown`.
pub fn resolve_author(repo: Option<&Repository>) -> String {
    author_from(std::env::var(AUTHOR_ENV).ok(), repo)
}

/// [`resolve_author`] with the override value passed in; blank overrides are ignored.
fn author_from(override_name: Option<String>, repo: Option<&Repository>) -> String {
    override_name
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| git_config_value(repo, "user.name"))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Commit signature for writes to the shared ref: the resolved name plus
/// `user.email`, or a placeholder address when none is configured.
pub fn signature(repo: &Repository) -> Result<Signature<'static>, git2::Error> {
    let name = resolve_author(Some(repo));
    let email =
        git_config_value(Some(repo), "user.email").unwrap_or_else(|| FALLBACK_EMAIL.to_string());
    Signature::now(&name, &email)
}

fn git_config_value(repo: Option<&Repository>, key: &str) -> Option<String> {
    let config = match repo {
        Some(repo) => repo.config().ok()?,
        None => git2::Config::open_default().ok()?,
    };
    config
        .get_string(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
