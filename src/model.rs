use chrono::{DateTime, Duration, SubsecRound, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Default validity window of a freshly acquired lock.
pub const DEFAULT_LOCK_TTL_MINUTES: i64 = 4 * 60;

/// Current UTC instant at the whole-second precision records are stored at.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Which backend an entry lives in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Local,
    Shared,
}

impl Origin {
    pub fn from_shared(shared: bool) -> Self {
        if shared { Self::Shared } else { Self::Local }
    }

    pub fn is_shared(self) -> bool {
        self == Self::Shared
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Shared => write!(f, "shared"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    Claimed,
    Done,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Claimed => write!(f, "claimed"),
            Self::Done => write!(f, "done"),
        }
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// A freeform titled note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shared: bool,
}

impl Memory {
    pub fn new(
        id: String,
        title: String,
        content: String,
        author: String,
        tags: Vec<String>,
        origin: Origin,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            content,
            author,
            tags: normalize_tags(tags),
            created_at: at,
            updated_at: at,
            shared: origin.is_shared(),
        }
    }

    pub fn origin(&self) -> Origin {
        Origin::from_shared(self.shared)
    }

    /// Replace the body, keeping `updated_at` at or after `created_at`.
    pub fn replace_content(&mut self, content: String, at: DateTime<Utc>) {
        self.content = content;
        self.touch(at);
    }

    pub fn retitle(&mut self, title: String, at: DateTime<Utc>) {
        self.title = title;
        self.touch(at);
    }

    pub fn replace_tags(&mut self, tags: Vec<String>, at: DateTime<Utc>) {
        self.tags = normalize_tags(tags);
        self.touch(at);
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at.max(self.created_at);
    }

    /// Case-insensitive substring match over title and content.
    pub fn matches(&self, query: &str) -> bool {
        contains_ci(&self.title, query) || contains_ci(&self.content, query)
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// One entry in a task's append-only comment thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<DateTime<Utc>>,
    /// Tasks this one depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    /// Tasks depending on this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    pub shared: bool,
}

impl Task {
    pub fn new(
        id: String,
        title: String,
        description: String,
        created_by: String,
        origin: Origin,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            description,
            status: Status::Open,
            owner: String::new(),
            created_by,
            created_at: at,
            updated_at: at,
            done_at: None,
            blocked_by: vec![],
            blocks: vec![],
            comments: vec![],
            shared: origin.is_shared(),
        }
    }

    pub fn origin(&self) -> Origin {
        Origin::from_shared(self.shared)
    }

    pub fn is_owned_by(&self, actor: &str) -> bool {
        self.status == Status::Claimed && self.owner == actor
    }

    pub fn claim(&mut self, owner: &str, at: DateTime<Utc>) {
        self.owner = owner.to_string();
        self.status = Status::Claimed;
        self.touch(at);
    }

    pub fn drop_owner(&mut self, at: DateTime<Utc>) {
        self.owner.clear();
        self.status = Status::Open;
        self.touch(at);
    }

    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.owner.clear();
        self.status = Status::Done;
        self.done_at = Some(at);
        self.touch(at);
    }

    pub fn add_comment(&mut self, author: &str, content: &str, at: DateTime<Utc>) {
        self.comments.push(Comment {
            author: author.to_string(),
            content: content.to_string(),
            created_at: at,
        });
        self.touch(at);
    }

    pub fn add_blocker(&mut self, blocker_id: &str, at: DateTime<Utc>) {
        if !self.blocked_by.iter().any(|b| b == blocker_id) {
            self.blocked_by.push(blocker_id.to_string());
        }
        self.touch(at);
    }

    pub fn remove_blocker(&mut self, blocker_id: &str, at: DateTime<Utc>) {
        self.blocked_by.retain(|b| b != blocker_id);
        self.touch(at);
    }

    pub fn add_dependent(&mut self, dependent_id: &str, at: DateTime<Utc>) {
        if !self.blocks.iter().any(|b| b == dependent_id) {
            self.blocks.push(dependent_id.to_string());
        }
        self.touch(at);
    }

    pub fn remove_dependent(&mut self, dependent_id: &str, at: DateTime<Utc>) {
        self.blocks.retain(|b| b != dependent_id);
        self.touch(at);
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at.max(self.created_at);
    }

    /// A task is blocked while any blocker it can resolve is not done.
    /// Blocker ids that `status_of` cannot resolve do not block.
    pub fn is_blocked<F>(&self, status_of: F) -> bool
    where
        F: Fn(&str) -> Option<Status>,
    {
        self.blocked_by
            .iter()
            .filter_map(|id| status_of(id))
            .any(|status| status != Status::Done)
    }

    /// Case-insensitive substring match over title and description.
    pub fn matches(&self, query: &str) -> bool {
        contains_ci(&self.title, query) || contains_ci(&self.description, query)
    }
}

// ---------------------------------------------------------------------------
// Lock
// ---------------------------------------------------------------------------

/// Advisory, time-bounded mutual-exclusion marker on a task id or path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    pub target: String,
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lock {
    pub fn new(target: &str, holder: &str, at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            target: target.to_string(),
            locked_by: holder.to_string(),
            locked_at: at,
            expires_at: at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_held_by(&self, user: &str) -> bool {
        self.locked_by == user
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Trim whitespace, drop empty tags, and drop repeats while keeping first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let trimmed = tag.trim();
        if !trimmed.is_empty() && !out.iter().any(|t| t == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}
