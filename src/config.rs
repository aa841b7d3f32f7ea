use std::fs;
use std::io;
use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{CtxError, Result};
use crate::model::DEFAULT_LOCK_TTL_MINUTES;

pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_SHARED_REF: &str = "refs/context/shared";
/// Longest accepted lock validity: one year.
pub const MAX_LOCK_TTL_MINUTES: i64 = 366 * 24 * 60;

/// Optional per-repository settings in `<git-dir>/context/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub lock_ttl_minutes: i64,
    pub remote: String,
    pub shared_ref: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_ttl_minutes: DEFAULT_LOCK_TTL_MINUTES,
            remote: DEFAULT_REMOTE.to_string(),
            shared_ref: DEFAULT_SHARED_REF.to_string(),
        }
    }
}

impl Config {
    /// Load from `context_root`; a missing file yields the defaults.
    pub fn load(context_root: &Path) -> Result<Self> {
        let path = context_root.join(CONFIG_FILE);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| CtxError::Corrupt(path.display().to_string(), e.to_string()))?;
        if !(1..=MAX_LOCK_TTL_MINUTES).contains(&config.lock_ttl_minutes) {
            return Err(CtxError::Corrupt(
                path.display().to_string(),
                format!("lockTtlMinutes must be between 1 and {MAX_LOCK_TTL_MINUTES}"),
            ));
        }
        Ok(config)
    }

    /// Lock validity, clamped to the accepted range for hand-built configs.
    pub fn lock_ttl(&self) -> Duration {
        Duration::try_minutes(self.lock_ttl_minutes.clamp(1, MAX_LOCK_TTL_MINUTES))
            .unwrap_or_else(|| Duration::minutes(DEFAULT_LOCK_TTL_MINUTES))
    }
}
