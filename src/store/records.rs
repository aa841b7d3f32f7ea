//! On-disk record shapes shared by the local and shared backends.
//!
//! Layout, relative to a backend root:
//!   - `memory/{id}/meta.json`: memory metadata, second-precision timestamps
//!   - `memory/{id}/content.md`: raw memory body
//!   - `tasks/{id}.json`: full task record including comments
//!   - `locks/{digest}.json`: lock record keyed by a digest of its target

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CtxError, Result};
use crate::model::{Lock, Memory, Origin, Task};

pub const MEMORY_DIR: &str = "memory";
pub const TASKS_DIR: &str = "tasks";
pub const LOCKS_DIR: &str = "locks";
pub const META_FILE: &str = "meta.json";
pub const CONTENT_FILE: &str = "content.md";

const JSON_SUFFIX: &str = ".json";

/// Fixed-length key for a lock target: the first 8 bytes of its SHA-256, in hex.
pub fn lock_digest(target: &str) -> String {
    let digest = Sha256::digest(target.as_bytes());
    hex::encode(&digest[..8])
}

pub fn task_file_name(id: &str) -> String {
    format!("{id}{JSON_SUFFIX}")
}

pub fn lock_file_name(target: &str) -> String {
    format!("{}{JSON_SUFFIX}", lock_digest(target))
}

/// Task id encoded by a `tasks/` entry name, if it is one.
pub fn task_id_from_file_name(name: &str) -> Option<&str> {
    name.strip_suffix(JSON_SUFFIX).filter(|stem| !stem.is_empty())
}

pub fn is_record_file(name: &str) -> bool {
    task_id_from_file_name(name).is_some()
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryMeta {
    id: String,
    title: String,
    author: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(with = "utc_seconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "utc_seconds")]
    updated_at: DateTime<Utc>,
    shared: bool,
}

/// Encode a memory into its `(meta.json, content.md)` pair.
pub fn encode_memory(memory: &Memory) -> Result<(Vec<u8>, Vec<u8>)> {
    let meta = MemoryMeta {
        id: memory.id.clone(),
        title: memory.title.clone(),
        author: memory.author.clone(),
        tags: memory.tags.clone(),
        created_at: memory.created_at,
        updated_at: memory.updated_at,
        shared: memory.shared,
    };
    let meta = serde_json::to_vec_pretty(&meta)?;
    Ok((meta, memory.content.as_bytes().to_vec()))
}

/// Rebuild a memory; the origin flag comes from the backend, not the record.
pub fn decode_memory(location: &str, meta: &[u8], content: &[u8], origin: Origin) -> Result<Memory> {
    let meta: MemoryMeta =
        serde_json::from_slice(meta).map_err(|e| corrupt(location, e.to_string()))?;
    let content = String::from_utf8(content.to_vec())
        .map_err(|_| corrupt(location, "content is not valid UTF-8".into()))?;
    Ok(Memory {
        id: meta.id,
        title: meta.title,
        content,
        author: meta.author,
        tags: meta.tags,
        created_at: meta.created_at,
        updated_at: meta.updated_at,
        shared: origin.is_shared(),
    })
}

// ---------------------------------------------------------------------------
// Task / Lock
// ---------------------------------------------------------------------------

pub fn encode_task(task: &Task) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(task)?)
}

pub fn decode_task(location: &str, data: &[u8], origin: Origin) -> Result<Task> {
    let mut task: Task =
        serde_json::from_slice(data).map_err(|e| corrupt(location, e.to_string()))?;
    task.shared = origin.is_shared();
    Ok(task)
}

pub fn encode_lock(lock: &Lock) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(lock)?)
}

pub fn decode_lock(location: &str, data: &[u8]) -> Result<Lock> {
    serde_json::from_slice(data).map_err(|e| corrupt(location, e.to_string()))
}

fn corrupt(location: &str, reason: String) -> CtxError {
    CtxError::Corrupt(location.to_string(), reason)
}

/// `YYYY-MM-DDTHH:MM:SSZ` timestamps for memory metadata.
mod utc_seconds {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
