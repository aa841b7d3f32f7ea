use crate::error::{CtxError, Result};

/// Prefix distinguishing task identifiers from memory identifiers in listings.
pub const TASK_PREFIX: &str = "task-";

/// Random bytes drawn per identifier.
pub const ID_BYTES: usize = 8;

/// Width of the hex token: two characters per random byte.
pub const HEX_LEN: usize = ID_BYTES * 2;

/// Generate a fresh memory identifier using OS-backed CSPRNG entropy.
pub fn generate_memory_id() -> Result<String> {
    generate_hex_with(fill_os_random)
}

/// Generate a fresh task identifier: `task-` followed by the hex token.
pub fn generate_task_id() -> Result<String> {
    Ok(format!("{TASK_PREFIX}{}", generate_hex_with(fill_os_random)?))
}

fn fill_os_random(bytes: &mut [u8]) -> Result<()> {
    getrandom::fill(bytes).map_err(|e| CtxError::RandomSource(e.to_string()))
}

/// Test hook: inject deterministic random bytes when needed.
pub(crate) fn generate_hex_with<F>(mut fill_random: F) -> Result<String>
where
    F: FnMut(&mut [u8]) -> Result<()>,
{
    let mut bytes = [0_u8; ID_BYTES];
    fill_random(&mut bytes)?;
    Ok(hex::encode(bytes))
}

/// True when `id` is safe to use as a single path component.
pub fn is_storable(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Whether `candidate` is addressed by the user-supplied `input` prefix.
///
/// Matches on the full identifier or on its hex part, so `task-ab12`, `ab12`
/// and `AB12` all select `task-ab12...`.
pub fn matches_prefix(candidate: &str, input: &str) -> bool {
    let input = input.trim().to_ascii_lowercase();
    if input.is_empty() {
        return false;
    }
    let hex_part = candidate.strip_prefix(TASK_PREFIX).unwrap_or(candidate);
    candidate.starts_with(&input) || hex_part.starts_with(&input)
}

/// Resolve `input` against `existing` by unique prefix.
///
/// Returns `Ok(None)` when nothing matches, an `AmbiguousId` error when
/// several identifiers share the prefix.
pub fn resolve_prefix(input: &str, existing: &[String]) -> Result<Option<String>> {
    let mut matches: Vec<&String> = existing
        .iter()
        .filter(|id| matches_prefix(id, input))
        .collect();
    matches.sort();
    matches.dedup();

    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches[0].clone())),
        _ => Err(CtxError::AmbiguousId(
            input.trim().to_string(),
            matches
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )),
    }
}
