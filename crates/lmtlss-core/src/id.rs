//! Identifier generation and validation.
//!
//! Node ids and the ULID segment of a session key are generated with the
//! [`ulid`] crate, which produces lexicographically sortable, millisecond
//! timestamp-prefixed identifiers.

use crate::error::ArchiveError;
use ulid::Ulid;

/// Generate a fresh ULID, rendered in its canonical Crockford base32 form.
#[must_use]
pub fn new_ulid() -> String {
    Ulid::new().to_string()
}

/// Build a session key of the form `lmtlss:<agent_id>:<ULID>`.
#[must_use]
pub fn new_session_key(agent_id: &str) -> String {
    format!("lmtlss:{agent_id}:{}", new_ulid())
}

/// Validate a session key against the `lmtlss:<agent_id>:<ULID>` format.
///
/// # Errors
///
/// Returns [`ArchiveError::InvalidSessionKey`] if the key does not have
/// exactly three non-empty colon-separated segments, the first segment is
/// not `lmtlss`, or the third segment is not a well-formed ULID.
pub fn validate_session_key(raw: &str) -> Result<(), ArchiveError> {
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 3 {
        return Err(ArchiveError::InvalidSessionKey {
            raw: raw.to_string(),
            reason: format!("expected 3 colon-separated segments, found {}", parts.len()),
        });
    }

    let [scheme, agent_id, ulid_part] = [parts[0], parts[1], parts[2]];

    if scheme != "lmtlss" {
        return Err(ArchiveError::InvalidSessionKey {
            raw: raw.to_string(),
            reason: format!("expected scheme 'lmtlss', found '{scheme}'"),
        });
    }

    if agent_id.is_empty() {
        return Err(ArchiveError::InvalidSessionKey {
            raw: raw.to_string(),
            reason: "agent_id segment is empty".to_string(),
        });
    }

    Ulid::from_string(ulid_part).map_err(|e| ArchiveError::InvalidSessionKey {
        raw: raw.to_string(),
        reason: format!("ULID segment invalid: {e}"),
    })?;

    Ok(())
}
