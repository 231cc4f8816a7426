//! Event hash computation.
//!
//! `event_hash = SHA-256(parent_hash || timestamp || event_type || agent_id || canonical_json(payload))`
//!
//! `parent_hash` is the empty string when the event has no parent. The
//! result is hex-encoded, lowercase, unprefixed.

use crate::archive::canonical::canonicalize_json;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compute the hex-encoded SHA-256 event hash.
#[must_use]
pub fn compute_event_hash(
    parent_hash: Option<&str>,
    timestamp: &str,
    event_type: &str,
    agent_id: &str,
    payload: &Value,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent_hash.unwrap_or("").as_bytes());
    hasher.update(timestamp.as_bytes());
    hasher.update(event_type.as_bytes());
    hasher.update(agent_id.as_bytes());
    hasher.update(canonicalize_json(payload).as_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
