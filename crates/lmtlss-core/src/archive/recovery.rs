//! Crash recovery: reconcile the index against the day-partition tail.
//!
//! The append path writes the JSONL line, `fsync`s it, and only then
//! commits the index row (see [`crate::archive::store::ArchiveStore::append_event`]).
//! A crash between those two steps leaves the partition file ahead of the
//! index by exactly the rows that never got indexed — and if the crash
//! hits the very first event of a new day file, the index has no row for
//! that `payload_file` at all. On open, every `*.jsonl` file under the
//! state directory is scanned: the highest indexed `payload_line` for that
//! file (0 if the index has none) is compared against the file's actual
//! line count, and any gap is replayed by parsing and inserting the
//! missing tail rows.

use crate::archive::event::Event;
use crate::archive::partition::{count_lines, partition_path};
use rusqlite::{Connection, params};
use std::path::Path;
use tracing::{info, warn};

/// Scan every `*.jsonl` partition file present on disk — not merely those
/// the index already has a row for, since a crash between the first
/// partition `fsync` and its index commit leaves that file entirely
/// unindexed — and replay any unindexed tail rows. Returns the number of
/// rows recovered.
///
/// # Errors
///
/// Returns a `rusqlite::Error` on any database failure. Malformed tail
/// lines are skipped with a warning rather than aborting recovery.
pub fn recover(conn: &Connection, state_dir: &Path) -> Result<usize, rusqlite::Error> {
    let payload_files = list_partition_files(state_dir);

    let mut recovered = 0;
    for payload_file in payload_files {
        let max_indexed = max_indexed_line(conn, &payload_file)?;
        let path = state_dir.join(&payload_file);
        let actual_lines = count_lines(&path).unwrap_or(0);

        if actual_lines <= max_indexed {
            continue;
        }

        for line_no in (max_indexed + 1)..=actual_lines {
            match crate::archive::partition::read_line(&path, line_no) {
                Ok(Some(line)) => match serde_json::from_str::<Event>(&line) {
                    Ok(event) => {
                        insert_recovered_row(conn, &event, &payload_file, line_no)?;
                        recovered += 1;
                    }
                    Err(e) => {
                        warn!(file = %payload_file, line = line_no, error = %e, "skipping malformed tail line during recovery");
                    }
                },
                Ok(None) | Err(_) => {
                    warn!(file = %payload_file, line = line_no, "tail line unreadable during recovery");
                }
            }
        }
    }

    if recovered > 0 {
        info!(recovered, "archive recovery replayed unindexed tail rows");
    }

    Ok(recovered)
}

/// List the file names (not full paths) of every `*.jsonl` partition file
/// directly under `state_dir`, in no particular order.
fn list_partition_files(state_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(state_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("jsonl"))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect()
}

/// The highest indexed `payload_line` for `payload_file`, or 0 if the
/// index has no rows for it yet.
fn max_indexed_line(conn: &Connection, payload_file: &str) -> Result<usize, rusqlite::Error> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(payload_line) FROM events WHERE payload_file = ?1",
        params![payload_file],
        |r| r.get(0),
    )?;
    Ok(max.and_then(|n| usize::try_from(n).ok()).unwrap_or(0))
}

fn insert_recovered_row(
    conn: &Connection,
    event: &Event,
    payload_file: &str,
    payload_line: usize,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR IGNORE INTO events
            (event_hash, parent_hash, timestamp, session_key, event_type, agent_id, model, channel, peer, payload_file, payload_line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            event.event_hash,
            event.parent_hash,
            event.timestamp,
            event.session_key,
            event.event_type,
            event.agent_id,
            event.model,
            event.channel,
            event.peer,
            payload_file,
            i64::try_from(payload_line).unwrap_or(i64::MAX),
        ],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO events_fts (event_hash, text) VALUES (?1, ?2)",
        params![
            event.event_hash,
            event.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default()
        ],
    )?;
    Ok(())
}
