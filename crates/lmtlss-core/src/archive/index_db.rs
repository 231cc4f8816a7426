//! Archive index database: one row per event, plus an FTS mirror over the
//! `text` field of event payloads for archive-content search.

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS events (
    event_hash   TEXT PRIMARY KEY,
    parent_hash  TEXT,
    timestamp    TEXT NOT NULL,
    session_key  TEXT NOT NULL,
    event_type   TEXT NOT NULL,
    agent_id     TEXT NOT NULL,
    model        TEXT,
    channel      TEXT,
    peer         TEXT,
    payload_file TEXT NOT NULL,
    payload_line INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events (timestamp);
CREATE INDEX IF NOT EXISTS idx_events_session_key ON events (session_key);
CREATE INDEX IF NOT EXISTS idx_events_agent_id ON events (agent_id);
CREATE INDEX IF NOT EXISTS idx_events_payload_file ON events (payload_file, payload_line);

CREATE VIRTUAL TABLE IF NOT EXISTS events_fts USING fts5(
    event_hash UNINDEXED,
    text,
    tokenize = 'porter unicode61'
);
";

/// Open (creating if absent) the archive index database at
/// `<state_dir>/archive.db`, configured with the runtime pragmas this
/// system relies on throughout: WAL journaling, `NORMAL` sync, foreign
/// keys, and a 5 second busy timeout.
///
/// # Errors
///
/// Returns a `rusqlite::Error` if the connection cannot be opened or the
/// schema cannot be created.
pub fn open_index_db(state_dir: &Path) -> Result<Connection, rusqlite::Error> {
    std::fs::create_dir_all(state_dir).map_err(|e| {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            Some(e.to_string()),
        )
    })?;
    let conn = Connection::open(state_dir.join("archive.db"))?;
    configure_connection(&conn)?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}
