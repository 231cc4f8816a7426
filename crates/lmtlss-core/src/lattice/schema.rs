//! Lattice database schema: nodes, edges, evidence links, and an FTS5
//! mirror over `premise` maintained by triggers.

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS nodes (
    node_id        TEXT PRIMARY KEY,
    node_type      TEXT NOT NULL CHECK (node_type IN (
                       'identity','premise','relationship','preference',
                       'goal','value','operational','spatial','temporal')),
    premise        TEXT NOT NULL,
    status         TEXT NOT NULL CHECK (status IN ('provisional','active','archived')),
    created_by     TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    spatial_name   TEXT,
    spatial_lat    REAL,
    spatial_lng    REAL,
    temporal_start TEXT,
    temporal_end   TEXT,
    salience       REAL NOT NULL DEFAULT 0.0,
    valence        REAL NOT NULL DEFAULT 0.0,
    arousal        REAL NOT NULL DEFAULT 0.0,
    commitment     REAL NOT NULL DEFAULT 0.0,
    uncertainty    REAL NOT NULL DEFAULT 0.0,
    resonance      REAL NOT NULL DEFAULT 0.0
);

CREATE INDEX IF NOT EXISTS idx_nodes_salience ON nodes (salience DESC);
CREATE INDEX IF NOT EXISTS idx_nodes_status ON nodes (status);

CREATE TABLE IF NOT EXISTS edges (
    edge_id   TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES nodes(node_id),
    target_id TEXT NOT NULL REFERENCES nodes(node_id),
    relation  TEXT NOT NULL CHECK (relation IN (
                  'supports','contradicts','refines','depends_on',
                  'related_to','caused_by')),
    strength  REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges (source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges (target_id);

CREATE TABLE IF NOT EXISTS evidence (
    node_id    TEXT NOT NULL REFERENCES nodes(node_id),
    event_hash TEXT NOT NULL,
    link_type  TEXT NOT NULL CHECK (link_type IN ('origin','supports','contradicts')),
    PRIMARY KEY (node_id, event_hash, link_type)
);

CREATE INDEX IF NOT EXISTS idx_evidence_node ON evidence (node_id);

CREATE VIRTUAL TABLE IF NOT EXISTS nodes_fts USING fts5(
    node_id UNINDEXED,
    premise,
    tokenize = 'porter unicode61',
    prefix = '2 3'
);

CREATE TRIGGER IF NOT EXISTS nodes_fts_insert AFTER INSERT ON nodes BEGIN
    INSERT INTO nodes_fts (node_id, premise) VALUES (new.node_id, new.premise);
END;

CREATE TRIGGER IF NOT EXISTS nodes_fts_update AFTER UPDATE ON nodes BEGIN
    DELETE FROM nodes_fts WHERE node_id = old.node_id;
    INSERT INTO nodes_fts (node_id, premise) VALUES (new.node_id, new.premise);
END;

CREATE TRIGGER IF NOT EXISTS nodes_fts_delete AFTER DELETE ON nodes BEGIN
    DELETE FROM nodes_fts WHERE node_id = old.node_id;
END;
";

/// Open (creating if absent) the lattice database at `<state_dir>/soul.db`.
///
/// # Errors
///
/// Returns a `rusqlite::Error` if the connection cannot be opened or the
/// schema cannot be created.
pub fn open_lattice_db(state_dir: &Path) -> Result<Connection, rusqlite::Error> {
    std::fs::create_dir_all(state_dir).map_err(|e| {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            Some(e.to_string()),
        )
    })?;
    let conn = Connection::open(state_dir.join("soul.db"))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(conn)
}
