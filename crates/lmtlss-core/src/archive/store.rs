//! The Archive Store: a content-addressed, hash-chained, day-partitioned
//! event log backed by a SQLite row index and FTS mirror.

use crate::archive::event::{Event, EventType};
use crate::archive::hash::compute_event_hash;
use crate::archive::index_db::open_index_db;
use crate::archive::partition::{append_line, partition_path, read_line, PartitionCache};
use crate::archive::recovery::recover;
use crate::error::ArchiveError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tracing::instrument;

const DEFAULT_CACHE_CAPACITY: usize = 8;

/// Content-addressed hash-chained event log, sole-writer per process.
pub struct ArchiveStore {
    conn: Connection,
    state_dir: PathBuf,
    cache: RefCell<PartitionCache>,
}

impl ArchiveStore {
    /// Open (or create) the archive at `state_dir`, running crash recovery
    /// to reconcile any unindexed tail rows.
    ///
    /// # Errors
    ///
    /// Returns an [`ArchiveError`] if the index database cannot be opened
    /// or recovery fails.
    pub fn open(state_dir: &Path) -> Result<Self, ArchiveError> {
        let conn = open_index_db(state_dir).map_err(|e| ArchiveError::WriteFailed {
            reason: e.to_string(),
        })?;
        recover(&conn, state_dir).map_err(|e| ArchiveError::WriteFailed {
            reason: e.to_string(),
        })?;
        Ok(Self {
            conn,
            state_dir: state_dir.to_path_buf(),
            cache: RefCell::new(PartitionCache::new(DEFAULT_CACHE_CAPACITY)),
        })
    }

    /// Append a new event to the archive.
    ///
    /// Normalizes the event type, enforces `world_action` approval gating,
    /// computes the event hash, and durably writes the JSONL line before
    /// committing the index row.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::UnknownEventType`] for an unrecognized type,
    /// [`ArchiveError::WorldActionNotApproved`] for an ungated world action,
    /// or [`ArchiveError::WriteFailed`] on I/O or database failure.
    #[instrument(skip(self, payload), fields(event_type = %event_type))]
    #[allow(clippy::too_many_arguments)]
    pub fn append_event(
        &mut self,
        parent_hash: Option<&str>,
        timestamp: DateTime<Utc>,
        session_key: &str,
        event_type: &str,
        agent_id: &str,
        model: Option<&str>,
        channel: Option<&str>,
        peer: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<Event, ArchiveError> {
        let normalized = EventType::normalize(event_type)?;

        if normalized == EventType::WorldAction {
            let approved = payload
                .get("approved")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            let has_approval_id = payload
                .get("approvalId")
                .and_then(|v| v.as_str())
                .is_some_and(|s| !s.is_empty());
            if !approved || !has_approval_id {
                return Err(ArchiveError::WorldActionNotApproved);
            }
        }

        let timestamp_str = timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let event_hash = compute_event_hash(
            parent_hash,
            &timestamp_str,
            normalized.as_str(),
            agent_id,
            &payload,
        );

        let date = timestamp.date_naive();
        let payload_file = partition_path(&self.state_dir, date)
            .file_name()
            .expect("partition path always has a file name")
            .to_string_lossy()
            .to_string();

        let event = Event {
            event_hash: event_hash.clone(),
            parent_hash: parent_hash.map(ToString::to_string),
            timestamp: timestamp_str,
            session_key: session_key.to_string(),
            event_type: normalized.as_str().to_string(),
            agent_id: agent_id.to_string(),
            model: model.map(ToString::to_string),
            channel: channel.map(ToString::to_string),
            peer: peer.map(ToString::to_string),
            payload,
            payload_file: payload_file.clone(),
            payload_line: 0,
        };

        let line = event.to_jsonl_line().map_err(|e| ArchiveError::WriteFailed {
            reason: e.to_string(),
        })?;

        let payload_line = append_line(&self.state_dir, date, &line).map_err(|e| {
            ArchiveError::WriteFailed {
                reason: e.to_string(),
            }
        })?;
        self.cache.borrow_mut().invalidate(date);

        let text = event
            .payload
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        self.conn
            .execute(
                "INSERT INTO events
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
            )
            .map_err(|e| ArchiveError::WriteFailed { reason: e.to_string() })?;
        self.conn
            .execute(
                "INSERT INTO events_fts (event_hash, text) VALUES (?1, ?2)",
                params![event.event_hash, text],
            )
            .map_err(|e| ArchiveError::WriteFailed { reason: e.to_string() })?;

        Ok(Event {
            payload_line,
            ..event
        })
    }

    /// Fetch a single event by its hash, hydrating the payload from its
    /// day partition and verifying hash integrity.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Corruption`] if the recomputed hash does not
    /// match, or [`ArchiveError::WriteFailed`] on database/I/O failure.
    pub fn get_by_hash(&self, hash: &str) -> Result<Option<Event>, ArchiveError> {
        let row = self
            .conn
            .query_row(
                "SELECT event_hash, parent_hash, timestamp, session_key, event_type, agent_id, model, channel, peer, payload_file, payload_line
                 FROM events WHERE event_hash = ?1",
                params![hash],
                Self::row_to_locator,
            )
            .optional()
            .map_err(|e| ArchiveError::WriteFailed { reason: e.to_string() })?;

        let Some(locator) = row else { return Ok(None) };
        self.hydrate(locator).map(Some)
    }

    /// Events for a session, ordered by timestamp ascending.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] on database, I/O, or hash-integrity failure.
    pub fn get_by_session(&self, session_key: &str) -> Result<Vec<Event>, ArchiveError> {
        self.query_locators(
            "SELECT event_hash, parent_hash, timestamp, session_key, event_type, agent_id, model, channel, peer, payload_file, payload_line
             FROM events WHERE session_key = ?1 ORDER BY timestamp ASC",
            params![session_key],
        )
    }

    /// Events within `[start, end]` inclusive, ordered by timestamp
    /// ascending.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] on database, I/O, or hash-integrity failure.
    pub fn get_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, ArchiveError> {
        self.query_locators(
            "SELECT event_hash, parent_hash, timestamp, session_key, event_type, agent_id, model, channel, peer, payload_file, payload_line
             FROM events WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY timestamp ASC",
            params![
                start.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                end.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            ],
        )
    }

    /// The `limit` most recent events, newest-first, ties broken by
    /// insertion order (rowid).
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] on database, I/O, or hash-integrity failure.
    pub fn get_recent(&self, limit: usize) -> Result<Vec<Event>, ArchiveError> {
        self.query_locators(
            "SELECT event_hash, parent_hash, timestamp, session_key, event_type, agent_id, model, channel, peer, payload_file, payload_line
             FROM events ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
            params![i64::try_from(limit).unwrap_or(i64::MAX)],
        )
    }

    /// Like [`Self::get_recent`] but restricted to one `agent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] on database, I/O, or hash-integrity failure.
    pub fn get_recent_for_agent(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<Event>, ArchiveError> {
        self.query_locators(
            "SELECT event_hash, parent_hash, timestamp, session_key, event_type, agent_id, model, channel, peer, payload_file, payload_line
             FROM events WHERE agent_id = ?1 ORDER BY timestamp DESC, rowid DESC LIMIT ?2",
            params![agent_id, i64::try_from(limit).unwrap_or(i64::MAX)],
        )
    }

    /// Total number of events in the archive, regardless of type or agent.
    /// Used by [`crate::circulation`] to describe the presence probe.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::WriteFailed`] if the query fails.
    pub fn event_count(&self) -> Result<usize, ArchiveError> {
        let n: i64 = self
            .conn
            .query_row("SELECT count(*) FROM events", [], |r| r.get(0))
            .map_err(|e| ArchiveError::WriteFailed { reason: e.to_string() })?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Flush the write-ahead log to the main database file.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::WriteFailed`] if the checkpoint fails.
    pub fn checkpoint(&self) -> Result<(), ArchiveError> {
        self.conn
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| ArchiveError::WriteFailed { reason: e.to_string() })
    }

    /// Refresh query-planner statistics.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::WriteFailed`] if the pragma fails.
    pub fn optimize(&self) -> Result<(), ArchiveError> {
        self.conn
            .execute_batch("PRAGMA optimize;")
            .map_err(|e| ArchiveError::WriteFailed { reason: e.to_string() })
    }

    fn row_to_locator(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventLocator> {
        Ok(EventLocator {
            event_hash: row.get(0)?,
            parent_hash: row.get(1)?,
            timestamp: row.get(2)?,
            session_key: row.get(3)?,
            event_type: row.get(4)?,
            agent_id: row.get(5)?,
            model: row.get(6)?,
            channel: row.get(7)?,
            peer: row.get(8)?,
            payload_file: row.get(9)?,
            payload_line: {
                let v: i64 = row.get(10)?;
                usize::try_from(v).unwrap_or(0)
            },
        })
    }

    fn query_locators(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Event>, ArchiveError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| ArchiveError::WriteFailed { reason: e.to_string() })?;
        let locators: Vec<EventLocator> = stmt
            .query_map(params, Self::row_to_locator)
            .map_err(|e| ArchiveError::WriteFailed { reason: e.to_string() })?
            .collect::<Result<_, _>>()
            .map_err(|e| ArchiveError::WriteFailed { reason: e.to_string() })?;
        locators.into_iter().map(|l| self.hydrate(l)).collect()
    }

    fn hydrate(&self, locator: EventLocator) -> Result<Event, ArchiveError> {
        let date = chrono::NaiveDate::parse_from_str(
            locator.payload_file.trim_end_matches(".jsonl"),
            "%Y-%m-%d",
        )
        .map_err(|e| ArchiveError::WriteFailed { reason: e.to_string() })?;

        let line = {
            let mut cache = self.cache.borrow_mut();
            cache.get_line(&self.state_dir, date, locator.payload_line)
        };
        let line = match line {
            Ok(Some(l)) => l,
            Ok(None) => {
                let path = self.state_dir.join(&locator.payload_file);
                read_line(&path, locator.payload_line)
                    .map_err(|e| ArchiveError::WriteFailed { reason: e.to_string() })?
                    .ok_or_else(|| ArchiveError::IndexMismatch {
                        line: locator.payload_line,
                        reason: "line not found in partition file".into(),
                    })?
            }
            Err(e) => {
                return Err(ArchiveError::WriteFailed { reason: e.to_string() });
            }
        };

        let mut event: Event = serde_json::from_str(&line).map_err(|e| ArchiveError::IndexMismatch {
            line: locator.payload_line,
            reason: e.to_string(),
        })?;

        if event.event_hash != locator.event_hash {
            return Err(ArchiveError::IndexMismatch {
                line: locator.payload_line,
                reason: "line content does not match index row".into(),
            });
        }

        if !event.verify_hash() {
            return Err(ArchiveError::Corruption {
                event_hash: locator.event_hash,
                recomputed: compute_event_hash(
                    event.parent_hash.as_deref(),
                    &event.timestamp,
                    &event.event_type,
                    &event.agent_id,
                    &event.payload,
                ),
            });
        }

        event.payload_file = locator.payload_file;
        event.payload_line = locator.payload_line;
        Ok(event)
    }
}

struct EventLocator {
    event_hash: String,
    parent_hash: Option<String>,
    timestamp: String,
    session_key: String,
    event_type: String,
    agent_id: String,
    model: Option<String>,
    channel: Option<String>,
    peer: Option<String>,
    payload_file: String,
    payload_line: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn temp_dir(label: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("lmtlss-store-test-{label}-{id}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn append_then_get_by_hash_round_trips() {
        let dir = temp_dir("append-get");
        let mut store = ArchiveStore::open(&dir).unwrap();
        let ev = store
            .append_event(
                None,
                ts("2026-01-01T00:00:00Z"),
                "lmtlss:a:01",
                "author_message",
                "a",
                None,
                None,
                None,
                json!({"text": "hi"}),
            )
            .unwrap();

        let fetched = store.get_by_hash(&ev.event_hash).unwrap().unwrap();
        assert_eq!(fetched.event_hash, ev.event_hash);
        assert_eq!(fetched.payload, json!({"text": "hi"}));
        assert_eq!(fetched.payload_line, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn hash_chain_links_parent_and_child() {
        let dir = temp_dir("chain");
        let mut store = ArchiveStore::open(&dir).unwrap();
        let e1 = store
            .append_event(None, ts("2026-01-01T00:00:00Z"), "lmtlss:a:01", "author_message", "a", None, None, None, json!({"msg":1}))
            .unwrap();
        let e2 = store
            .append_event(Some(&e1.event_hash), ts("2026-01-01T00:00:01Z"), "lmtlss:a:01", "assistant_message", "a", None, None, None, json!({"msg":2}))
            .unwrap();

        assert_ne!(e1.event_hash, e2.event_hash);
        let fetched = store.get_by_hash(&e2.event_hash).unwrap().unwrap();
        assert_eq!(fetched.parent_hash.as_deref(), Some(e1.event_hash.as_str()));
    }

    #[test]
    fn world_action_requires_approval() {
        let dir = temp_dir("world-action");
        let mut store = ArchiveStore::open(&dir).unwrap();
        let err = store
            .append_event(None, ts("2026-01-01T00:00:00Z"), "lmtlss:a:01", "world_action", "a", None, None, None, json!({"action":"deploy"}))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::WorldActionNotApproved));

        let ok = store.append_event(
            None,
            ts("2026-01-01T00:00:00Z"),
            "lmtlss:a:01",
            "world_action",
            "a",
            None,
            None,
            None,
            json!({"action":"deploy", "approvalId":"appr_123", "approved": true}),
        );
        assert!(ok.is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn day_boundary_events_both_retrievable() {
        let dir = temp_dir("boundary");
        let mut store = ArchiveStore::open(&dir).unwrap();
        let e1 = store
            .append_event(None, ts("2026-01-01T23:59:59.999Z"), "lmtlss:a:01", "heartbeat", "a", None, None, None, json!({}))
            .unwrap();
        let e2 = store
            .append_event(Some(&e1.event_hash), ts("2026-01-02T00:00:00.000Z"), "lmtlss:a:01", "heartbeat", "a", None, None, None, json!({}))
            .unwrap();

        assert!(store.get_by_hash(&e1.event_hash).unwrap().is_some());
        assert!(store.get_by_hash(&e2.event_hash).unwrap().is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn get_recent_orders_newest_first() {
        let dir = temp_dir("recent");
        let mut store = ArchiveStore::open(&dir).unwrap();
        for i in 0..3u32 {
            store
                .append_event(
                    None,
                    Utc.timestamp_opt(1_700_000_000 + i64::from(i), 0).unwrap(),
                    "lmtlss:a:01",
                    "heartbeat",
                    "a",
                    None,
                    None,
                    None,
                    json!({"i": i}),
                )
                .unwrap();
        }
        let recent = store.get_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].payload, json!({"i": 2}));
        assert_eq!(recent[1].payload, json!({"i": 1}));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let dir = temp_dir("unknown-type");
        let mut store = ArchiveStore::open(&dir).unwrap();
        let err = store
            .append_event(None, ts("2026-01-01T00:00:00Z"), "lmtlss:a:01", "not_a_type", "a", None, None, None, json!({}))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnknownEventType { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn legacy_event_type_alias_normalized_on_append() {
        let dir = temp_dir("alias");
        let mut store = ArchiveStore::open(&dir).unwrap();
        let ev = store
            .append_event(None, ts("2026-01-01T00:00:00Z"), "lmtlss:a:01", "user_message", "a", None, None, None, json!({"text":"hi"}))
            .unwrap();
        assert_eq!(ev.event_type, "author_message");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
