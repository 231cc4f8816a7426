//! `LatticeStore`: the belief graph's persistence layer over `soul.db`.

use crate::error::LatticeError;
use crate::id::new_ulid;
use crate::lattice::edge::{Edge, Relation};
use crate::lattice::evidence::{EvidenceLink, LinkType};
use crate::lattice::node::{Node, NodeStatus, NodeType};
use crate::lattice::schema::open_lattice_db;
use crate::lattice::weight::WeightVector;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub struct LatticeStore {
    conn: Connection,
}

impl LatticeStore {
    /// Open the lattice store at `<state_dir>/soul.db`, creating the schema
    /// if absent.
    ///
    /// # Errors
    ///
    /// Returns a [`LatticeError`] if the database cannot be opened.
    pub fn open(state_dir: &Path) -> Result<Self, LatticeError> {
        let conn = open_lattice_db(state_dir).map_err(|e| LatticeError::Io {
            reason: e.to_string(),
        })?;
        Ok(Self { conn })
    }

    /// Insert a new node with a fresh ULID, returning it.
    ///
    /// # Errors
    ///
    /// Returns a [`LatticeError`] if the insert fails.
    pub fn create_node(
        &self,
        node_type: NodeType,
        premise: &str,
        status: NodeStatus,
        created_by: &str,
        weight: WeightVector,
        spatial: Option<(String, f64, f64)>,
        temporal: Option<(String, String)>,
        now: DateTime<Utc>,
    ) -> Result<Node, LatticeError> {
        let node = Node {
            node_id: new_ulid(),
            node_type,
            premise: premise.to_string(),
            status,
            created_by: created_by.to_string(),
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
            spatial_name: spatial.as_ref().map(|(n, _, _)| n.clone()),
            spatial_lat: spatial.as_ref().map(|(_, lat, _)| *lat),
            spatial_lng: spatial.as_ref().map(|(_, _, lng)| *lng),
            temporal_start: temporal.as_ref().map(|(s, _)| s.clone()),
            temporal_end: temporal.as_ref().map(|(_, e)| e.clone()),
            weight,
        };
        self.conn.execute(
            "INSERT INTO nodes (node_id, node_type, premise, status, created_by, created_at,
                updated_at, spatial_name, spatial_lat, spatial_lng, temporal_start, temporal_end,
                salience, valence, arousal, commitment, uncertainty, resonance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                node.node_id,
                node.node_type.as_str(),
                node.premise,
                node.status.as_str(),
                node.created_by,
                node.created_at,
                node.updated_at,
                node.spatial_name,
                node.spatial_lat,
                node.spatial_lng,
                node.temporal_start,
                node.temporal_end,
                node.weight.salience,
                node.weight.valence,
                node.weight.arousal,
                node.weight.commitment,
                node.weight.uncertainty,
                node.weight.resonance,
            ],
        )?;
        Ok(node)
    }

    /// Fetch a node by id.
    ///
    /// # Errors
    ///
    /// Returns a [`LatticeError`] if the query fails.
    pub fn get_node(&self, node_id: &str) -> Result<Option<Node>, LatticeError> {
        self.conn
            .query_row("SELECT * FROM nodes WHERE node_id = ?1", [node_id], row_to_node)
            .optional()
            .map_err(Into::into)
    }

    /// Replace a node's weight vector and bump `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`LatticeError::NodeNotFound`] if the node does not exist.
    pub fn update_node_weight(
        &self,
        node_id: &str,
        weight: WeightVector,
        now: DateTime<Utc>,
    ) -> Result<(), LatticeError> {
        let changed = self.conn.execute(
            "UPDATE nodes SET salience = ?1, valence = ?2, arousal = ?3, commitment = ?4,
                uncertainty = ?5, resonance = ?6, updated_at = ?7 WHERE node_id = ?8",
            params![
                weight.salience,
                weight.valence,
                weight.arousal,
                weight.commitment,
                weight.uncertainty,
                weight.resonance,
                now.to_rfc3339(),
                node_id,
            ],
        )?;
        if changed == 0 {
            return Err(LatticeError::NodeNotFound {
                node_id: node_id.to_string(),
            });
        }
        Ok(())
    }

    /// Update a node's status and bump `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`LatticeError::NodeNotFound`] if the node does not exist.
    pub fn update_status(
        &self,
        node_id: &str,
        status: NodeStatus,
        now: DateTime<Utc>,
    ) -> Result<(), LatticeError> {
        let changed = self.conn.execute(
            "UPDATE nodes SET status = ?1, updated_at = ?2 WHERE node_id = ?3",
            params![status.as_str(), now.to_rfc3339(), node_id],
        )?;
        if changed == 0 {
            return Err(LatticeError::NodeNotFound {
                node_id: node_id.to_string(),
            });
        }
        Ok(())
    }

    /// Create an edge between two existing nodes.
    ///
    /// # Errors
    ///
    /// Returns [`LatticeError::SelfLoop`] if `source == target`, or
    /// [`LatticeError::Referential`] if either endpoint does not exist.
    pub fn create_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relation: Relation,
        strength: f64,
        now: DateTime<Utc>,
    ) -> Result<Edge, LatticeError> {
        if source_id == target_id {
            return Err(LatticeError::SelfLoop {
                node_id: source_id.to_string(),
            });
        }
        if self.get_node(source_id)?.is_none() {
            return Err(LatticeError::Referential {
                endpoint: source_id.to_string(),
            });
        }
        if self.get_node(target_id)?.is_none() {
            return Err(LatticeError::Referential {
                endpoint: target_id.to_string(),
            });
        }
        let edge = Edge {
            edge_id: new_ulid(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation,
            strength: strength.clamp(0.0, 1.0),
            created_at: now.to_rfc3339(),
        };
        self.conn.execute(
            "INSERT INTO edges (edge_id, source_id, target_id, relation, strength, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                edge.edge_id,
                edge.source_id,
                edge.target_id,
                edge.relation.as_str(),
                edge.strength,
                edge.created_at,
            ],
        )?;
        Ok(edge)
    }

    /// Fetch every edge touching `node_id` as either endpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`LatticeError`] if the query fails.
    pub fn get_edges(&self, node_id: &str) -> Result<Vec<Edge>, LatticeError> {
        let mut stmt = self.conn.prepare(
            "SELECT edge_id, source_id, target_id, relation, strength, created_at
             FROM edges WHERE source_id = ?1 OR target_id = ?1",
        )?;
        let rows = stmt
            .query_map([node_id], row_to_edge)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Fetch every edge whose endpoints are both within `node_ids`.
    ///
    /// # Errors
    ///
    /// Returns a [`LatticeError`] if the query fails.
    pub fn get_edges_for_nodes(&self, node_ids: &[String]) -> Result<Vec<Edge>, LatticeError> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = node_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT edge_id, source_id, target_id, relation, strength, created_at
             FROM edges WHERE source_id IN ({placeholders}) AND target_id IN ({placeholders})"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = node_ids
            .iter()
            .chain(node_ids.iter())
            .map(|s| s as &dyn rusqlite::ToSql)
            .collect();
        let rows = stmt
            .query_map(params.as_slice(), row_to_edge)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Attach an evidence link between a node and an archive event hash.
    ///
    /// # Errors
    ///
    /// Returns [`LatticeError::Referential`] if the node does not exist.
    pub fn add_evidence(
        &self,
        node_id: &str,
        event_hash: &str,
        link_type: LinkType,
    ) -> Result<(), LatticeError> {
        if self.get_node(node_id)?.is_none() {
            return Err(LatticeError::Referential {
                endpoint: node_id.to_string(),
            });
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO evidence (node_id, event_hash, link_type) VALUES (?1, ?2, ?3)",
            params![node_id, event_hash, link_type.as_str()],
        )?;
        Ok(())
    }

    /// Fetch every evidence link for a node.
    ///
    /// # Errors
    ///
    /// Returns a [`LatticeError`] if the query fails.
    pub fn get_evidence(&self, node_id: &str) -> Result<Vec<EvidenceLink>, LatticeError> {
        let mut stmt = self
            .conn
            .prepare("SELECT node_id, event_hash, link_type FROM evidence WHERE node_id = ?1")?;
        let rows = stmt
            .query_map([node_id], |row| {
                let link_type: String = row.get(2)?;
                Ok(EvidenceLink {
                    node_id: row.get(0)?,
                    event_hash: row.get(1)?,
                    link_type: LinkType::parse(&link_type).unwrap_or(LinkType::Supports),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Full-text search of non-archived node premises, ranked by FTS match
    /// quality with salience as a tiebreak.
    ///
    /// # Errors
    ///
    /// Returns a [`LatticeError`] if the query fails (including a malformed
    /// FTS5 query string).
    pub fn search_nodes(&self, query: &str, limit: usize) -> Result<Vec<Node>, LatticeError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT n.* FROM nodes n
             JOIN nodes_fts f ON f.node_id = n.node_id
             WHERE f.premise MATCH ?1 AND n.status != 'archived'
             ORDER BY bm25(f) ASC, n.salience DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![query, i64::try_from(limit).unwrap_or(i64::MAX)], row_to_node)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The top `n` non-archived nodes by salience, ties broken by
    /// `updated_at` descending then `node_id` ascending.
    ///
    /// # Errors
    ///
    /// Returns a [`LatticeError`] if the query fails.
    pub fn get_top_salience(&self, limit: usize) -> Result<Vec<Node>, LatticeError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM nodes WHERE status != 'archived'
             ORDER BY salience DESC, updated_at DESC, node_id ASC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([i64::try_from(limit).unwrap_or(i64::MAX)], row_to_node)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All nodes with the given status, ordered by `node_id` for
    /// deterministic iteration. Used by the daily maintenance promotion
    /// step and by decay, which both need to walk every node of a status
    /// rather than just the top-salience slice the Capsule uses.
    ///
    /// # Errors
    ///
    /// Returns a [`LatticeError`] if the query fails.
    pub fn get_nodes_by_status(&self, status: NodeStatus) -> Result<Vec<Node>, LatticeError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM nodes WHERE status = ?1 ORDER BY node_id ASC")?;
        let rows = stmt
            .query_map([status.as_str()], row_to_node)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count of all nodes regardless of status. Used by [`crate::bootstrap::is_sparse`].
    ///
    /// # Errors
    ///
    /// Returns a [`LatticeError`] if the query fails.
    pub fn node_count(&self) -> Result<usize, LatticeError> {
        let n: i64 = self
            .conn
            .query_row("SELECT count(*) FROM nodes", [], |r| r.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Checkpoint the WAL back into the main database file.
    ///
    /// # Errors
    ///
    /// Returns a [`LatticeError`] if the pragma fails.
    pub fn checkpoint(&self) -> Result<(), LatticeError> {
        self.conn
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    /// Run `PRAGMA optimize` to refresh query planner statistics.
    ///
    /// # Errors
    ///
    /// Returns a [`LatticeError`] if the pragma fails.
    pub fn optimize(&self) -> Result<(), LatticeError> {
        self.conn.execute_batch("PRAGMA optimize;")?;
        Ok(())
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    let node_type: String = row.get("node_type")?;
    let status: String = row.get("status")?;
    Ok(Node {
        node_id: row.get("node_id")?,
        node_type: NodeType::parse(&node_type).unwrap_or(NodeType::Premise),
        premise: row.get("premise")?,
        status: NodeStatus::parse(&status).unwrap_or(NodeStatus::Provisional),
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        spatial_name: row.get("spatial_name")?,
        spatial_lat: row.get("spatial_lat")?,
        spatial_lng: row.get("spatial_lng")?,
        temporal_start: row.get("temporal_start")?,
        temporal_end: row.get("temporal_end")?,
        weight: WeightVector::new(
            row.get("salience")?,
            row.get("valence")?,
            row.get("arousal")?,
            row.get("commitment")?,
            row.get("uncertainty")?,
            row.get("resonance")?,
        ),
    })
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
    let relation: String = row.get(3)?;
    Ok(Edge {
        edge_id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        relation: Relation::parse(&relation).unwrap_or(Relation::RelatedTo),
        strength: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn temp_dir(label: &str) -> std::path::PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("lmtlss-lattice-store-test-{label}-{id}"))
    }

    fn store(label: &str) -> (LatticeStore, std::path::PathBuf) {
        let dir = temp_dir(label);
        (LatticeStore::open(&dir).unwrap(), dir)
    }

    #[test]
    fn create_and_get_node_round_trips() {
        let (s, dir) = store("create-get");
        let now = Utc::now();
        let n = s
            .create_node(
                NodeType::Premise,
                "the sky is blue",
                NodeStatus::Provisional,
                "agent-1",
                WeightVector::default(),
                None,
                None,
                now,
            )
            .unwrap();
        let fetched = s.get_node(&n.node_id).unwrap().unwrap();
        assert_eq!(fetched.premise, "the sky is blue");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn update_weight_on_missing_node_errors() {
        let (s, dir) = store("missing-weight");
        let err = s.update_node_weight("nope", WeightVector::default(), Utc::now());
        assert!(matches!(err, Err(LatticeError::NodeNotFound { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn create_edge_rejects_self_loop() {
        let (s, dir) = store("self-loop");
        let now = Utc::now();
        let n = s
            .create_node(
                NodeType::Premise,
                "p",
                NodeStatus::Active,
                "a",
                WeightVector::default(),
                None,
                None,
                now,
            )
            .unwrap();
        let err = s.create_edge(&n.node_id, &n.node_id, Relation::Supports, 1.0, now);
        assert!(matches!(err, Err(LatticeError::SelfLoop { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn create_edge_rejects_missing_endpoint() {
        let (s, dir) = store("missing-endpoint");
        let now = Utc::now();
        let n = s
            .create_node(
                NodeType::Premise,
                "p",
                NodeStatus::Active,
                "a",
                WeightVector::default(),
                None,
                None,
                now,
            )
            .unwrap();
        let err = s.create_edge(&n.node_id, "nonexistent", Relation::Supports, 1.0, now);
        assert!(matches!(err, Err(LatticeError::Referential { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn search_nodes_finds_by_premise_text() {
        let (s, dir) = store("search");
        let now = Utc::now();
        s.create_node(
            NodeType::Premise,
            "the author prefers dark mode",
            NodeStatus::Active,
            "a",
            WeightVector::default(),
            None,
            None,
            now,
        )
        .unwrap();
        let results = s.search_nodes("dark mode", 10).unwrap();
        assert_eq!(results.len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn get_top_salience_orders_descending_and_excludes_archived() {
        let (s, dir) = store("top-salience");
        let now = Utc::now();
        let low = s
            .create_node(
                NodeType::Premise,
                "low",
                NodeStatus::Active,
                "a",
                WeightVector::new(0.1, 0.0, 0.0, 0.0, 0.0, 0.0),
                None,
                None,
                now,
            )
            .unwrap();
        let high = s
            .create_node(
                NodeType::Premise,
                "high",
                NodeStatus::Active,
                "a",
                WeightVector::new(0.9, 0.0, 0.0, 0.0, 0.0, 0.0),
                None,
                None,
                now,
            )
            .unwrap();
        let archived = s
            .create_node(
                NodeType::Premise,
                "archived",
                NodeStatus::Active,
                "a",
                WeightVector::new(0.99, 0.0, 0.0, 0.0, 0.0, 0.0),
                None,
                None,
                now,
            )
            .unwrap();
        s.update_status(&archived.node_id, NodeStatus::Archived, now).unwrap();
        let top = s.get_top_salience(10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].node_id, high.node_id);
        assert_eq!(top[1].node_id, low.node_id);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn add_evidence_and_get_evidence_round_trips() {
        let (s, dir) = store("evidence");
        let now = Utc::now();
        let n = s
            .create_node(
                NodeType::Premise,
                "p",
                NodeStatus::Active,
                "a",
                WeightVector::default(),
                None,
                None,
                now,
            )
            .unwrap();
        s.add_evidence(&n.node_id, "deadbeef", LinkType::Origin).unwrap();
        let ev = s.get_evidence(&n.node_id).unwrap();
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[0].event_hash, "deadbeef");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn node_count_reflects_inserts() {
        let (s, dir) = store("count");
        assert_eq!(s.node_count().unwrap(), 0);
        s.create_node(
            NodeType::Premise,
            "p",
            NodeStatus::Active,
            "a",
            WeightVector::default(),
            None,
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(s.node_count().unwrap(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn get_nodes_by_status_filters_and_excludes_others() {
        let (s, dir) = store("by-status");
        let now = Utc::now();
        let provisional = s
            .create_node(NodeType::Premise, "p1", NodeStatus::Provisional, "a", WeightVector::default(), None, None, now)
            .unwrap();
        s.create_node(NodeType::Premise, "p2", NodeStatus::Active, "a", WeightVector::default(), None, None, now)
            .unwrap();
        let found = s.get_nodes_by_status(NodeStatus::Provisional).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node_id, provisional.node_id);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
