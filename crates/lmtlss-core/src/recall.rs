//! Recall: merges a chronological slice of recent archive events with a
//! semantic slice found via the lattice's full-text search.

use crate::archive::{ArchiveStore, Event};
use crate::error::{ArchiveError, LatticeError};
use crate::lattice::LatticeStore;
use chrono::{DateTime, Utc};

pub struct RecallOptions {
    pub recent_count: usize,
    pub semantic_count: usize,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub agent_id: Option<String>,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            recent_count: 5,
            semantic_count: 5,
            time_range: None,
            agent_id: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecallError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Lattice(#[from] LatticeError),
}

/// Recall events relevant to `query` per the chronological+semantic merge
/// algorithm: take the chronological slice, add up to `semantic_count`
/// semantically matched events not already present, dedup by `event_hash`,
/// and sort by timestamp ascending (hash as a final deterministic tiebreak).
///
/// # Errors
///
/// Returns a [`RecallError`] if either store fails to query.
pub fn recall(
    archive: &ArchiveStore,
    lattice: &LatticeStore,
    query: &str,
    options: &RecallOptions,
) -> Result<Vec<Event>, RecallError> {
    let chronological = chronological_slice(archive, options)?;
    let mut seen: std::collections::HashSet<String> =
        chronological.iter().map(|e| e.event_hash.clone()).collect();

    let mut merged = chronological;

    if !query.trim().is_empty() && options.semantic_count > 0 {
        let k = options.semantic_count * 3;
        let hits = lattice.search_nodes(query, k)?;
        let mut added = 0usize;
        'hits: for node in hits {
            for evidence in lattice.get_evidence(&node.node_id)? {
                if added >= options.semantic_count {
                    break 'hits;
                }
                if seen.contains(&evidence.event_hash) {
                    continue;
                }
                if let Some(event) = archive.get_by_hash(&evidence.event_hash)? {
                    seen.insert(event.event_hash.clone());
                    merged.push(event);
                    added += 1;
                }
            }
        }
    }

    merged.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.event_hash.cmp(&b.event_hash)));
    Ok(merged)
}

fn chronological_slice(archive: &ArchiveStore, options: &RecallOptions) -> Result<Vec<Event>, ArchiveError> {
    if let Some((start, end)) = options.time_range {
        let mut events = archive.get_by_time_range(start, end)?;
        if let Some(agent_id) = &options.agent_id {
            events.retain(|e| &e.agent_id == agent_id);
        }
        return Ok(events);
    }

    let mut events = if let Some(agent_id) = &options.agent_id {
        archive.get_recent_for_agent(agent_id, options.recent_count)?
    } else {
        archive.get_recent(options.recent_count)?
    };
    // get_recent is newest-first; the chronological slice is oldest-first.
    events.reverse();
    Ok(events)
}
