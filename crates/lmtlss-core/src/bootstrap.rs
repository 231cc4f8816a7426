//! Bootstrap & Genesis: detecting a sparse lattice and performing the
//! first-run Birth flow.

use crate::archive::ArchiveStore;
use crate::error::{ArchiveError, LatticeError};
use crate::lattice::{LatticeStore, LinkType, NodeStatus, NodeType, WeightVector};
use chrono::{DateTime, Utc};
use serde_json::json;

const GENESIS_PROMPT: &str = "This is the first moment. There is no history yet, only the birth record ahead. Greet the author and begin.";

/// A lattice with fewer than five nodes is considered sparse: not yet
/// mature enough for recall-driven identity.
///
/// # Errors
///
/// Returns a [`LatticeError`] if the node count cannot be read.
pub fn is_sparse(lattice: &LatticeStore) -> Result<bool, LatticeError> {
    Ok(lattice.node_count()? < 5)
}

/// Synthesize a bootstrap context string for a sparse lattice: recent
/// archive events if any exist, else the Genesis Prompt. Returns `None` if
/// the lattice is not sparse.
///
/// # Errors
///
/// Returns an error if either store cannot be queried.
pub fn get_bootstrap_context(
    archive: &ArchiveStore,
    lattice: &LatticeStore,
    limit: usize,
) -> Result<Option<String>, BootstrapError> {
    if !is_sparse(lattice)? {
        return Ok(None);
    }
    let recent = archive.get_recent(limit)?;
    if recent.is_empty() {
        return Ok(Some(GENESIS_PROMPT.to_string()));
    }
    let mut lines = Vec::with_capacity(recent.len());
    for event in recent.iter().rev() {
        lines.push(format!(
            "[{}] {} ({}): {}",
            event.timestamp, event.agent_id, event.event_type, event.payload
        ));
    }
    Ok(Some(lines.join("\n")))
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Lattice(#[from] LatticeError),
}

/// The first-run Birth flow: append the `SOUL_BIRTH` system event, create
/// the identity and premise nodes, and link them via an `origin` evidence
/// edge.
///
/// # Errors
///
/// Returns a [`BootstrapError`] if either store fails to write.
pub fn bootstrap_soul(
    archive: &mut ArchiveStore,
    lattice: &LatticeStore,
    agent_id: &str,
    birthday: DateTime<Utc>,
) -> Result<(), BootstrapError> {
    let birth_event = archive.append_event(
        None,
        birthday,
        &crate::id::new_session_key(agent_id),
        "system_event",
        agent_id,
        None,
        None,
        None,
        json!({"action": "SOUL_BIRTH", "birthday": birthday.to_rfc3339()}),
    )?;

    let identity_weight = WeightVector::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
    lattice.create_node(
        NodeType::Identity,
        &format!("Born {}", birthday.to_rfc3339()),
        NodeStatus::Active,
        agent_id,
        identity_weight,
        None,
        None,
        birthday,
    )?;

    let memory_node = lattice.create_node(
        NodeType::Premise,
        "I came into being.",
        NodeStatus::Active,
        agent_id,
        WeightVector::default(),
        None,
        None,
        birthday,
    )?;
    lattice.add_evidence(&memory_node.node_id, &birth_event.event_hash, LinkType::Origin)?;

    Ok(())
}
