//! Capsule Builder: renders the active lattice to a bounded Markdown
//! document ("SOUL.md") for inclusion in the identity digest.

use crate::config::CapsuleConfig;
use crate::error::LatticeError;
use crate::lattice::node::{Node, NodeType};
use crate::lattice::store::LatticeStore;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;

/// Build the Capsule document for the current lattice state.
///
/// # Errors
///
/// Returns a [`LatticeError`] if the lattice cannot be queried.
pub fn build_capsule(lattice: &LatticeStore, config: &CapsuleConfig, now: DateTime<Utc>) -> Result<String, LatticeError> {
    let nodes = lattice.get_top_salience(config.top_n)?;
    let node_ids: Vec<String> = nodes.iter().map(|n| n.node_id.clone()).collect();
    let edges = lattice.get_edges_for_nodes(&node_ids)?;

    let mut out = String::new();
    let _ = writeln!(out, "# Soul Capsule");
    let _ = writeln!(out, "_generated {}_", now.to_rfc3339());
    out.push('\n');

    if nodes.is_empty() {
        out.push_str("(No nodes active)\n");
        return Ok(truncate(&out, config.max_chars));
    }

    for node_type in NodeType::capsule_order() {
        let group: Vec<&Node> = nodes.iter().filter(|n| n.node_type == node_type).collect();
        if group.is_empty() {
            continue;
        }
        let _ = writeln!(out, "## {node_type}");
        for node in &group {
            let _ = write!(out, "- [{}] ({:.2}) {}", node.node_id, node.weight.salience, node.premise);
            if let (Some(name), Some(lat), Some(lng)) = (&node.spatial_name, node.spatial_lat, node.spatial_lng) {
                let _ = write!(out, " (@ {name} {lat}, {lng})");
            }
            if let (Some(start), Some(end)) = (&node.temporal_start, &node.temporal_end) {
                let _ = write!(out, " (# from: {start} to: {end})");
            }
            out.push('\n');

            for edge in edges.iter().filter(|e| e.source_id == node.node_id) {
                if node_ids.contains(&edge.target_id) {
                    let _ = writeln!(out, "  -> {} [{}]", edge.relation, edge.target_id);
                }
            }
        }
        out.push('\n');
    }

    Ok(truncate(&out, config.max_chars))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let byte_limit = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(idx, _)| idx);
    let cut = text[..byte_limit].rfind('\n').unwrap_or(byte_limit);
    format!("{}\n... [truncated]", &text[..cut])
}
