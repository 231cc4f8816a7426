//! Compiles a parsed [`Proposal`] into lattice mutations: validate
//! everything first, then apply atomically in a fixed order.

use crate::capsule::build_capsule;
use crate::config::CapsuleConfig;
use crate::error::ProposalError;
use crate::lattice::edge::Relation;
use crate::lattice::node::{NodeStatus, NodeType};
use crate::lattice::store::LatticeStore;
use crate::lattice::weight::{contradict, reinforce, WeightVector};
use crate::proposal::Proposal;
use chrono::{DateTime, Utc};
use std::path::Path;

pub struct CompileResult {
    pub added_node_ids: Vec<String>,
}

pub struct Compiler<'a> {
    lattice: &'a LatticeStore,
}

impl<'a> Compiler<'a> {
    #[must_use]
    pub fn new(lattice: &'a LatticeStore) -> Self {
        Self { lattice }
    }

    /// Validate `proposal` in full, collecting every error; if any
    /// validation fails, none of the proposal is applied. Otherwise apply
    /// in order: contradictions, additions, reinforcements, edges.
    ///
    /// # Errors
    ///
    /// Returns [`ProposalError::Validation`] with every collected reason if
    /// validation fails. Returns [`ProposalError::Validation`] wrapping a
    /// single referential-integrity reason if edge application fails after
    /// contradictions/additions/reinforcements have already been written
    /// (the caller is expected to run this inside a lattice transaction so
    /// that failure rolls the whole step back).
    pub fn compile(
        &self,
        proposal: &Proposal,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CompileResult, ProposalError> {
        let reasons = validate(proposal);
        if !reasons.is_empty() {
            return Err(ProposalError::Validation { reasons });
        }

        let conn = self.lattice.connection();
        conn.execute_batch("SAVEPOINT compile_proposal")
            .map_err(|e| ProposalError::Validation {
                reasons: vec![e.to_string()],
            })?;

        let result = self.apply(proposal, agent_id, now);
        match &result {
            Ok(_) => {
                let _ = conn.execute_batch("RELEASE compile_proposal");
            }
            Err(_) => {
                let _ = conn.execute_batch("ROLLBACK TO compile_proposal; RELEASE compile_proposal");
            }
        }
        result
    }

    fn apply(
        &self,
        proposal: &Proposal,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CompileResult, ProposalError> {
        for node_id in &proposal.contradict {
            if let Some(node) = self.lattice.get_node(node_id).map_err(store_err)? {
                let updated = contradict(node.weight);
                self.lattice
                    .update_node_weight(node_id, updated, now)
                    .map_err(store_err)?;
            }
        }

        let mut added_node_ids = Vec::with_capacity(proposal.add.len());
        for proposed in &proposal.add {
            let node_type = NodeType::parse(&proposed.node_type).ok_or_else(|| ProposalError::Validation {
                reasons: vec![format!("unknown node type: {}", proposed.node_type)],
            })?;
            let weight = WeightVector::new(
                proposed.weight.salience.unwrap_or(0.0),
                proposed.weight.valence.unwrap_or(0.0),
                proposed.weight.arousal.unwrap_or(0.0),
                proposed.weight.commitment.unwrap_or(0.0),
                proposed.weight.uncertainty.unwrap_or(0.0),
                proposed.weight.resonance.unwrap_or(0.0),
            );
            let node = self
                .lattice
                .create_node(node_type, &proposed.premise, NodeStatus::Provisional, agent_id, weight, None, None, now)
                .map_err(store_err)?;
            added_node_ids.push(node.node_id);
        }

        for node_id in &proposal.reinforce {
            if let Some(node) = self.lattice.get_node(node_id).map_err(store_err)? {
                let updated = reinforce(node.weight);
                self.lattice
                    .update_node_weight(node_id, updated, now)
                    .map_err(store_err)?;
            }
        }

        for spec in &proposal.edges {
            let relation = Relation::parse(&spec.relation).ok_or_else(|| ProposalError::Validation {
                reasons: vec![format!("unknown relation: {}", spec.relation)],
            })?;
            self.lattice
                .create_edge(&spec.source, &spec.target, relation, 1.0, now)
                .map_err(store_err)?;
        }

        Ok(CompileResult { added_node_ids })
    }

    /// Rebuild the Capsule document and optionally persist it to disk.
    ///
    /// # Errors
    ///
    /// Returns a [`ProposalError`] if the lattice cannot be queried, or if
    /// `path` is supplied and the write fails.
    pub fn regenerate_capsule(
        &self,
        config: &CapsuleConfig,
        now: DateTime<Utc>,
        path: Option<&Path>,
    ) -> Result<String, ProposalError> {
        let capsule = build_capsule(self.lattice, config, now).map_err(store_err)?;
        if let Some(path) = path {
            std::fs::write(path, &capsule).map_err(|e| ProposalError::Validation {
                reasons: vec![e.to_string()],
            })?;
        }
        Ok(capsule)
    }
}

fn store_err(e: crate::error::LatticeError) -> ProposalError {
    ProposalError::Validation {
        reasons: vec![e.to_string()],
    }
}

fn validate(proposal: &Proposal) -> Vec<String> {
    let mut reasons = Vec::new();

    for (i, node) in proposal.add.iter().enumerate() {
        if node.premise.trim().is_empty() {
            reasons.push(format!("add[{i}].premise must be non-empty"));
        }
        if NodeType::parse(&node.node_type).is_none() {
            reasons.push(format!("add[{i}].nodeType '{}' is not a known node type", node.node_type));
        }
    }
    for (i, id) in proposal.reinforce.iter().enumerate() {
        if id.trim().is_empty() {
            reasons.push(format!("reinforce[{i}] must be non-empty"));
        }
    }
    for (i, id) in proposal.contradict.iter().enumerate() {
        if id.trim().is_empty() {
            reasons.push(format!("contradict[{i}] must be non-empty"));
        }
    }
    for (i, edge) in proposal.edges.iter().enumerate() {
        if edge.source.trim().is_empty() {
            reasons.push(format!("edges[{i}].source must be non-empty"));
        }
        if edge.target.trim().is_empty() {
            reasons.push(format!("edges[{i}].target must be non-empty"));
        }
        if Relation::parse(&edge.relation).is_none() {
            reasons.push(format!("edges[{i}].relation '{}' is not a known relation", edge.relation));
        }
    }
    reasons
}
