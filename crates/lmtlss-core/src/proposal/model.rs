//! Data model for a structured mutation request emitted by the language
//! model inside a `<lattice_update>` block.

use serde::{Deserialize, Serialize};

fn empty_vec<T>() -> Vec<T> {
    Vec::new()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Proposal {
    #[serde(default = "empty_vec")]
    pub add: Vec<ProposedNode>,
    #[serde(default = "empty_vec")]
    pub reinforce: Vec<String>,
    #[serde(default = "empty_vec")]
    pub contradict: Vec<String>,
    #[serde(default = "empty_vec")]
    pub edges: Vec<EdgeSpec>,
}

impl Proposal {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.reinforce.is_empty() && self.contradict.is_empty() && self.edges.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedNode {
    pub premise: String,
    #[serde(rename = "nodeType")]
    pub node_type: String,
    #[serde(default)]
    pub weight: ProposedWeight,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposedWeight {
    pub salience: Option<f64>,
    pub valence: Option<f64>,
    pub arousal: Option<f64>,
    pub commitment: Option<f64>,
    pub uncertainty: Option<f64>,
    pub resonance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
    pub relation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_top_level_fields_default_to_empty() {
        let p: Proposal = serde_json::from_str("{}").unwrap();
        assert!(p.is_empty());
    }

    #[test]
    fn proposed_node_weight_defaults_when_absent() {
        let p: ProposedNode = serde_json::from_str(
            r#"{"premise":"x","nodeType":"premise"}"#,
        )
        .unwrap();
        assert!(p.weight.salience.is_none());
    }

    #[test]
    fn full_proposal_parses() {
        let raw = r#"{"add":[{"premise":"p","nodeType":"premise","weight":{"salience":0.5}}],
            "reinforce":["n1"],"contradict":["n2"],
            "edges":[{"source":"n1","target":"n2","relation":"supports"}]}"#;
        let p: Proposal = serde_json::from_str(raw).unwrap();
        assert_eq!(p.add.len(), 1);
        assert_eq!(p.reinforce, vec!["n1".to_string()]);
        assert_eq!(p.edges[0].relation, "supports");
    }
}
