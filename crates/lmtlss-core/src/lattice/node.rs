//! Lattice node types.

use crate::lattice::weight::WeightVector;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Identity,
    Premise,
    Relationship,
    Preference,
    Goal,
    Value,
    Operational,
    Spatial,
    Temporal,
}

impl NodeType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Premise => "premise",
            Self::Relationship => "relationship",
            Self::Preference => "preference",
            Self::Goal => "goal",
            Self::Value => "value",
            Self::Operational => "operational",
            Self::Spatial => "spatial",
            Self::Temporal => "temporal",
        }
    }

    /// Fixed rendering order used by the Capsule Builder.
    #[must_use]
    pub const fn capsule_order() -> [Self; 9] {
        [
            Self::Identity,
            Self::Goal,
            Self::Value,
            Self::Premise,
            Self::Relationship,
            Self::Preference,
            Self::Spatial,
            Self::Temporal,
            Self::Operational,
        ]
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "identity" => Self::Identity,
            "premise" => Self::Premise,
            "relationship" => Self::Relationship,
            "preference" => Self::Preference,
            "goal" => Self::Goal,
            "value" => Self::Value,
            "operational" => Self::Operational,
            "spatial" => Self::Spatial,
            "temporal" => Self::Temporal,
            _ => return None,
        })
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Provisional,
    Active,
    Archived,
}

impl NodeStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provisional => "provisional",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "provisional" => Self::Provisional,
            "active" => Self::Active,
            "archived" => Self::Archived,
            _ => return None,
        })
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub node_type: NodeType,
    pub premise: String,
    pub status: NodeStatus,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub spatial_name: Option<String>,
    pub spatial_lat: Option<f64>,
    pub spatial_lng: Option<f64>,
    pub temporal_start: Option<String>,
    pub temporal_end: Option<String>,
    pub weight: WeightVector,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capsule_order_starts_with_identity_and_ends_operational() {
        let order = NodeType::capsule_order();
        assert_eq!(order[0], NodeType::Identity);
        assert_eq!(order[8], NodeType::Operational);
    }

    #[test]
    fn node_type_round_trips_through_string() {
        for t in NodeType::capsule_order() {
            assert_eq!(NodeType::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn node_status_round_trips_through_string() {
        for s in [NodeStatus::Provisional, NodeStatus::Active, NodeStatus::Archived] {
            assert_eq!(NodeStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn unknown_strings_parse_to_none() {
        assert_eq!(NodeType::parse("bogus"), None);
        assert_eq!(NodeStatus::parse("bogus"), None);
    }
}
