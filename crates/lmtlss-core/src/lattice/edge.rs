//! Lattice edge types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Supports,
    Contradicts,
    Refines,
    DependsOn,
    RelatedTo,
    CausedBy,
}

impl Relation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Supports => "supports",
            Self::Contradicts => "contradicts",
            Self::Refines => "refines",
            Self::DependsOn => "depends_on",
            Self::RelatedTo => "related_to",
            Self::CausedBy => "caused_by",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "supports" => Self::Supports,
            "contradicts" => Self::Contradicts,
            "refines" => Self::Refines,
            "depends_on" => Self::DependsOn,
            "related_to" => Self::RelatedTo,
            "caused_by" => Self::CausedBy,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation: Relation,
    pub strength: f64,
    pub created_at: String,
}
