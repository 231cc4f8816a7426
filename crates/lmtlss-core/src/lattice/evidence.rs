//! Evidence links: bind a lattice node to an archive event hash.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Origin,
    Supports,
    Contradicts,
}

impl LinkType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Origin => "origin",
            Self::Supports => "supports",
            Self::Contradicts => "contradicts",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "origin" => Self::Origin,
            "supports" => Self::Supports,
            "contradicts" => Self::Contradicts,
            _ => return None,
        })
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceLink {
    pub node_id: String,
    pub event_hash: String,
    pub link_type: LinkType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_type_round_trips() {
        for t in [LinkType::Origin, LinkType::Supports, LinkType::Contradicts] {
            assert_eq!(LinkType::parse(t.as_str()), Some(t));
        }
    }
}
