//! The Lattice: a typed belief graph of nodes, edges, and evidence links,
//! weighted by a six-dimensional [`weight::WeightVector`] and persisted to
//! `soul.db`.

pub mod edge;
pub mod evidence;
pub mod node;
pub mod schema;
pub mod store;
pub mod weight;

pub use edge::{Edge, Relation};
pub use evidence::{EvidenceLink, LinkType};
pub use node::{Node, NodeStatus, NodeType};
pub use store::LatticeStore;
pub use weight::WeightVector;
