//! Structured mutation requests ("proposals") emitted by the language model
//! inside `<lattice_update>` blocks, and their extraction from raw replies.

pub mod model;
pub mod parser;

pub use model::{EdgeSpec, Proposal, ProposedNode, ProposedWeight};
pub use parser::{parse_all_proposals, parse_first_proposal, strip_proposal_blocks};
