//! The Raw Archive: content-addressed, hash-chained, day-partitioned
//! event log.

pub mod canonical;
pub mod event;
pub mod hash;
pub mod index_db;
pub mod partition;
pub mod recovery;
pub mod store;

pub use event::{Event, EventType};
pub use store::ArchiveStore;
