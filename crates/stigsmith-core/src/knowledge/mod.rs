//! Knowledge store: validated control implementations kept for reuse
//!
//! - [`KnowledgeWriter`] builds the single per-baseline commit
//! - [`InMemoryKnowledgeStore`] is the in-process [`MemoryStore`](crate::MemoryStore)
//! - [`similarity`] ranks records against a control description

mod store;
mod writer;

pub mod similarity;

pub use store::InMemoryKnowledgeStore;
pub use writer::KnowledgeWriter;
