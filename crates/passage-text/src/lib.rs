//! passage-text
//!
//! Keyword retrieval over chunk text plus the query-type extraction helpers
//! (phone numbers, claim steps, coverage statements) layered on top.

pub mod extract;
pub mod index;
pub mod search;
pub mod tantivy_utils;

pub use index::{ChunkFile, CorruptChunkFile, LexicalIndex, StagedDocument};
pub use search::LexicalHit;
