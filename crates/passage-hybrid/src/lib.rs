//! passage-hybrid
//!
//! Ties the vector and lexical indexes together: incremental indexing of a
//! corpus directory, and two-tier retrieval that falls back from semantic to
//! keyword search when the semantic tier is empty, sparse or ambiguous.

pub mod coordinator;
pub mod engine;
pub mod indexer;
pub mod manifest;
pub mod merge;
pub mod query;

pub use coordinator::{RetrievalOutcome, RetrievalResult, Retriever};
pub use engine::{EngineStatus, PassageEngine};
pub use indexer::{DegradedChunk, FailedDocument, IncrementalIndexer, IndexDelta, PublishLock};
pub use manifest::Manifest;
pub use merge::{Passage, SemanticOutcome};
pub use query::{classify, expand_query};
