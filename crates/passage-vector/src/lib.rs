//! passage-vector
//!
//! Exact nearest-neighbour search over chunk embeddings. The index lives under
//! one directory as numbered generations:
//!
//! ```text
//! vectors/
//!   CURRENT               name of the serving generation
//!   gen-00000003/
//!     index.bin           bincode vectors + blake3 checksum
//!     documents.json      chunk texts, same order as the vectors
//!     metadata.json       {source, chunk_id, type}, same order
//! ```
//!
//! A new generation is fully written before `CURRENT` is replaced, so a crash
//! leaves the previous generation serving.

pub mod format;
pub mod store;

pub use store::{ChunkMetadata, LoadStatus, StagedGeneration, VectorHit, VectorRecord, VectorStore};
