pub mod chunker;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod pdf;
pub mod persist;
pub mod traits;
pub mod types;

pub use chunker::{Chunker, Chunks};
pub use config::{expand_path, resolve_with_base, Config, Settings};
pub use error::{Error, Result};
pub use traits::Embedder;
pub use types::{Chunk, ChunkKey, ContentType, Document, Fingerprint, QueryType};
