use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to chunk '{document}': {reason}")]
    Chunking { document: String, reason: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// A vector (or a persisted index) disagrees with the configured dimensionality.
    /// Never retried: it means the model and the index do not belong together.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index corrupted at {}: {reason}", path.display())]
    IndexCorruption { path: PathBuf, reason: String },

    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::IndexCorruption { path: path.into(), reason: reason.into() }
    }

    /// Errors after which a retry of the same input cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. } | Self::InvalidConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
