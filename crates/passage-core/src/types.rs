//! Domain types shared by the lexical index, the vector store and the coordinator.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pdf;

/// How a document's bytes should be turned into chunkable text.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Json,
    /// Text is extracted page by page before chunking.
    Pdf,
    Other,
}

impl ContentType {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("json") => Self::Json,
            Some("pdf") => Self::Pdf,
            Some("txt" | "md" | "markdown") => Self::Text,
            _ => Self::Other,
        }
    }

    /// Interpret a declared type from an upload: either a MIME type or a bare name.
    pub fn from_declared(declared: &str) -> Self {
        let declared = declared.trim().to_ascii_lowercase();
        match declared.as_str() {
            "json" | "application/json" => Self::Json,
            "pdf" | "application/pdf" => Self::Pdf,
            "text" | "txt" | "md" | "markdown" => Self::Text,
            d if d.starts_with("text/") => Self::Text,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Pdf => "pdf",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size plus blake3 digest of a document's raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    pub size: u64,
    pub hash: String,
}

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        Self { size: bytes.len() as u64, hash: blake3::hash(bytes).to_hex().to_string() }
    }
}

/// A source file ready for chunking.
///
/// - `name`: stable identity (path relative to the corpus, `/`-separated)
/// - `content`: decoded text; invalid UTF-8 is replaced, never rejected.
///   For PDFs this is the extracted text.
/// - `fingerprint`: taken over the raw bytes, before decoding
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub content: String,
    pub content_type: ContentType,
    pub ingested_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
}

impl Document {
    /// Decode `bytes` for chunking, extracting the text first when it is a PDF.
    pub fn load(name: impl Into<String>, bytes: &[u8], content_type: ContentType) -> Result<Self> {
        let name = name.into();
        if content_type != ContentType::Pdf {
            return Ok(Self::from_bytes(name, bytes, content_type));
        }
        let content = pdf::extract_text(&name, bytes)?;
        Ok(Self { name, content, content_type, ingested_at: Utc::now(), fingerprint: Fingerprint::of(bytes) })
    }

    /// Take `bytes` as text as-is; see `load` for PDFs.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8], content_type: ContentType) -> Self {
        Self {
            name: name.into(),
            content: String::from_utf8_lossy(bytes).into_owned(),
            content_type,
            ingested_at: Utc::now(),
            fingerprint: Fingerprint::of(bytes),
        }
    }
}

/// Identifies a chunk across both indexes: the source document and the chunk's ordinal in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub source: String,
    pub ordinal: usize,
}

impl ChunkKey {
    pub fn new(source: impl Into<String>, ordinal: usize) -> Self {
        Self { source: source.into(), ordinal }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source, self.ordinal)
    }
}

/// A contiguous span of a document's (flattened) text.
///
/// `start`/`end` are character offsets, end exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source: String,
    pub ordinal: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub content_type: ContentType,
}

impl Chunk {
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.source.clone(), self.ordinal)
    }
}

/// Coarse intent of a query; biases extraction and the response budget.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    #[default]
    Generic,
    Contact,
    Claims,
    Coverage,
}

impl QueryType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" | "general" => Some(Self::Generic),
            "contact" => Some(Self::Contact),
            "claims" | "claim" => Some(Self::Claims),
            "coverage" => Some(Self::Coverage),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Contact => "contact",
            Self::Claims => "claims",
            Self::Coverage => "coverage",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
