//! Corpus discovery and document loading.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{ContentType, Document};

/// A file under the corpus root that is eligible for indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    /// Path relative to the corpus root with `/` separators; the document's identity.
    pub name: String,
    pub path: PathBuf,
}

pub struct DataProcessor {
    extensions: Vec<String>,
}

impl Default for DataProcessor {
    fn default() -> Self {
        Self::new(["txt", "md", "json", "pdf"])
    }
}

impl DataProcessor {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self { extensions }
    }

    /// List eligible files under `root`, sorted by name. A missing root is an empty corpus.
    pub fn list_documents(&self, root: &Path) -> Vec<CorpusEntry> {
        if !root.exists() {
            debug!(root = %root.display(), "corpus directory does not exist");
            return Vec::new();
        }
        let mut entries: Vec<CorpusEntry> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| self.accepts(e.path()))
            .map(|e| CorpusEntry { name: document_name(root, e.path()), path: e.path().to_path_buf() })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    pub fn load_document(&self, entry: &CorpusEntry) -> Result<Document> {
        let bytes = fs::read(&entry.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(entry.path.display().to_string()),
            _ => Error::Io(e),
        })?;
        Document::load(entry.name.clone(), &bytes, ContentType::from_path(&entry.path))
    }
}

/// Stable document identity: the path relative to `root`, `/`-separated.
pub fn document_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
