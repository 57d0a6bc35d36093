use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use passage_core::data_processor::DataProcessor;
use passage_core::{Chunker, Embedder, Error, QueryType, Result, Settings};
use passage_text::LexicalIndex;
use passage_vector::{LoadStatus, VectorStore};

use crate::coordinator::{RetrievalOutcome, Retriever};
use crate::indexer::{IncrementalIndexer, IndexDelta, IndexerOptions, PublishLock};
use crate::manifest::Manifest;

const VECTORS_DIR: &str = "vectors";
const CHUNKS_DIR: &str = "chunks";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub corpus_dir: PathBuf,
    pub data_dir: PathBuf,
    pub model_id: String,
    pub dimension: usize,
    pub indexed_documents: usize,
    pub vector_records: usize,
    pub vector_generation: u64,
    pub vectors_available: bool,
    pub lexical_documents: usize,
    pub lexical_chunks: usize,
    pub corrupt_chunk_files: Vec<PathBuf>,
}

/// Owns the embedder, both indexes and the manifest, and hands them to the
/// retriever and the indexer. One per data directory.
pub struct PassageEngine {
    settings: Settings,
    corpus_dir: PathBuf,
    data_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<VectorStore>,
    lexical: Arc<LexicalIndex>,
    retriever: Retriever,
    indexer: IncrementalIndexer,
    corrupt_chunk_files: Vec<PathBuf>,
}

impl PassageEngine {
    /// Open (or create) the indexes under `paths.data_dir`, resolved against `base`.
    ///
    /// A vector index that fails verification is served as unavailable and the
    /// manifest is reset so the next sync rebuilds everything. Documents whose
    /// chunk file is gone or unreadable are dropped from the manifest so the
    /// next sync re-indexes them.
    pub fn open(settings: Settings, base: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        settings.validate()?;
        if embedder.dim() != settings.embedding.dimension {
            return Err(Error::DimensionMismatch { expected: settings.embedding.dimension, actual: embedder.dim() });
        }
        let corpus_dir = settings.paths.corpus_dir(base);
        let data_dir = settings.paths.data_dir(base);
        std::fs::create_dir_all(&data_dir)?;

        let (vectors, load_status) = VectorStore::open(&data_dir.join(VECTORS_DIR), settings.embedding.dimension)?;
        let (lexical, corrupt) = LexicalIndex::open(&data_dir.join(CHUNKS_DIR))?;
        let manifest_path = data_dir.join(MANIFEST_FILE);
        let mut manifest = Manifest::load(&manifest_path)?;

        if let LoadStatus::Corrupt(reason) = &load_status {
            warn!(%reason, "vector index unusable, every document will be re-indexed on the next sync");
            manifest = Manifest::default();
            manifest.save(&manifest_path)?;
        }
        let stale: Vec<String> =
            manifest.indexed_files.iter().filter(|name| !lexical.contains(name)).cloned().collect();
        if !stale.is_empty() {
            warn!(documents = stale.len(), "indexed documents without lexical chunks, scheduling re-index");
            for name in &stale {
                manifest.forget(name);
            }
            manifest.save(&manifest_path)?;
        }
        info!(data_dir = %data_dir.display(), ?load_status, documents = manifest.indexed_files.len(), "engine opened");

        let vectors = Arc::new(vectors);
        let lexical = Arc::new(lexical);
        let manifest = Arc::new(RwLock::new(manifest));
        let publish = PublishLock::default();
        let retriever = Retriever::new(
            Arc::clone(&embedder),
            Arc::clone(&vectors),
            Arc::clone(&lexical),
            Arc::clone(&publish),
            settings.retrieval.clone(),
        );
        let indexer = IncrementalIndexer::new(
            Arc::clone(&embedder),
            Arc::clone(&vectors),
            Arc::clone(&lexical),
            manifest,
            manifest_path,
            Chunker::new(settings.chunking)?,
            DataProcessor::new(&settings.indexing.extensions),
            IndexerOptions { batch_size: settings.embedding.batch_size, prune_missing: settings.indexing.prune_missing },
            publish,
        );

        Ok(Self {
            settings,
            corpus_dir,
            data_dir,
            embedder,
            vectors,
            lexical,
            retriever,
            indexer,
            corrupt_chunk_files: corrupt.into_iter().map(|c| c.path).collect(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn corpus_dir(&self) -> &Path {
        &self.corpus_dir
    }

    /// Sync the configured corpus directory.
    pub fn sync(&self) -> Result<IndexDelta> {
        self.indexer.sync(&self.corpus_dir)
    }

    pub fn sync_dir<F>(&self, corpus_dir: &Path, progress: F) -> Result<IndexDelta>
    where
        F: FnMut(usize, usize, &str),
    {
        self.indexer.sync_with(corpus_dir, progress)
    }

    pub fn index_document(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<IndexDelta> {
        self.indexer.index_document(name, bytes, content_type)
    }

    pub fn search(&self, query: &str, type_hint: Option<QueryType>) -> Result<RetrievalOutcome> {
        self.retriever.retrieve(query, type_hint)
    }

    /// Names of fully indexed documents, sorted.
    pub fn indexed_documents(&self) -> Vec<String> {
        self.indexer.indexed_documents()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            corpus_dir: self.corpus_dir.clone(),
            data_dir: self.data_dir.clone(),
            model_id: self.embedder.model_id().to_string(),
            dimension: self.vectors.dim(),
            indexed_documents: self.indexer.indexed_documents().len(),
            vector_records: self.vectors.len(),
            vector_generation: self.vectors.generation(),
            vectors_available: self.vectors.is_available(),
            lexical_documents: self.lexical.len(),
            lexical_chunks: self.lexical.chunk_count(),
            corrupt_chunk_files: self.corrupt_chunk_files.clone(),
        }
    }
}
