use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use passage_core::data_processor::DataProcessor;
use passage_core::{Chunk, ChunkKey, Chunker, ContentType, Document, Embedder, Result};
use passage_embed::resilient::{embed_resilient, EmbedOutcome};
use passage_text::LexicalIndex;
use passage_vector::{ChunkMetadata, VectorRecord, VectorStore};

use crate::manifest::Manifest;

/// Held shared by searches and exclusively while a document is published to
/// both indexes, so a query never sees one document at two generations.
pub type PublishLock = Arc<RwLock<()>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDocument {
    pub name: String,
    pub reason: String,
}

/// A chunk that could not be embedded; it is searchable lexically only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedChunk {
    pub key: ChunkKey,
    pub reason: String,
}

/// What one `sync` (or upload) did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexDelta {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<FailedDocument>,
    pub degraded: Vec<DegradedChunk>,
    /// Indexed earlier but no longer in the corpus.
    pub missing: Vec<String>,
    pub pruned: Vec<String>,
}

impl IndexDelta {
    /// Nothing was written.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.pruned.is_empty()
    }
}

pub struct IndexerOptions {
    pub batch_size: usize,
    pub prune_missing: bool,
}

/// Brings both indexes and the manifest in line with a corpus directory.
pub struct IncrementalIndexer {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<VectorStore>,
    lexical: Arc<LexicalIndex>,
    manifest: Arc<RwLock<Manifest>>,
    manifest_path: PathBuf,
    chunker: Chunker,
    processor: DataProcessor,
    options: IndexerOptions,
    publish: PublishLock,
    writer: Mutex<()>,
}

struct Prepared {
    document: Document,
    chunks: Vec<Chunk>,
    outcomes: Vec<EmbedOutcome>,
}

impl IncrementalIndexer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<VectorStore>,
        lexical: Arc<LexicalIndex>,
        manifest: Arc<RwLock<Manifest>>,
        manifest_path: PathBuf,
        chunker: Chunker,
        processor: DataProcessor,
        options: IndexerOptions,
        publish: PublishLock,
    ) -> Self {
        Self {
            embedder,
            vectors,
            lexical,
            manifest,
            manifest_path,
            chunker,
            processor,
            options,
            publish,
            writer: Mutex::new(()),
        }
    }

    pub fn sync(&self, corpus_dir: &Path) -> Result<IndexDelta> {
        self.sync_with(corpus_dir, |_, _, _| {})
    }

    /// `sync`, calling `progress(done, total, name)` before each document.
    pub fn sync_with<F>(&self, corpus_dir: &Path, mut progress: F) -> Result<IndexDelta>
    where
        F: FnMut(usize, usize, &str),
    {
        let _guard = self.writer.lock();
        let entries = self.processor.list_documents(corpus_dir);
        let mut delta = IndexDelta::default();
        let mut seen = BTreeSet::new();

        for (done, entry) in entries.iter().enumerate() {
            progress(done, entries.len(), &entry.name);
            seen.insert(entry.name.clone());
            match self.processor.load_document(entry) {
                Ok(document) => self.process(document, &mut delta)?,
                Err(e) => {
                    warn!(document = %entry.name, error = %e, "cannot read document");
                    delta.failed.push(FailedDocument { name: entry.name.clone(), reason: e.to_string() });
                }
            }
        }

        let missing: Vec<String> =
            self.manifest.read().indexed_files.iter().filter(|name| !seen.contains(*name)).cloned().collect();
        for name in missing {
            if self.options.prune_missing {
                self.purge(&name)?;
                delta.pruned.push(name.clone());
            }
            delta.missing.push(name);
        }

        info!(
            added = delta.added.len(),
            changed = delta.changed.len(),
            unchanged = delta.unchanged.len(),
            failed = delta.failed.len(),
            degraded = delta.degraded.len(),
            missing = delta.missing.len(),
            pruned = delta.pruned.len(),
            "sync finished"
        );
        Ok(delta)
    }

    /// Index one uploaded document under `name`. `content_type` is the uploader's declaration.
    pub fn index_document(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<IndexDelta> {
        let _guard = self.writer.lock();
        let mut delta = IndexDelta::default();
        match Document::load(name, bytes, ContentType::from_declared(content_type)) {
            Ok(document) => self.process(document, &mut delta)?,
            Err(e) => {
                warn!(document = %name, error = %e, "cannot read uploaded document");
                delta.failed.push(FailedDocument { name: name.to_string(), reason: e.to_string() });
            }
        }
        Ok(delta)
    }

    pub fn indexed_documents(&self) -> Vec<String> {
        self.manifest.read().indexed_files.iter().cloned().collect()
    }

    // Content problems land in `delta.failed`; only store I/O is returned as an error.
    fn process(&self, document: Document, delta: &mut IndexDelta) -> Result<()> {
        let name = document.name.clone();
        let known = {
            let manifest = self.manifest.read();
            if manifest.is_current(&name, &document.fingerprint) {
                debug!(document = %name, "unchanged");
                delta.unchanged.push(name);
                return Ok(());
            }
            manifest.indexed_files.contains(&name)
        };

        let prepared = match self.prepare(document) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(document = %name, error = %e, "document not indexed");
                delta.failed.push(FailedDocument { name, reason: e.to_string() });
                return Ok(());
            }
        };
        delta.degraded.extend(self.commit(prepared)?);
        if known {
            delta.changed.push(name);
        } else {
            delta.added.push(name);
        }
        Ok(())
    }

    /// Chunk and embed. Runs without touching either index.
    fn prepare(&self, document: Document) -> Result<Prepared> {
        let chunks = self.chunker.split(&document)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let outcomes = embed_resilient(self.embedder.as_ref(), &texts, self.options.batch_size)?;
        Ok(Prepared { document, chunks, outcomes })
    }

    /// Both indexes persist first and are then published together; the manifest comes last.
    fn commit(&self, prepared: Prepared) -> Result<Vec<DegradedChunk>> {
        let Prepared { document, chunks, outcomes } = prepared;
        let mut records = Vec::with_capacity(chunks.len());
        let mut degraded = Vec::new();
        for (chunk, outcome) in chunks.iter().zip(outcomes) {
            match outcome {
                EmbedOutcome::Embedded(embedding) => records.push(VectorRecord {
                    metadata: ChunkMetadata {
                        source: chunk.source.clone(),
                        chunk_id: chunk.ordinal,
                        content_type: chunk.content_type,
                    },
                    embedding,
                    text: chunk.text.clone(),
                }),
                EmbedOutcome::Failed(reason) => {
                    warn!(chunk = %chunk.key(), %reason, "chunk not embedded, lexical only");
                    degraded.push(DegradedChunk { key: chunk.key(), reason });
                }
            }
        }

        let staged_vectors = self.vectors.stage_replace(&document.name, records)?;
        let texts = chunks.into_iter().map(|c| c.text).collect();
        let staged_chunks = self.lexical.stage_document(&document.name, document.content_type, texts)?;
        {
            let _publishing = self.publish.write();
            staged_vectors.publish();
            staged_chunks.publish();
        }

        self.update_manifest(|manifest| manifest.mark_indexed(&document.name, document.fingerprint))?;
        info!(document = %document.name, degraded = degraded.len(), "document indexed");
        Ok(degraded)
    }

    // Manifest last: an interrupted purge is retried on the next sync.
    fn purge(&self, name: &str) -> Result<()> {
        self.vectors.remove_document(name)?;
        self.lexical.remove_document(name)?;
        self.update_manifest(|manifest| {
            manifest.forget(name);
        })?;
        info!(document = %name, "pruned document no longer in corpus");
        Ok(())
    }

    // The shared manifest only changes once the edited copy is on disk.
    fn update_manifest(&self, edit: impl FnOnce(&mut Manifest)) -> Result<()> {
        let mut next = self.manifest.read().clone();
        edit(&mut next);
        next.save(&self.manifest_path)?;
        *self.manifest.write() = next;
        Ok(())
    }
}
