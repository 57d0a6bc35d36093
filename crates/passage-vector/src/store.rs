use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use passage_core::persist::{write_atomic, write_json_atomic};
use passage_core::{ChunkKey, ContentType, Error, Result};

use crate::format::{decode_index, encode_index};

const CURRENT: &str = "CURRENT";
const INDEX_FILE: &str = "index.bin";
const DOCUMENTS_FILE: &str = "documents.json";
const METADATA_FILE: &str = "metadata.json";
const GENERATION_PREFIX: &str = "gen-";

/// Per-vector attribution, persisted in `metadata.json` in index order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub source: String,
    pub chunk_id: usize,
    #[serde(rename = "type")]
    pub content_type: ContentType,
}

impl ChunkMetadata {
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.source.clone(), self.chunk_id)
    }
}

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub key: ChunkKey,
    /// Euclidean distance to the query; lower is closer.
    pub distance: f32,
    pub text: String,
    pub content_type: ContentType,
    /// Insertion position in the serving generation.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Empty,
    Loaded { generation: u64, records: usize },
    /// The persisted index failed verification; the store refuses to serve until rebuilt.
    Corrupt(String),
}

/// One immutable snapshot of the index. The three collections share positions.
#[derive(Debug, Clone, Default)]
struct Generation {
    id: u64,
    vectors: Vec<f32>,
    documents: Vec<String>,
    metadata: Vec<ChunkMetadata>,
}

impl Generation {
    fn len(&self) -> usize {
        self.metadata.len()
    }

    fn row(&self, i: usize, dim: usize) -> &[f32] {
        &self.vectors[i * dim..(i + 1) * dim]
    }

    fn without_source(&self, source: &str, dim: usize) -> Generation {
        let mut next = Generation { id: self.id, ..Generation::default() };
        for i in 0..self.len() {
            if self.metadata[i].source != source {
                next.vectors.extend_from_slice(self.row(i, dim));
                next.documents.push(self.documents[i].clone());
                next.metadata.push(self.metadata[i].clone());
            }
        }
        next
    }

    fn push(&mut self, record: VectorRecord) {
        self.vectors.extend(record.embedding);
        self.documents.push(record.text);
        self.metadata.push(record.metadata);
    }
}

struct WriterState {
    next_id: u64,
    dirty: bool,
}

/// A generation already on disk, served once `publish` is called.
#[must_use = "a staged generation is not searchable until published"]
pub struct StagedGeneration<'a> {
    store: &'a VectorStore,
    _state: MutexGuard<'a, WriterState>,
    generation: Generation,
}

impl StagedGeneration<'_> {
    pub fn generation(&self) -> u64 {
        self.generation.id
    }

    pub fn publish(self) {
        let Self { store, _state, generation } = self;
        store.swap(generation);
    }
}

/// Exact (flat) L2 vector index persisted as numbered generations under `root`.
///
/// Readers clone the serving `Arc<Generation>` and search it without holding
/// any lock. Writers are serialised, build a new generation from a snapshot,
/// persist it, and only then take the write lock to swap it in.
pub struct VectorStore {
    root: PathBuf,
    dim: usize,
    current: RwLock<Arc<Generation>>,
    unavailable: RwLock<Option<String>>,
    writer: Mutex<WriterState>,
}

impl VectorStore {
    pub fn open(root: &Path, dim: usize) -> Result<(Self, LoadStatus)> {
        if dim == 0 {
            return Err(Error::InvalidConfig("vector dimension must be > 0".into()));
        }
        fs::create_dir_all(root)?;
        let next_id = highest_generation_on_disk(root)? + 1;
        let store = Self {
            root: root.to_path_buf(),
            dim,
            current: RwLock::new(Arc::new(Generation::default())),
            unavailable: RwLock::new(None),
            writer: Mutex::new(WriterState { next_id, dirty: false }),
        };
        let status = store.load()?;
        Ok((store, status))
    }

    /// Re-read the generation named by `CURRENT` and serve it.
    ///
    /// Corruption is reported as `LoadStatus::Corrupt`, not as an error; a
    /// dimensionality disagreement is an error.
    pub fn load(&self) -> Result<LoadStatus> {
        let mut state = self.writer.lock();
        let (generation, status) = match read_current(&self.root, self.dim) {
            Ok(None) => (Generation::default(), LoadStatus::Empty),
            Ok(Some(generation)) => {
                let status = LoadStatus::Loaded { generation: generation.id, records: generation.len() };
                (generation, status)
            }
            Err(Error::IndexCorruption { path, reason }) => {
                let message = format!("{}: {reason}", path.display());
                warn!(%message, "vector index failed verification");
                *self.unavailable.write() = Some(message.clone());
                *self.current.write() = Arc::new(Generation::default());
                state.dirty = false;
                return Ok(LoadStatus::Corrupt(message));
            }
            Err(e) => return Err(e),
        };
        debug!(?status, root = %self.root.display(), "vector store loaded");
        state.next_id = state.next_id.max(generation.id + 1);
        state.dirty = false;
        *self.unavailable.write() = None;
        *self.current.write() = Arc::new(generation);
        Ok(status)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().id
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.read().is_none()
    }

    pub fn sources(&self) -> BTreeSet<String> {
        self.snapshot().metadata.iter().map(|m| m.source.clone()).collect()
    }

    /// Append records to the serving generation in memory. Call `persist` to write them.
    pub fn add(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut state = self.writer.lock();
        self.check_dims(&records)?;
        let mut generation = self.snapshot().as_ref().clone();
        for record in records {
            generation.push(record);
        }
        generation.id = state.next_id;
        state.dirty = true;
        *self.current.write() = Arc::new(generation);
        Ok(())
    }

    /// Write the serving generation to disk if it has unpersisted changes.
    pub fn persist(&self) -> Result<()> {
        let mut state = self.writer.lock();
        if !state.dirty {
            return Ok(());
        }
        let snapshot = self.snapshot();
        self.write_generation(state.next_id, &snapshot)?;
        state.next_id += 1;
        state.dirty = false;
        *self.unavailable.write() = None;
        Ok(())
    }

    /// Drop every record of `source` and append `records`, as one persisted generation.
    pub fn replace_document(&self, source: &str, records: Vec<VectorRecord>) -> Result<()> {
        self.stage_replace(source, records)?.publish();
        Ok(())
    }

    /// Persist the generation `replace_document` would serve without serving it yet.
    ///
    /// Other writers wait until the returned value is published or dropped.
    pub fn stage_replace(&self, source: &str, records: Vec<VectorRecord>) -> Result<StagedGeneration<'_>> {
        let mut state = self.writer.lock();
        self.check_dims(&records)?;
        if let Some(r) = records.iter().find(|r| r.metadata.source != source) {
            return Err(Error::InvalidConfig(format!(
                "record for '{}' passed to replace_document('{source}')",
                r.metadata.source
            )));
        }
        let snapshot = self.snapshot();
        let mut generation = snapshot.without_source(source, self.dim);
        let removed = snapshot.len() - generation.len();
        let added = records.len();
        for record in records {
            generation.push(record);
        }
        self.stage(&mut state, &mut generation)?;
        info!(%source, removed, added, generation = generation.id, "vector records staged");
        Ok(StagedGeneration { store: self, _state: state, generation })
    }

    /// Drop every record of `source`. Returns whether anything was removed.
    pub fn remove_document(&self, source: &str) -> Result<bool> {
        let mut state = self.writer.lock();
        let snapshot = self.snapshot();
        let generation = snapshot.without_source(source, self.dim);
        if generation.len() == snapshot.len() {
            return Ok(false);
        }
        self.commit(&mut state, generation)?;
        info!(%source, "vector records removed");
        Ok(true)
    }

    /// The `k` nearest records by Euclidean distance, closest first; ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if let Some(reason) = self.unavailable.read().clone() {
            return Err(Error::Unavailable(reason));
        }
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        let generation = self.snapshot();
        let k = k.min(generation.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, usize)> = (0..generation.len())
            .map(|i| (l2_distance(query, generation.row(i, self.dim)), i))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, i)| {
                let meta = &generation.metadata[i];
                VectorHit {
                    key: meta.key(),
                    distance,
                    text: generation.documents[i].clone(),
                    content_type: meta.content_type,
                    position: i,
                }
            })
            .collect())
    }

    fn snapshot(&self) -> Arc<Generation> {
        Arc::clone(&self.current.read())
    }

    fn check_dims(&self, records: &[VectorRecord]) -> Result<()> {
        match records.iter().find(|r| r.embedding.len() != self.dim) {
            Some(r) => Err(Error::DimensionMismatch { expected: self.dim, actual: r.embedding.len() }),
            None => Ok(()),
        }
    }

    fn commit(&self, state: &mut WriterState, mut generation: Generation) -> Result<()> {
        self.stage(state, &mut generation)?;
        self.swap(generation);
        Ok(())
    }

    fn stage(&self, state: &mut WriterState, generation: &mut Generation) -> Result<()> {
        let id = state.next_id;
        self.write_generation(id, generation)?;
        generation.id = id;
        state.next_id += 1;
        state.dirty = false;
        Ok(())
    }

    fn swap(&self, generation: Generation) {
        *self.unavailable.write() = None;
        *self.current.write() = Arc::new(generation);
    }

    fn write_generation(&self, id: u64, generation: &Generation) -> Result<()> {
        let name = generation_name(id);
        let dir = self.root.join(&name);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        write_atomic(&dir.join(INDEX_FILE), &encode_index(self.dim, &generation.vectors)?)?;
        write_json_atomic(&dir.join(DOCUMENTS_FILE), &generation.documents)?;
        write_json_atomic(&dir.join(METADATA_FILE), &generation.metadata)?;
        write_atomic(&self.root.join(CURRENT), name.as_bytes())?;
        debug!(generation = id, records = generation.len(), "vector generation persisted");
        self.remove_stale_generations(&name);
        Ok(())
    }

    fn remove_stale_generations(&self, keep: &str) {
        let Ok(entries) = fs::read_dir(&self.root) else { return };
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(GENERATION_PREFIX) && name != keep {
                if let Err(e) = fs::remove_dir_all(entry.path()) {
                    warn!(%name, error = %e, "failed to remove superseded vector generation");
                }
            }
        }
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

fn generation_name(id: u64) -> String {
    format!("{GENERATION_PREFIX}{id:08}")
}

fn parse_generation_id(name: &str) -> Option<u64> {
    name.strip_prefix(GENERATION_PREFIX)?.parse().ok()
}

fn highest_generation_on_disk(root: &Path) -> Result<u64> {
    Ok(fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .filter_map(|e| parse_generation_id(&e.file_name().to_string_lossy()))
        .max()
        .unwrap_or(0))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| Error::corruption(path, e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::corruption(path, e.to_string()))
}

fn read_current(root: &Path, dim: usize) -> Result<Option<Generation>> {
    let pointer = root.join(CURRENT);
    let name = match fs::read_to_string(&pointer) {
        Ok(s) => s.trim().to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let id = parse_generation_id(&name).ok_or_else(|| Error::corruption(&pointer, format!("bad pointer '{name}'")))?;
    let dir = root.join(&name);

    let index_path = dir.join(INDEX_FILE);
    let bytes = fs::read(&index_path).map_err(|e| Error::corruption(&index_path, e.to_string()))?;
    let (count, vectors) = decode_index(&index_path, &bytes, dim)?;
    let documents: Vec<String> = read_json(&dir.join(DOCUMENTS_FILE))?;
    let metadata: Vec<ChunkMetadata> = read_json(&dir.join(METADATA_FILE))?;
    if documents.len() != count || metadata.len() != count {
        return Err(Error::corruption(
            &dir,
            format!("{count} vectors, {} documents, {} metadata entries", documents.len(), metadata.len()),
        ));
    }
    Ok(Some(Generation { id, vectors, documents, metadata }))
}
