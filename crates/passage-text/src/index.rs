use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use tantivy::tokenizer::TextAnalyzer;
use tracing::{debug, info, warn};

use passage_core::persist::write_json_atomic;
use passage_core::{ChunkKey, ContentType, Result};

use crate::search::{rank, score_chunk, LexicalHit};
use crate::tantivy_utils::{build_analyzer, keywords};

/// On-disk record for one source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFile {
	pub source_filename: String,
	pub chunks: Vec<String>,
	#[serde(default)]
	pub content_type: ContentType,
}

/// A chunk file that could not be read back.
#[derive(Debug, Clone)]
pub struct CorruptChunkFile {
	pub path: PathBuf,
	pub reason: String,
}

#[derive(Debug)]
struct DocEntry {
	content_type: ContentType,
	chunks: Vec<String>,
	lowered: Vec<String>,
}

impl DocEntry {
	fn new(content_type: ContentType, chunks: Vec<String>) -> Self {
		let lowered = chunks.iter().map(|c| c.to_lowercase()).collect();
		Self { content_type, chunks, lowered }
	}
}

type DocMap = BTreeMap<String, Arc<DocEntry>>;

/// A chunk file already written, not yet visible to searches.
#[must_use = "a staged document is not searchable until published"]
pub struct StagedDocument<'a> {
	index: &'a LexicalIndex,
	_guard: MutexGuard<'a, ()>,
	source: String,
	entry: DocEntry,
}

impl StagedDocument<'_> {
	pub fn publish(self) {
		let Self { index, _guard, source, entry } = self;
		let count = entry.chunks.len();
		let mut next = index.snapshot().as_ref().clone();
		next.insert(source.clone(), Arc::new(entry));
		*index.docs.write() = Arc::new(next);
		info!(%source, chunks = count, "lexical chunks stored");
	}
}

/// Keyword index over per-document chunk files in `dir`.
///
/// All chunk files are loaded at open. Updates persist the document's file
/// first and then swap a new map in; searches work on a cloned snapshot.
pub struct LexicalIndex {
	dir: PathBuf,
	docs: RwLock<Arc<DocMap>>,
	analyzer: TextAnalyzer,
	writer: Mutex<()>,
}

impl LexicalIndex {
	pub fn open(dir: &Path) -> Result<(Self, Vec<CorruptChunkFile>)> {
		fs::create_dir_all(dir)?;
		let mut docs = DocMap::new();
		let mut corrupt = Vec::new();
		let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
			.filter_map(|e| e.ok())
			.map(|e| e.path())
			.filter(|p| p.extension().is_some_and(|ext| ext == "json"))
			.collect();
		paths.sort();
		for path in paths {
			match read_chunk_file(&path) {
				Ok(file) => {
					docs.insert(file.source_filename, Arc::new(DocEntry::new(file.content_type, file.chunks)));
				}
				Err(reason) => {
					warn!(path = %path.display(), %reason, "skipping unreadable chunk file");
					corrupt.push(CorruptChunkFile { path, reason });
				}
			}
		}
		debug!(documents = docs.len(), dir = %dir.display(), "lexical index loaded");
		let index = Self {
			dir: dir.to_path_buf(),
			docs: RwLock::new(Arc::new(docs)),
			analyzer: build_analyzer(),
			writer: Mutex::new(()),
		};
		Ok((index, corrupt))
	}

	/// Store (or replace) the chunks of `source` and persist its chunk file.
	pub fn add_document(&self, source: &str, content_type: ContentType, chunks: Vec<String>) -> Result<()> {
		self.stage_document(source, content_type, chunks)?.publish();
		Ok(())
	}

	/// Persist the chunk file for `source`; searches see it after `publish`.
	pub fn stage_document(
		&self,
		source: &str,
		content_type: ContentType,
		chunks: Vec<String>,
	) -> Result<StagedDocument<'_>> {
		let guard = self.writer.lock();
		let file = ChunkFile { source_filename: source.to_string(), chunks, content_type };
		write_json_atomic(&self.chunk_file_path(source), &file)?;
		Ok(StagedDocument {
			index: self,
			_guard: guard,
			source: file.source_filename,
			entry: DocEntry::new(content_type, file.chunks),
		})
	}

	/// Drop `source` and delete its chunk file. Returns whether it was present.
	pub fn remove_document(&self, source: &str) -> Result<bool> {
		let _guard = self.writer.lock();
		let path = self.chunk_file_path(source);
		match fs::remove_file(&path) {
			Ok(()) => {}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => return Err(e.into()),
		}
		let snapshot = self.snapshot();
		if !snapshot.contains_key(source) {
			return Ok(false);
		}
		let mut next = snapshot.as_ref().clone();
		next.remove(source);
		*self.docs.write() = Arc::new(next);
		Ok(true)
	}

	/// The best `top_n` chunks for `query`; chunks without any keyword are excluded.
	pub fn search(&self, query: &str, top_n: usize) -> Vec<LexicalHit> {
		let keywords = self.keywords(query);
		if keywords.is_empty() || top_n == 0 {
			return Vec::new();
		}
		let phrase = query.trim().to_lowercase();
		let docs = self.snapshot();
		let mut hits: Vec<LexicalHit> = Vec::new();
		for (source, entry) in docs.iter() {
			for (ordinal, lowered) in entry.lowered.iter().enumerate() {
				let score = score_chunk(lowered, &keywords, &phrase);
				if score > 0 {
					hits.push(LexicalHit {
						key: ChunkKey::new(source.clone(), ordinal),
						score,
						text: entry.chunks[ordinal].clone(),
						content_type: entry.content_type,
					});
				}
			}
		}
		rank(&mut hits);
		hits.truncate(top_n);
		hits
	}

	/// Query keywords after tokenisation and stop-word removal.
	pub fn keywords(&self, query: &str) -> Vec<String> {
		keywords(&self.analyzer, query)
	}

	pub fn chunk_text(&self, key: &ChunkKey) -> Option<String> {
		self.snapshot().get(&key.source)?.chunks.get(key.ordinal).cloned()
	}

	pub fn contains(&self, source: &str) -> bool {
		self.snapshot().contains_key(source)
	}

	pub fn sources(&self) -> Vec<String> {
		self.snapshot().keys().cloned().collect()
	}

	/// Number of documents.
	pub fn len(&self) -> usize {
		self.snapshot().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn chunk_count(&self) -> usize {
		self.snapshot().values().map(|d| d.chunks.len()).sum()
	}

	fn snapshot(&self) -> Arc<DocMap> {
		Arc::clone(&self.docs.read())
	}

	fn chunk_file_path(&self, source: &str) -> PathBuf {
		self.dir.join(chunk_file_name(source))
	}
}

/// `<sanitised name>-<12 hex of blake3(name)>.json`; distinct sources never collide.
pub fn chunk_file_name(source: &str) -> String {
	let stem: String = source
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
		.take(64)
		.collect();
	let digest = blake3::hash(source.as_bytes()).to_hex();
	format!("{stem}-{}.json", &digest[..12])
}

fn read_chunk_file(path: &Path) -> std::result::Result<ChunkFile, String> {
	let bytes = fs::read(path).map_err(|e| e.to_string())?;
	serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}
