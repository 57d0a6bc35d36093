//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`
//! and `APP_*` env vars (nested keys separated by `__`, e.g.
//! `APP_RETRIEVAL__SEMANTIC_TOP_K=8`). Provides helpers to expand `~` and
//! `${VAR}` and to resolve relative paths against a known base directory.

use std::env;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Load from the current directory.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load `config.toml` and the `RUST_ENV` overlay found in `dir`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Extract and validate the typed settings.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub paths: PathsConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub indexing: IndexingConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be > 0".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be > 0".into()));
        }
        let r = &self.retrieval;
        if r.semantic_top_k == 0 || r.lexical_top_n == 0 {
            return Err(Error::InvalidConfig("retrieval top-k values must be > 0".into()));
        }
        if r.ambiguity_margin < 0.0 {
            return Err(Error::InvalidConfig("retrieval.ambiguity_margin must be >= 0".into()));
        }
        if r.default_budget_chars < self.chunking.max_chars || r.extended_budget_chars < self.chunking.max_chars {
            return Err(Error::InvalidConfig(format!(
                "retrieval budgets must fit at least one chunk ({} chars)",
                self.chunking.max_chars
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub corpus_dir: String,
    pub data_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { corpus_dir: "corpus".into(), data_dir: "data".into() }
    }
}

impl PathsConfig {
    pub fn corpus_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.corpus_dir)
    }

    pub fn data_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.data_dir)
    }
}

/// Character-based chunk sizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chars: 500, overlap_chars: 100 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_chars == 0 {
            return Err(Error::InvalidConfig("chunking.max_chars must be > 0".into()));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap_chars ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dimension: usize,
    pub model_dir: Option<String>,
    pub max_tokens: usize,
    pub use_fake: bool,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimension: 384, model_dir: None, max_tokens: 256, use_fake: false, batch_size: 32 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub semantic_top_k: usize,
    pub lexical_top_n: usize,
    /// Fewer distinct source documents than this among the semantic hits means "sparse".
    pub min_semantic_sources: usize,
    /// Best distances of the two closest documents within this margin means "too close to call".
    pub ambiguity_margin: f32,
    pub max_distance: Option<f32>,
    /// Append related terms for the query type before embedding the query.
    pub expand_queries: bool,
    pub default_budget_chars: usize,
    /// Budget for contact and claims queries.
    pub extended_budget_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_top_k: 5,
            lexical_top_n: 3,
            min_semantic_sources: 1,
            ambiguity_margin: 0.05,
            max_distance: None,
            expand_queries: true,
            default_budget_chars: 1000,
            extended_budget_chars: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexingConfig {
    pub extensions: Vec<String>,
    /// Purge documents that disappeared from the corpus instead of only reporting them.
    pub prune_missing: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self { extensions: vec!["txt".into(), "md".into(), "json".into(), "pdf".into()], prune_missing: false }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
