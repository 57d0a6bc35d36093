use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use passage_core::config::RetrievalConfig;
use passage_core::{Embedder, Error, QueryType, Result};
use passage_text::extract;
use passage_text::LexicalIndex;
use passage_vector::VectorStore;

use crate::indexer::PublishLock;
use crate::merge::{merge, truncate_to_budget, Passage, SemanticOutcome};
use crate::query::{classify, expand_query};

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub query_type: QueryType,
    /// Which tiers produced the ranking: "semantic", "semantic+lexical", "lexical+semantic" or "lexical".
    pub strategy: &'static str,
    pub passages: Vec<Passage>,
    /// Phone numbers found in the passages (contact queries), in passage order.
    pub contacts: Vec<String>,
    /// Claims answer or coverage statements, depending on the query type.
    pub highlights: Vec<String>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrievalOutcome {
    Found(RetrievalResult),
    /// Nothing relevant is indexed; callers must answer "no information" rather than guess.
    NoInformation { query_type: QueryType, reason: String },
}

impl RetrievalOutcome {
    pub fn found(&self) -> Option<&RetrievalResult> {
        match self {
            Self::Found(result) => Some(result),
            Self::NoInformation { .. } => None,
        }
    }
}

/// Runs the two-tier search: semantic first, lexical when the semantic tier is
/// unavailable, sparse or ambiguous; then query-type extraction and budgeting.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<VectorStore>,
    lexical: Arc<LexicalIndex>,
    publish: PublishLock,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<VectorStore>,
        lexical: Arc<LexicalIndex>,
        publish: PublishLock,
        config: RetrievalConfig,
    ) -> Self {
        Self { embedder, vectors, lexical, publish, config }
    }

    pub fn retrieve(&self, query: &str, type_hint: Option<QueryType>) -> Result<RetrievalOutcome> {
        let query = query.trim();
        let query_type = type_hint.unwrap_or_else(|| classify(query));
        if query.is_empty() {
            return Ok(no_information(query_type, "empty query"));
        }

        let vector = self.query_vector(query, query_type)?;
        // Both tiers read the same published state.
        let (semantic, lexical) = {
            let _published = self.publish.read();
            let semantic = self.semantic_search(vector)?;
            debug!(?query_type, outcome = semantic.label(), "semantic tier finished");
            let lexical = if semantic.is_sufficient() {
                Vec::new()
            } else {
                self.lexical.search(query, self.config.lexical_top_n)
            };
            (semantic, lexical)
        };

        let mut passages = merge(&semantic, &lexical);
        if passages.is_empty() {
            return Ok(no_information(query_type, "no indexed passage matches the query"));
        }

        prioritize(query_type, &mut passages);
        let budget = match query_type {
            QueryType::Contact | QueryType::Claims => self.config.extended_budget_chars,
            QueryType::Generic | QueryType::Coverage => self.config.default_budget_chars,
        };
        let passages = truncate_to_budget(passages, budget);
        if passages.is_empty() {
            return Ok(no_information(query_type, "no passage fits the response budget"));
        }

        // Extras come from the returned passages only, so every one is attributable.
        let keywords = self.lexical.keywords(query);
        let (contacts, highlights) = extract_extras(query_type, &passages, &keywords);

        let sources = passages.iter().map(|p| p.key.source.clone()).collect::<BTreeSet<_>>().into_iter().collect();
        Ok(RetrievalOutcome::Found(RetrievalResult {
            query_type,
            strategy: semantic.label(),
            passages,
            contacts,
            highlights,
            sources,
        }))
    }

    /// The query embedding, or why the semantic tier is skipped. Runs before any lock is taken.
    fn query_vector(&self, query: &str, query_type: QueryType) -> Result<SemanticQuery> {
        if !self.vectors.is_available() {
            return Ok(SemanticQuery::Skipped("vector index failed verification".into()));
        }
        if self.vectors.is_empty() {
            return Ok(SemanticQuery::Skipped("vector index is empty".into()));
        }

        let text = if self.config.expand_queries { expand_query(query, query_type) } else { query.to_string() };
        match self.embedder.embed(&text) {
            Ok(v) => Ok(SemanticQuery::Vector(v)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "query embedding failed, using lexical search");
                Ok(SemanticQuery::Skipped(e.to_string()))
            }
        }
    }

    // Only configuration faults are errors.
    fn semantic_search(&self, query: SemanticQuery) -> Result<SemanticOutcome> {
        let vector = match query {
            SemanticQuery::Vector(vector) => vector,
            SemanticQuery::Skipped(reason) => return Ok(SemanticOutcome::Unavailable(reason)),
        };
        match self.vectors.search(&vector, self.config.semantic_top_k) {
            Ok(hits) => Ok(SemanticOutcome::from_hits(hits, &self.config)),
            Err(Error::Unavailable(reason)) => Ok(SemanticOutcome::Unavailable(reason)),
            Err(e) => Err(e),
        }
    }
}

enum SemanticQuery {
    Vector(Vec<f32>),
    Skipped(String),
}

fn no_information(query_type: QueryType, reason: &str) -> RetrievalOutcome {
    RetrievalOutcome::NoInformation { query_type, reason: reason.to_string() }
}

/// Move the passages most useful for the query type ahead, keeping rank order otherwise.
fn prioritize(query_type: QueryType, passages: &mut [Passage]) {
    match query_type {
        QueryType::Contact => passages.sort_by_key(|p| !extract::has_phone_number(&p.text)),
        QueryType::Claims => passages.sort_by_key(|p| std::cmp::Reverse(extract::step_score(&p.text).min(1))),
        QueryType::Coverage | QueryType::Generic => {}
    }
}

/// Contact numbers and highlight lines found in `passages`.
fn extract_extras(query_type: QueryType, passages: &[Passage], keywords: &[String]) -> (Vec<String>, Vec<String>) {
    let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
    match query_type {
        QueryType::Contact => {
            let mut contacts: Vec<String> = Vec::new();
            for text in &texts {
                for number in extract::find_phone_numbers(text) {
                    if !contacts.contains(&number) {
                        contacts.push(number);
                    }
                }
            }
            (contacts, Vec::new())
        }
        QueryType::Claims => (Vec::new(), extract::extract_claims(&texts, keywords).into_iter().collect()),
        QueryType::Coverage => (Vec::new(), extract::extract_coverage(&texts)),
        QueryType::Generic => (Vec::new(), Vec::new()),
    }
}
