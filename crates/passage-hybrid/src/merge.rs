//! Semantic outcome classification, result merging and budget truncation.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use passage_core::config::RetrievalConfig;
use passage_core::{ChunkKey, ContentType};
use passage_text::LexicalHit;
use passage_vector::VectorHit;

/// Result of the semantic tier, deciding whether and how lexical search is consulted.
#[derive(Debug, Clone)]
pub enum SemanticOutcome {
    Sufficient(Vec<VectorHit>),
    /// Too few distinct source documents; lexical hits are appended after these.
    Sparse(Vec<VectorHit>),
    /// The closest documents are too close to call; lexical hits lead.
    Ambiguous(Vec<VectorHit>),
    Unavailable(String),
}

impl SemanticOutcome {
    pub fn from_hits(mut hits: Vec<VectorHit>, config: &RetrievalConfig) -> Self {
        if let Some(max) = config.max_distance {
            hits.retain(|h| h.distance <= max);
        }
        let best = best_distance_per_source(&hits);
        if best.len() < config.min_semantic_sources.max(1) {
            return Self::Sparse(hits);
        }
        if best.len() >= 2 && best[1] - best[0] <= config.ambiguity_margin {
            return Self::Ambiguous(hits);
        }
        Self::Sufficient(hits)
    }

    pub fn is_sufficient(&self) -> bool {
        matches!(self, Self::Sufficient(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Sufficient(_) => "semantic",
            Self::Sparse(_) => "semantic+lexical",
            Self::Ambiguous(_) => "lexical+semantic",
            Self::Unavailable(_) => "lexical",
        }
    }
}

// Hits arrive closest first, so the first hit seen for a source is its best.
fn best_distance_per_source(hits: &[VectorHit]) -> Vec<f32> {
    let mut seen = BTreeSet::new();
    hits.iter().filter(|h| seen.insert(h.key.source.as_str())).map(|h| h.distance).collect()
}

/// A retrieved chunk with whichever scores produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Passage {
    pub key: ChunkKey,
    pub text: String,
    pub content_type: ContentType,
    pub semantic_distance: Option<f32>,
    pub lexical_score: Option<u32>,
}

impl Passage {
    fn from_vector(hit: &VectorHit) -> Self {
        Self {
            key: hit.key.clone(),
            text: hit.text.clone(),
            content_type: hit.content_type,
            semantic_distance: Some(hit.distance),
            lexical_score: None,
        }
    }

    fn from_lexical(hit: &LexicalHit) -> Self {
        Self {
            key: hit.key.clone(),
            text: hit.text.clone(),
            content_type: hit.content_type,
            semantic_distance: None,
            lexical_score: Some(hit.score),
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Default)]
struct Merger {
    passages: Vec<Passage>,
    by_key: HashMap<ChunkKey, usize>,
}

impl Merger {
    fn push_vector(&mut self, hit: &VectorHit) {
        match self.by_key.get(&hit.key) {
            Some(&i) => {
                let p = &mut self.passages[i];
                p.semantic_distance = Some(p.semantic_distance.map_or(hit.distance, |d| d.min(hit.distance)));
            }
            None => self.insert(Passage::from_vector(hit)),
        }
    }

    fn push_lexical(&mut self, hit: &LexicalHit) {
        match self.by_key.get(&hit.key) {
            Some(&i) => {
                let p = &mut self.passages[i];
                p.lexical_score = Some(p.lexical_score.map_or(hit.score, |s| s.max(hit.score)));
            }
            None => self.insert(Passage::from_lexical(hit)),
        }
    }

    fn insert(&mut self, passage: Passage) {
        self.by_key.insert(passage.key.clone(), self.passages.len());
        self.passages.push(passage);
    }
}

/// Merge both tiers into one ranked list in which every chunk appears once.
pub fn merge(semantic: &SemanticOutcome, lexical: &[LexicalHit]) -> Vec<Passage> {
    let mut merger = Merger::default();
    match semantic {
        SemanticOutcome::Sufficient(hits) | SemanticOutcome::Sparse(hits) => {
            hits.iter().for_each(|h| merger.push_vector(h));
            lexical.iter().for_each(|h| merger.push_lexical(h));
        }
        SemanticOutcome::Ambiguous(hits) => {
            lexical.iter().for_each(|h| merger.push_lexical(h));
            hits.iter().for_each(|h| merger.push_vector(h));
        }
        SemanticOutcome::Unavailable(_) => lexical.iter().for_each(|h| merger.push_lexical(h)),
    }
    merger.passages
}

/// Keep passages in rank order while they fit `budget_chars`; a passage that
/// does not fit is dropped whole and later, shorter ones may still be taken.
pub fn truncate_to_budget(passages: Vec<Passage>, budget_chars: usize) -> Vec<Passage> {
    let mut used = 0;
    passages
        .into_iter()
        .filter(|p| {
            let len = p.char_len();
            if used + len <= budget_chars {
                used += len;
                true
            } else {
                false
            }
        })
        .collect()
}
