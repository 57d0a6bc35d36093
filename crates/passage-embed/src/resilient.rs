//! Batch embedding that degrades per chunk instead of failing the whole document.

use rayon::prelude::*;
use tracing::warn;

use passage_core::{Embedder, Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum EmbedOutcome {
    Embedded(Vec<f32>),
    /// The chunk could not be embedded after a retry; it stays lexical-only.
    Failed(String),
}

impl EmbedOutcome {
    pub fn vector(&self) -> Option<&[f32]> {
        match self {
            Self::Embedded(v) => Some(v),
            Self::Failed(_) => None,
        }
    }
}

/// Embed `texts` in batches of `batch_size`, in parallel.
///
/// A failing batch is retried chunk by chunk, each chunk getting one retry
/// before it is recorded as `Failed`. A vector of the wrong dimensionality is
/// returned as `DimensionMismatch` and aborts the call.
pub fn embed_resilient(embedder: &dyn Embedder, texts: &[String], batch_size: usize) -> Result<Vec<EmbedOutcome>> {
    let batches: Vec<Vec<EmbedOutcome>> = texts
        .par_chunks(batch_size.max(1))
        .map(|batch| embed_batch_or_each(embedder, batch))
        .collect::<Result<_>>()?;
    Ok(batches.into_iter().flatten().collect())
}

fn embed_batch_or_each(embedder: &dyn Embedder, batch: &[String]) -> Result<Vec<EmbedOutcome>> {
    match embedder.embed_batch(batch) {
        Ok(vectors) if vectors.len() == batch.len() => vectors
            .into_iter()
            .map(|v| check_dim(embedder, v).map(EmbedOutcome::Embedded))
            .collect(),
        Ok(vectors) => {
            warn!(expected = batch.len(), got = vectors.len(), "embedding batch returned wrong row count, retrying per chunk");
            embed_each(embedder, batch)
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(error = %e, batch = batch.len(), "embedding batch failed, retrying per chunk");
            embed_each(embedder, batch)
        }
    }
}

fn embed_each(embedder: &dyn Embedder, batch: &[String]) -> Result<Vec<EmbedOutcome>> {
    batch.par_iter().map(|text| embed_one(embedder, text)).collect()
}

fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<EmbedOutcome> {
    let mut last_error = String::new();
    for _attempt in 0..2 {
        match embedder.embed(text) {
            Ok(v) => return check_dim(embedder, v).map(EmbedOutcome::Embedded),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => last_error = e.to_string(),
        }
    }
    Ok(EmbedOutcome::Failed(last_error))
}

fn check_dim(embedder: &dyn Embedder, v: Vec<f32>) -> Result<Vec<f32>> {
    if v.len() == embedder.dim() {
        Ok(v)
    } else {
        Err(Error::DimensionMismatch { expected: embedder.dim(), actual: v.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the batch call, and fails `embed` for texts containing "poison".
    struct Flaky {
        calls: AtomicUsize,
    }

    impl Embedder for Flaky {
        fn dim(&self) -> usize {
            2
        }
        fn model_id(&self) -> &str {
            "flaky"
        }
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("poison") {
                Err(Error::Embedding("boom".into()))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
        fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::Embedding("batch down".into()))
        }
    }

    struct WrongDim;

    impl Embedder for WrongDim {
        fn dim(&self) -> usize {
            4
        }
        fn model_id(&self) -> &str {
            "wrong"
        }
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 3])
        }
    }

    #[test]
    fn failing_chunk_is_isolated_after_one_retry() {
        let e = Flaky { calls: AtomicUsize::new(0) };
        let texts: Vec<String> = ["ok one", "poison", "ok two"].iter().map(|s| s.to_string()).collect();
        let out = embed_resilient(&e, &texts, 8).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[0].vector().is_some());
        assert!(matches!(out[1], EmbedOutcome::Failed(_)));
        assert!(out[2].vector().is_some());
        // two good chunks once each, the poisoned one twice
        assert_eq!(e.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let texts = vec!["a".to_string()];
        let err = embed_resilient(&WrongDim, &texts, 4).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));
    }
}
