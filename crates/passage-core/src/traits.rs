use crate::error::Result;

/// Maps text to a fixed-length vector.
///
/// Implementations must be deterministic: the same text yields the same
/// vector, and `embed_batch` must agree with calling `embed` per item.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn model_id(&self) -> &str;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}
