use passage_core::config::EmbeddingConfig;
use passage_embed::get_default_embedder;

fn main() -> anyhow::Result<()> {
    let config = EmbeddingConfig { model_dir: std::env::args().nth(1), ..EmbeddingConfig::default() };
    let embedder = get_default_embedder(&config)?;
    let texts = vec!["how do I make a claim".to_string(), "call the claims line to report a loss".to_string()];
    let embs = embedder.embed_batch(&texts)?;
    let cosine: f32 = embs[0].iter().zip(&embs[1]).map(|(a, b)| a * b).sum();
    println!("model={} B={} dim={} cosine={cosine:.3}", embedder.model_id(), embs.len(), embedder.dim());
    Ok(())
}
