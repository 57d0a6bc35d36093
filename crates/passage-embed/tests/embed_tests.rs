use passage_core::config::EmbeddingConfig;
use passage_core::Embedder;
use passage_embed::{get_default_embedder, FakeEmbedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn fake_embedder_shapes_and_determinism() {
    let config = EmbeddingConfig { use_fake: true, ..EmbeddingConfig::default() };
    let embedder = get_default_embedder(&config).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 384, "embedding dim follows the config");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn batch_matches_single() {
    let embedder = FakeEmbedder::new(64);
    let texts = vec!["claims line".to_string(), "termite damage".to_string()];
    let batch = embedder.embed_batch(&texts).unwrap();
    for (text, row) in texts.iter().zip(&batch) {
        assert_eq!(&embedder.embed(text).unwrap(), row);
    }
}

#[test]
fn shared_words_are_closer_than_disjoint_ones() {
    let embedder = FakeEmbedder::new(384);
    let q = embedder.embed("how do I make a claim").unwrap();
    let near = embedder.embed("To make a claim, call the claims line.").unwrap();
    let far = embedder.embed("Termites and woodworm are excluded.").unwrap();
    assert!(cosine(&q, &near) > cosine(&q, &far));
}
