use rolerag_core::config::EmbeddingSettings;
use rolerag_core::traits::Embedder;
use rolerag_embed::{get_default_embedder, FakeEmbedder, FAKE_DIM};

fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

#[test]
fn fake_embedder_shapes_and_determinism() {
    // Force fake embedder to avoid loading a model
    std::env::set_var("APP_USE_FAKE_EMBEDDINGS", "1");

    let embedder = get_default_embedder(&EmbeddingSettings::default()).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let (v1, v2) = (&embs[0], &embs[1]);

    assert_eq!(v1.len(), FAKE_DIM);
    assert_eq!(embedder.dim(), FAKE_DIM);

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn fake_embedder_preserves_order_and_count() {
    let embedder = FakeEmbedder::new(64);
    let texts: Vec<String> = ["budget", "hiring", "", "budget"].iter().map(|s| s.to_string()).collect();
    let embs = embedder.embed_batch(&texts).unwrap();
    assert_eq!(embs.len(), 4);
    assert_eq!(embs[0], embs[3]);
    assert_ne!(embs[0], embs[1]);
    assert!(embs.iter().all(|v| v.len() == 64));
}

#[test]
fn shared_words_score_higher() {
    let embedder = FakeEmbedder::default();
    let texts: Vec<String> = [
        "marketing budget for the fourth quarter",
        "What is the marketing budget?",
        "employee onboarding checklist",
    ].iter().map(|s| s.to_string()).collect();
    let e = embedder.embed_batch(&texts).unwrap();
    assert!(cosine(&e[0], &e[1]) > cosine(&e[2], &e[1]));
}
