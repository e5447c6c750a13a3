use super::*;
use crate::config::EmbeddingConfig;

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[test]
fn hashing_embedder_is_deterministic() {
    let embedder = HashingEmbedder::new(64);
    let first = embedder
        .embed("What is Coursevita?")
        .expect("embedding should succeed");
    let second = embedder
        .embed("What is Coursevita?")
        .expect("embedding should succeed");

    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
}

#[test]
fn hashing_embedder_is_case_and_punctuation_insensitive() {
    let embedder = HashingEmbedder::new(64);
    let a = embedder.embed("Refund policy!").expect("embedding");
    let b = embedder.embed("refund   POLICY").expect("embedding");
    assert_eq!(a, b);
}

#[test]
fn hashing_embedder_normalizes_vectors() {
    let embedder = HashingEmbedder::new(128);
    let vector = embedder
        .embed("placement assistance and mentorship sessions")
        .expect("embedding should succeed");

    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[test]
fn empty_text_embeds_to_zero_vector() {
    let embedder = HashingEmbedder::new(16);
    let vector = embedder.embed("  ...  ").expect("embedding should succeed");
    assert!(vector.iter().all(|v| *v == 0.0));
}

#[test]
fn shared_vocabulary_is_closer() {
    let embedder = HashingEmbedder::new(256);
    let query = embedder.embed("refund policy").expect("embedding");
    let related = embedder
        .embed("Our refund policy allows a full refund within 7 days")
        .expect("embedding");
    let unrelated = embedder
        .embed("Live classes are held every weekend in the evening")
        .expect("embedding");

    assert!(squared_distance(&query, &related) < squared_distance(&query, &unrelated));
}

#[test]
fn batch_preserves_input_order() {
    let embedder = HashingEmbedder::new(32);
    let texts = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
    let batch = embedder.embed_batch(&texts).expect("batch embedding");

    assert_eq!(batch.len(), 3);
    for (text, vector) in texts.iter().zip(&batch) {
        assert_eq!(&embedder.embed(text).expect("embedding"), vector);
    }
}

#[test]
fn model_id_encodes_dimension() {
    assert_eq!(HashingEmbedder::new(384).model_id(), "hashing-fnv1a-384");
    assert_eq!(HashingEmbedder::new(384).dimension(), 384);
}

#[test]
fn config_rejects_invalid_embedding_settings() {
    let config = EmbeddingConfig {
        batch_size: 0,
        ..EmbeddingConfig::default()
    };
    assert!(matches!(config.build_embedder(), Err(QaError::Config(_))));
}

#[test]
fn unknown_fastembed_model_is_rejected() {
    let config = EmbeddingConfig {
        model: "not-a-real/embedding-model".to_string(),
        ..EmbeddingConfig::default()
    };

    match FastEmbedder::new(&config) {
        Err(QaError::Embedding(message)) => assert!(message.contains("Unsupported")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unknown model should not load"),
    }
}
