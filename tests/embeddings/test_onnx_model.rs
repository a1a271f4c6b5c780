// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ONNX backend tests against the real all-MiniLM-L6-v2 export
//!
//! These need the model files on disk and are ignored by default:
//! `cargo test --test embeddings_tests -- --ignored`

use fabstir_embed_node::config::{BackendKind, ModelConfig};
use fabstir_embed_node::embeddings::{
    encode, load_pooled_model, EmbeddingError, PooledModel, WorkerPool,
};
use std::path::PathBuf;

const MODEL_PATH: &str = "/workspace/models/all-MiniLM-L6-v2-onnx/model.onnx";
const TOKENIZER_PATH: &str = "/workspace/models/all-MiniLM-L6-v2-onnx/tokenizer.json";

fn onnx_config() -> ModelConfig {
    ModelConfig {
        backend: BackendKind::Onnx,
        model_path: Some(PathBuf::from(MODEL_PATH)),
        tokenizer_path: Some(PathBuf::from(TOKENIZER_PATH)),
        ..ModelConfig::default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod onnx_model_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_files_fail_initialization() {
        let config = ModelConfig {
            model_path: Some(PathBuf::from("/nonexistent/model.onnx")),
            tokenizer_path: Some(PathBuf::from("/nonexistent/tokenizer.json")),
            ..onnx_config()
        };

        let result = load_pooled_model(config).await;
        assert!(matches!(result, Err(EmbeddingError::Initialization(_))));
    }

    /// Every worker gets its own session; results match across pool sizes
    #[tokio::test]
    #[ignore = "requires all-MiniLM-L6-v2 ONNX files"]
    async fn test_pool_encodes_384_dimensions() {
        let model = load_pooled_model(onnx_config()).await.unwrap();
        assert_eq!(model.dimension(), 384);

        let single = WorkerPool::start(model.clone(), 1).await.unwrap();
        let multi = WorkerPool::start(model, 3).await.unwrap();
        let texts: Vec<String> = (0..10)
            .map(|i| format!("Sentence number {} about embeddings", i))
            .collect();

        let a = encode(&texts, &single, 10).await.unwrap();
        let b = encode(&texts, &multi, 3).await.unwrap();

        assert_eq!(a.len(), 10);
        assert!(a.iter().all(|v| v.len() == 384));
        for (x, y) in a.iter().zip(&b) {
            assert!(cosine(x, y) > 0.9999, "pooling across workers changed the vector");
        }

        single.stop().await;
        multi.stop().await;
    }

    #[tokio::test]
    #[ignore = "requires all-MiniLM-L6-v2 ONNX files"]
    async fn test_similar_texts_are_closer() {
        let model = load_pooled_model(onnx_config()).await.unwrap();
        let pool = WorkerPool::start(model, 2).await.unwrap();
        let texts = vec![
            "The cat sits on the mat".to_string(),
            "A kitten is resting on a rug".to_string(),
            "Quarterly revenue grew by eight percent".to_string(),
        ];

        let vectors = encode(&texts, &pool, 1).await.unwrap();

        let related = cosine(&vectors[0], &vectors[1]);
        let unrelated = cosine(&vectors[0], &vectors[2]);
        assert!(related > unrelated, "{} <= {}", related, unrelated);
        pool.stop().await;
    }
}
