// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /embedding/ success path

use crate::common::{
    assert_close, hash_model, hello_world_model, post_embedding, send, test_app, texts,
    HASH_DIMENSION,
};
use axum::http::StatusCode;
use fabstir_embed_node::api::EmbeddingResponse;
use fabstir_embed_node::config::PoolConfig;
use serde_json::json;

fn pool_config(batch_size: usize) -> PoolConfig {
    PoolConfig {
        batch_size,
        ..PoolConfig::default()
    }
}

#[cfg(test)]
mod embed_handler_tests {
    use super::*;

    #[tokio::test]
    async fn test_hello_world_embedding() {
        let (app, pool) = test_app(hello_world_model(), 2, pool_config(1)).await;

        let (status, body) = post_embedding(app, r#"{"texts": ["hello", "world"]}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["embedding"],
            json!([[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]])
        );
        assert_eq!(body["model"], "scripted");
        assert_eq!(body["dimensions"], 4);
        pool.stop().await;
    }

    /// The route also answers without the trailing slash
    #[tokio::test]
    async fn test_route_without_trailing_slash() {
        let (app, pool) = test_app(hello_world_model(), 1, pool_config(8)).await;

        let (status, body) =
            send(app, "POST", "/embedding", Some(r#"{"texts": ["world"]}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["embedding"], json!([[0.0, 1.0, 0.0, 0.0]]));
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_many_texts_keep_input_order() {
        let (app, pool) = test_app(hash_model(), 3, pool_config(7)).await;
        let input = texts("doc", 50);
        let body = json!({ "texts": input }).to_string();

        let (status, body) = post_embedding(app, &body).await;
        assert_eq!(status, StatusCode::OK);

        let response: EmbeddingResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.embedding_count(), 50);
        assert_eq!(response.dimensions, HASH_DIMENSION);

        let model = hash_model();
        for (text, vector) in input.iter().zip(&response.embedding) {
            assert_close(vector, &model.generate(text));
        }
        pool.stop().await;
    }

    /// A per-request batchSize overrides the default without changing results
    #[tokio::test]
    async fn test_batch_size_override() {
        let (app, pool) = test_app(hash_model(), 2, pool_config(32)).await;
        let input = texts("override", 9);

        let (_, default_body) =
            post_embedding(app.clone(), &json!({ "texts": input }).to_string()).await;
        let submitted_before = pool.stats().submitted;

        let (status, override_body) = post_embedding(
            app,
            &json!({ "texts": input, "batchSize": 2 }).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(default_body["embedding"], override_body["embedding"]);
        assert_eq!(submitted_before, 1);
        assert_eq!(pool.stats().submitted - submitted_before, 5);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_unicode_text() {
        let (app, pool) = test_app(hash_model(), 1, pool_config(4)).await;

        let (status, body) =
            post_embedding(app, r#"{"texts": ["héllo wörld", "你好世界", "🚀"]}"#).await;

        assert_eq!(status, StatusCode::OK);
        let response: EmbeddingResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.embedding_count(), 3);
        assert_close(&response.embedding[1], &hash_model().generate("你好世界"));
        pool.stop().await;
    }

    /// Whitespace is content; only empty strings are rejected
    #[tokio::test]
    async fn test_whitespace_only_text_is_embedded() {
        let (app, pool) = test_app(hash_model(), 1, pool_config(4)).await;

        let (status, body) = post_embedding(app, r#"{"texts": ["hello", " ", "\n"]}"#).await;

        assert_eq!(status, StatusCode::OK);
        let response: EmbeddingResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.embedding_count(), 3);
        let model = hash_model();
        assert_close(&response.embedding[0], &model.generate("hello"));
        assert_close(&response.embedding[1], &model.generate(" "));
        assert_close(&response.embedding[2], &model.generate("\n"));
        assert_eq!(pool.stats().submitted, 1);
        pool.stop().await;
    }
}
