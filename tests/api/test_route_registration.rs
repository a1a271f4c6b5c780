// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Router wiring

use crate::common::{hash_model, send, test_app};
use axum::http::StatusCode;
use fabstir_embed_node::config::PoolConfig;

#[cfg(test)]
mod route_registration_tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_route_is_404_json() {
        let (app, pool) = test_app(hash_model(), 1, PoolConfig::default()).await;

        let (status, body) = send(app, "GET", "/v1/embed", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_type"], "not_found");
        assert!(body["message"].as_str().unwrap().contains("/v1/embed"));
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_get_on_embedding_is_rejected() {
        let (app, pool) = test_app(hash_model(), 1, PoolConfig::default()).await;

        let (status, _) = send(app, "GET", "/embedding/", None).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(pool.stats().submitted, 0);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_cors_preflight_allowed() {
        let (app, pool) = test_app(hash_model(), 1, PoolConfig::default()).await;
        let request = axum::http::Request::builder()
            .method("OPTIONS")
            .uri("/embedding/")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "POST")
            .body(axum::body::Body::empty())
            .unwrap();

        let response = tower::util::ServiceExt::oneshot(app, request).await.unwrap();

        assert!(response.status().is_success());
        assert!(response
            .headers()
            .contains_key("access-control-allow-origin"));
        pool.stop().await;
    }
}
