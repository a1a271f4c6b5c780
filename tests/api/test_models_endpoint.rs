// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! GET /health and GET /v1/models

use crate::common::{hash_model, send, test_app};
use axum::http::StatusCode;
use fabstir_embed_node::api::{HealthResponse, ModelsResponse};
use fabstir_embed_node::config::PoolConfig;

#[cfg(test)]
mod models_endpoint_tests {
    use super::*;

    #[tokio::test]
    async fn test_models_lists_loaded_model() {
        let (app, pool) = test_app(hash_model(), 2, PoolConfig::default()).await;

        let (status, body) = send(app, "GET", "/v1/models", None).await;
        assert_eq!(status, StatusCode::OK);

        let models: ModelsResponse = serde_json::from_value(body).unwrap();
        assert_eq!(models.models.len(), 1);
        assert_eq!(models.models[0].name, "hash-test");
        assert_eq!(models.models[0].dimensions, 16);
        assert!(models.models[0].available);
        assert!(models.models[0].is_default);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_health_reports_running_pool() {
        let (app, pool) = test_app(hash_model(), 3, PoolConfig::default()).await;

        let (status, body) = send(app.clone(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);

        let health: HealthResponse = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(health.status, "healthy");
        assert!(health.issues.is_none());
        assert_eq!(health.pool.pool_size, 3);
        assert_eq!(health.pool.live_workers, 3);
        assert_eq!(body["pool"]["liveWorkers"], 3);

        send(app.clone(), "POST", "/embedding/", Some(r#"{"texts": ["a", "b"]}"#)).await;
        let (_, body) = send(app, "GET", "/health", None).await;
        assert_eq!(body["pool"]["completed"], 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_health_unhealthy_after_stop() {
        let (app, pool) = test_app(hash_model(), 2, PoolConfig::default()).await;
        pool.stop().await;

        let (status, body) = send(app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
        assert!(!body["issues"].as_array().unwrap().is_empty());
    }
}
