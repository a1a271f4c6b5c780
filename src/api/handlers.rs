// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::api::http_server::AppState;
use crate::api::ApiError;
use crate::api::ApiErrorResponse;
use crate::embeddings::{ModelInfo, PoolStats};
use axum::{extract::State, http::StatusCode, http::Uri, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<String>>,
    pub pool: PoolStats,
}

impl HealthResponse {
    pub fn from_stats(pool: PoolStats) -> Self {
        let mut issues = Vec::new();

        if !pool.running {
            issues.push("Worker pool is stopped".to_string());
        }
        if pool.live_workers < pool.pool_size {
            issues.push(format!(
                "{} of {} workers alive",
                pool.live_workers, pool.pool_size
            ));
        }

        let status = if issues.is_empty() {
            "healthy"
        } else if pool.running && pool.live_workers > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        HealthResponse {
            status: status.to_string(),
            issues: if issues.is_empty() {
                None
            } else {
                Some(issues)
            },
            pool,
        }
    }

    pub fn is_unhealthy(&self) -> bool {
        self.status == "unhealthy"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = HealthResponse::from_stats(state.pool.stats());
    let status = if health.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status, Json(health))
}

pub async fn models_handler(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: vec![state.model.clone()],
    })
}

pub async fn not_found_handler(uri: Uri) -> ApiErrorResponse {
    ApiError::NotFound(format!("No route for {}", uri.path())).into()
}
