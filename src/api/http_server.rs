// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::embed::embed_handler;
use super::handlers::{health_handler, models_handler, not_found_handler};
use crate::config::{PoolConfig, RequestLimits};
use crate::embeddings::{ModelInfo, WorkerPool};

/// Shared state handed to every handler
#[derive(Debug)]
pub struct AppState {
    pub pool: Arc<WorkerPool>,
    pub model: ModelInfo,
    pub pool_config: PoolConfig,
    pub limits: RequestLimits,
}

impl AppState {
    pub fn new(pool: Arc<WorkerPool>, pool_config: PoolConfig, limits: RequestLimits) -> Self {
        let model = ModelInfo {
            name: pool.model_name().to_string(),
            dimensions: pool.dimension(),
            available: true,
            is_default: true,
        };

        Self {
            pool,
            model,
            pool_config,
            limits,
        }
    }

    /// Largest accepted request body, derived from the text limits
    pub fn body_limit_bytes(&self) -> usize {
        // Up to 4 UTF-8 bytes per character plus JSON framing per text
        self.limits
            .max_texts
            .saturating_mul(self.limits.max_text_chars.saturating_mul(4).saturating_add(8))
            .saturating_add(1024)
    }
}

pub fn create_app(state: Arc<AppState>) -> Router {
    let body_limit = state.body_limit_bytes();

    Router::new()
        .route("/embedding/", post(embed_handler))
        .route("/embedding", post(embed_handler))
        .route("/health", get(health_handler))
        .route("/v1/models", get(models_handler))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves
///
/// In-flight requests are drained before this returns; the caller stops the
/// worker pool afterwards.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let app = create_app(state);

    info!("API server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received");
}
