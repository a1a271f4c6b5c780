// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /embedding/ HTTP handler

use crate::api::embed::{EmbeddingRequest, EmbeddingResponse};
use crate::api::http_server::AppState;
use crate::api::{ApiError, ApiErrorResponse};
use crate::embeddings::{encode_with_options, DispatchOptions};
use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// POST /embedding/ handler
///
/// Validates the body, encodes every text on the worker pool and returns
/// the vectors in input order. Any failure fails the whole request; no
/// partial embedding list is ever returned.
///
/// # Status codes
/// - 200: all texts embedded
/// - 400: malformed JSON, missing `texts`, non-string elements, failed validation
/// - 413: body larger than the limit derived from `RequestLimits`
/// - 500: a sub-batch failed inference
/// - 503: the worker pool is not running
/// - 504: the request deadline elapsed
pub async fn embed_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> Result<Json<EmbeddingResponse>, ApiErrorResponse> {
    let request_id = Uuid::new_v4().to_string();
    let fail = |error: ApiError| ApiErrorResponse::new(error, Some(request_id.clone()));

    let Json(request) = payload.map_err(|rejection| {
        let error = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::InvalidRequest(rejection.body_text())
        };
        fail(error)
    })?;
    request.validate(&state.limits).map_err(&fail)?;

    let options = DispatchOptions {
        batch_size: request.batch_size.unwrap_or(state.pool_config.batch_size),
        timeout: state.pool_config.request_timeout(),
        retry_failed_batches: state.pool_config.retry_failed_batches,
    };

    let span = info_span!(
        "embed",
        request_id = %request_id,
        texts = request.texts.len(),
        batch_size = options.batch_size
    );
    let started = Instant::now();

    let vectors = encode_with_options(&request.texts, &state.pool, &options)
        .instrument(span)
        .await
        .map_err(|e| {
            warn!(request_id = %request_id, "Embedding request failed: {}", e);
            fail(e.into())
        })?;

    info!(
        request_id = %request_id,
        texts = vectors.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Embedding request completed"
    );

    Ok(Json(EmbeddingResponse::new(
        vectors,
        state.pool.model_name(),
        state.pool.dimension(),
    )))
}
