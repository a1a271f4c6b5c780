// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the embedding pool
//!
//! Failures are classified by who has to react to them:
//! - Initialization: the model or a worker could not start (fatal)
//! - Configuration: invalid pool size or batch size
//! - Encode: one sub-batch failed inference (the request fails, the pool survives)
//! - Timeout: a request exceeded its deadline (workers are not considered broken)

use thiserror::Error;

/// Errors raised by the worker pool and the batch dispatcher
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    /// Model load or worker startup failed; the service must not accept traffic
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Invalid pool size, batch size or similar setting
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A specific sub-batch failed inference
    #[error("Sub-batch {batch_id} (offset {offset}) failed: {reason}")]
    Encode {
        batch_id: u64,
        offset: usize,
        reason: String,
        /// Worker that ran the sub-batch, when one replied
        worker_id: Option<usize>,
    },

    /// The request deadline elapsed before every sub-batch was collected
    #[error("Request timed out after {timeout_ms}ms ({pending} sub-batches outstanding)")]
    Timeout { timeout_ms: u64, pending: usize },

    /// The pool has been stopped and accepts no more work
    #[error("Worker pool is stopped")]
    PoolStopped,
}

impl EmbeddingError {
    pub fn encode(batch_id: u64, offset: usize, reason: impl Into<String>) -> Self {
        EmbeddingError::Encode {
            batch_id,
            offset,
            reason: reason.into(),
            worker_id: None,
        }
    }

    /// Attributes an `Encode` failure to the worker that produced it
    pub fn on_worker(self, id: usize) -> Self {
        match self {
            EmbeddingError::Encode {
                batch_id,
                offset,
                reason,
                ..
            } => EmbeddingError::Encode {
                batch_id,
                offset,
                reason,
                worker_id: Some(id),
            },
            other => other,
        }
    }

    /// Worker an `Encode` failure happened on, if known
    pub fn failed_worker(&self) -> Option<usize> {
        match self {
            EmbeddingError::Encode { worker_id, .. } => *worker_id,
            _ => None,
        }
    }

    /// Short machine-readable tag used in logs and error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            EmbeddingError::Initialization(_) => "initialization_error",
            EmbeddingError::Configuration(_) => "configuration_error",
            EmbeddingError::Encode { .. } => "encode_error",
            EmbeddingError::Timeout { .. } => "timeout",
            EmbeddingError::PoolStopped => "pool_stopped",
        }
    }
}

pub type EmbeddingResult<T> = std::result::Result<T, EmbeddingError>;
