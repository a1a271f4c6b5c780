// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Embedding engine
//!
//! A `PooledModel` is loaded once at startup. The `WorkerPool` spawns a fixed
//! number of worker threads, each holding its own `EncoderBackend` created from
//! that model. The dispatcher splits a request into sub-batches, fans them out
//! to the pool and reassembles the vectors in input order.

pub mod dispatcher;
pub mod errors;
pub mod hash_model;
pub mod model_loader;
pub mod onnx_model;
pub mod worker_pool;

pub use dispatcher::{
    encode, encode_with_deadline, encode_with_options, partition, DispatchOptions, SubBatch,
};
pub use errors::{EmbeddingError, EmbeddingResult};
pub use hash_model::HashEmbeddingModel;
pub use model_loader::load_pooled_model;
pub use onnx_model::{OnnxEncoder, OnnxPooledModel};
pub use worker_pool::{PendingBatch, PoolStats, WorkerPool};

/// One embedding: fixed-length vector whose length is the model dimension
pub type EmbeddingVector = Vec<f32>;

/// A single worker's inference instance.
///
/// Encoders are owned exclusively by one worker thread, so `encode_batch`
/// takes `&mut self` and needs no internal locking.
pub trait EncoderBackend: Send {
    /// Encodes `texts` into one vector per text, in the same order
    fn encode_batch(&mut self, texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>>;
}

/// Process-wide loaded model state, shared read-only by every worker.
pub trait PooledModel: Send + Sync {
    /// Model identifier reported to clients (e.g. "all-MiniLM-L6-v2")
    fn name(&self) -> &str;

    /// Output dimension of every vector this model produces
    fn dimension(&self) -> usize;

    /// Creates the encoder instance owned by worker `worker_id`
    fn create_encoder(&self, worker_id: usize) -> anyhow::Result<Box<dyn EncoderBackend>>;
}

/// Information about the loaded model, as served by `GET /v1/models`
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub dimensions: usize,
    pub available: bool,
    pub is_default: bool,
}

