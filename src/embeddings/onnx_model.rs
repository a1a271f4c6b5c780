// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ONNX sentence-transformer model (all-MiniLM-L6-v2 and compatible)
//!
//! `OnnxPooledModel` reads the ONNX graph into memory and loads the tokenizer
//! once. Every worker then builds its own `OnnxEncoder` session from the shared
//! bytes, so inference never contends on a session lock.
//!
//! Features:
//! - GPU acceleration via CUDA (with automatic CPU fallback)
//! - BERT tokenization with truncation to `max_length`
//! - Batch inference with right padding
//! - Attention-masked mean pooling over token embeddings

use crate::embeddings::{EmbeddingVector, EncoderBackend, PooledModel};
use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Ix3};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info, warn};

/// Maximum sequence length fed to the model
pub const DEFAULT_MAX_LENGTH: usize = 256;

/// Loaded ONNX model weights and tokenizer, shared read-only by all workers
#[derive(Clone)]
pub struct OnnxPooledModel {
    /// Serialized ONNX graph, read from disk once
    model_bytes: Arc<Vec<u8>>,

    tokenizer: Arc<Tokenizer>,

    /// Model name (e.g., "all-MiniLM-L6-v2")
    model_name: String,

    /// Hidden size reported by the validation inference
    dimension: usize,

    /// Intra-op threads per worker session
    intra_threads: usize,
}

impl std::fmt::Debug for OnnxPooledModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxPooledModel")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("model_bytes", &self.model_bytes.len())
            .finish_non_exhaustive()
    }
}

impl OnnxPooledModel {
    /// Loads the model and tokenizer from disk and validates them
    ///
    /// # Errors
    /// Returns error if:
    /// - Model or tokenizer file not found or invalid
    /// - ONNX Runtime initialization fails
    /// - The validation inference does not produce `[batch, seq_len, expected_dimension]`
    ///
    /// # Example
    /// ```ignore
    /// let model = OnnxPooledModel::load(
    ///     "all-MiniLM-L6-v2",
    ///     "./models/all-MiniLM-L6-v2-onnx/model.onnx",
    ///     "./models/all-MiniLM-L6-v2-onnx/tokenizer.json",
    ///     384,
    ///     2,
    /// )?;
    /// ```
    pub fn load<P: AsRef<Path>>(
        model_name: impl Into<String>,
        model_path: P,
        tokenizer_path: P,
        expected_dimension: usize,
        intra_threads: usize,
    ) -> Result<Self> {
        let model_name = model_name.into();
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("ONNX model file not found: {}", model_path.display());
        }
        if !tokenizer_path.exists() {
            anyhow::bail!("Tokenizer file not found: {}", tokenizer_path.display());
        }

        let model_bytes = std::fs::read(model_path)
            .with_context(|| format!("Failed to read ONNX model {}", model_path.display()))?;
        info!(
            model = %model_name,
            bytes = model_bytes.len(),
            "📦 ONNX model read into memory"
        );

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: DEFAULT_MAX_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        let mut model = Self {
            model_bytes: Arc::new(model_bytes),
            tokenizer: Arc::new(tokenizer),
            model_name,
            dimension: expected_dimension,
            intra_threads: intra_threads.max(1),
        };

        // Validation inference; also proves the graph accepts our input names
        let mut encoder = model.new_encoder()?;
        let sample = encoder.encode_batch(&["validation test".to_string()])?;
        let actual = sample.first().map(|v| v.len()).unwrap_or(0);
        if actual != expected_dimension {
            anyhow::bail!(
                "Model {} outputs {} dimensions (expected {})",
                model.model_name,
                actual,
                expected_dimension
            );
        }
        model.dimension = actual;

        info!(
            model = %model.model_name,
            dimension = model.dimension,
            "✅ ONNX embedding model validated"
        );

        Ok(model)
    }

    fn new_encoder(&self) -> Result<OnnxEncoder> {
        let session = build_session(&self.model_bytes, self.intra_threads)?;
        Ok(OnnxEncoder {
            session,
            tokenizer: Arc::clone(&self.tokenizer),
        })
    }
}

impl PooledModel for OnnxPooledModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn create_encoder(&self, worker_id: usize) -> Result<Box<dyn EncoderBackend>> {
        debug!(worker_id, model = %self.model_name, "Creating ONNX session for worker");
        Ok(Box::new(self.new_encoder()?))
    }
}

/// Try CUDA first, fall back to CPU if unavailable
fn build_session(model_bytes: &[u8], intra_threads: usize) -> Result<Session> {
    let cuda_result = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CUDAExecutionProvider::default().build()])
        .context("Failed to set CUDA execution provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(intra_threads)
        .context("Failed to set intra threads")?
        .commit_from_memory(model_bytes);

    match cuda_result {
        Ok(session) => Ok(session),
        Err(e) => {
            warn!("⚠️  CUDA execution provider failed: {}", e);
            warn!("   Falling back to CPU execution provider");
            Session::builder()
                .context("Failed to create session builder")?
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .context("Failed to set CPU execution provider")?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .context("Failed to set optimization level")?
                .with_intra_threads(intra_threads)
                .context("Failed to set intra threads")?
                .commit_from_memory(model_bytes)
                .context("Failed to load ONNX model from memory")
        }
    }
}

/// One worker's ONNX session plus a handle on the shared tokenizer
pub struct OnnxEncoder {
    session: Session,
    tokenizer: Arc<Tokenizer>,
}

impl EncoderBackend for OnnxEncoder {
    fn encode_batch(&mut self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(text.as_str(), true)
                    .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let batch = encodings.len();
        let seq_len = encodings
            .iter()
            .map(|enc| enc.get_ids().len())
            .max()
            .unwrap_or(0);

        // Zero-initialised, so shorter sequences end up right-padded
        let mut input_ids = Array2::<i64>::zeros((batch, seq_len));
        let mut attention_mask = Array2::<i64>::zeros((batch, seq_len));
        for (row, encoding) in encodings.iter().enumerate() {
            let tokens = encoding.get_ids().iter().zip(encoding.get_attention_mask());
            for (col, (&id, &mask)) in tokens.enumerate() {
                input_ids[[row, col]] = i64::from(id);
                attention_mask[[row, col]] = i64::from(mask);
            }
        }
        let token_type_ids = Array2::<i64>::zeros((batch, seq_len));
        let pooling_mask = attention_mask.mapv(|m| m as f32);

        let outputs = self.session.run(ort::inputs![
            "input_ids" => Value::from_array(input_ids)?,
            "attention_mask" => Value::from_array(attention_mask)?,
            "token_type_ids" => Value::from_array(token_type_ids)?
        ])?;

        // Index [0]: output names differ between exported models
        let hidden = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?
            .into_dimensionality::<Ix3>()
            .context("Model output is not [batch, seq_len, hidden]")?;
        if hidden.shape()[..2] != [batch, seq_len] {
            anyhow::bail!(
                "Model outputs shape {:?} for a [{}, {}] input",
                hidden.shape(),
                batch,
                seq_len
            );
        }

        Ok(hidden
            .outer_iter()
            .zip(pooling_mask.outer_iter())
            .map(|(tokens, mask)| mean_pool(tokens, mask))
            .collect())
    }
}

/// Attention-masked mean of `[seq_len, hidden]` token embeddings
fn mean_pool(tokens: ArrayView2<'_, f32>, mask: ArrayView1<'_, f32>) -> EmbeddingVector {
    let summed = mask.dot(&tokens);
    let count = mask.sum().max(1e-9);
    (summed / count).to_vec()
}
