// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Startup model loading
//!
//! Resolves the configured backend into the process-wide `PooledModel`.
//! For the ONNX backend, model files missing locally are fetched from the
//! HuggingFace Hub (cached under the usual `~/.cache/huggingface` directory).

use crate::config::{BackendKind, ModelConfig};
use crate::embeddings::{
    EmbeddingError, EmbeddingResult, HashEmbeddingModel, OnnxPooledModel, PooledModel,
};
use anyhow::{Context, Result};
use hf_hub::api::sync::Api;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Path of the ONNX export inside sentence-transformers repositories
const HF_ONNX_FILE: &str = "onnx/model.onnx";
const HF_TOKENIZER_FILE: &str = "tokenizer.json";

/// Loads the model described by `config`
///
/// Runs the (blocking) download and load on the blocking thread pool.
/// Any failure is reported as `Initialization`.
pub async fn load_pooled_model(config: ModelConfig) -> EmbeddingResult<Arc<dyn PooledModel>> {
    let name = config.name.clone();
    info!(model = %name, backend = ?config.backend, "🧠 Loading embedding model");

    let loaded = tokio::task::spawn_blocking(move || load_blocking(&config))
        .await
        .map_err(|e| EmbeddingError::Initialization(format!("model loading task failed: {}", e)))?;

    loaded.map_err(|e| {
        EmbeddingError::Initialization(format!("failed to load model {}: {:#}", name, e))
    })
}

fn load_blocking(config: &ModelConfig) -> Result<Arc<dyn PooledModel>> {
    match config.backend {
        BackendKind::Hash => {
            let model = HashEmbeddingModel::new(&config.name, config.dimensions, config.normalize)?;
            Ok(Arc::new(model))
        }
        BackendKind::Onnx => {
            let (model_path, tokenizer_path) = resolve_onnx_files(config)?;
            let model = OnnxPooledModel::load(
                &config.name,
                model_path,
                tokenizer_path,
                config.dimensions,
                config.intra_threads,
            )?;
            Ok(Arc::new(model))
        }
    }
}

/// Local paths win; anything missing comes from `hf_repo`
fn resolve_onnx_files(config: &ModelConfig) -> Result<(PathBuf, PathBuf)> {
    if let (Some(model), Some(tokenizer)) = (&config.model_path, &config.tokenizer_path) {
        return Ok((model.clone(), tokenizer.clone()));
    }

    let repo_id = config
        .hf_repo
        .as_deref()
        .context("model_path/tokenizer_path not set and no hf_repo configured")?;

    info!(repo = %repo_id, "⬇️  Fetching model files from HuggingFace Hub");
    let api = Api::new().context("Failed to initialise HuggingFace Hub client")?;
    let repo = api.model(repo_id.to_string());

    let model_path = match &config.model_path {
        Some(path) => path.clone(),
        None => repo
            .get(HF_ONNX_FILE)
            .with_context(|| format!("Failed to download {} from {}", HF_ONNX_FILE, repo_id))?,
    };
    let tokenizer_path = match &config.tokenizer_path {
        Some(path) => path.clone(),
        None => repo
            .get(HF_TOKENIZER_FILE)
            .with_context(|| format!("Failed to download {} from {}", HF_TOKENIZER_FILE, repo_id))?,
    };

    Ok((model_path, tokenizer_path))
}
