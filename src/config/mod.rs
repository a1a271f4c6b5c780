// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Settings are fixed at process start and resolved in layers:
//! built-in defaults, then an optional TOML file, then `EMBED_*` environment
//! variables (a `.env` file is honoured), then command-line flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which encoder the workers run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// ONNX Runtime sentence-transformer model
    Onnx,
    /// Deterministic hash vectors, no model files needed
    Hash,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "onnx" => Ok(BackendKind::Onnx),
            "hash" => Ok(BackendKind::Hash),
            other => Err(ConfigError::InvalidValue {
                key: "backend".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier reported to clients
    pub name: String,
    pub backend: BackendKind,
    /// Local ONNX file; downloaded from `hf_repo` when unset
    pub model_path: Option<PathBuf>,
    /// Local tokenizer.json; downloaded from `hf_repo` when unset
    pub tokenizer_path: Option<PathBuf>,
    /// HuggingFace repository to fetch missing model files from
    pub hf_repo: Option<String>,
    pub dimensions: usize,
    /// Intra-op threads per worker session
    pub intra_threads: usize,
    /// L2-normalize hash backend vectors
    pub normalize: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "all-MiniLM-L6-v2".to_string(),
            backend: BackendKind::Onnx,
            model_path: None,
            tokenizer_path: None,
            hf_repo: Some("sentence-transformers/all-MiniLM-L6-v2".to_string()),
            dimensions: 384,
            intra_threads: 1,
            normalize: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads, each with its own encoder
    pub pool_size: usize,
    /// Default maximum texts per sub-batch
    pub batch_size: usize,
    /// Per-request deadline in milliseconds; 0 disables it
    pub request_timeout_ms: u64,
    pub retry_failed_batches: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            batch_size: 32,
            request_timeout_ms: 30_000,
            retry_failed_batches: false,
        }
    }
}

impl PoolConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

/// Validation limits applied to every HTTP request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestLimits {
    pub max_texts: usize,
    pub max_text_chars: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_texts: 1024,
            max_text_chars: 8192,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub listen_addr: String,
    pub model: ModelConfig,
    pub pool: PoolConfig,
    pub limits: RequestLimits,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            model: ModelConfig::default(),
            pool: PoolConfig::default(),
            limits: RequestLimits::default(),
        }
    }
}

impl ServiceConfig {
    /// Resolves defaults, the optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Overrides settings from `EMBED_*` environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(addr) = env_string("EMBED_LISTEN_ADDR") {
            self.listen_addr = addr;
        }

        if let Some(name) = env_string("EMBED_MODEL_NAME") {
            self.model.name = name;
        }
        if let Some(backend) = env_parse("EMBED_BACKEND")? {
            self.model.backend = backend;
        }
        if let Some(path) = env_string("EMBED_MODEL_PATH") {
            self.model.model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_string("EMBED_TOKENIZER_PATH") {
            self.model.tokenizer_path = Some(PathBuf::from(path));
        }
        if let Some(repo) = env_string("EMBED_HF_REPO") {
            self.model.hf_repo = Some(repo);
        }
        if let Some(dimensions) = env_parse("EMBED_DIMENSIONS")? {
            self.model.dimensions = dimensions;
        }
        if let Some(threads) = env_parse("EMBED_INTRA_THREADS")? {
            self.model.intra_threads = threads;
        }

        if let Some(pool_size) = env_parse("EMBED_POOL_SIZE")? {
            self.pool.pool_size = pool_size;
        }
        if let Some(batch_size) = env_parse("EMBED_BATCH_SIZE")? {
            self.pool.batch_size = batch_size;
        }
        if let Some(timeout) = env_parse("EMBED_REQUEST_TIMEOUT_MS")? {
            self.pool.request_timeout_ms = timeout;
        }
        if let Some(retry) = env_parse("EMBED_RETRY_FAILED_BATCHES")? {
            self.pool.retry_failed_batches = retry;
        }

        if let Some(max_texts) = env_parse("EMBED_MAX_TEXTS")? {
            self.limits.max_texts = max_texts;
        }
        if let Some(max_chars) = env_parse("EMBED_MAX_TEXT_CHARS")? {
            self.limits.max_text_chars = max_chars;
        }

        Ok(())
    }

    /// Checks settings that would make the service unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "pool_size must be greater than 0".to_string(),
            ));
        }
        if self.pool.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.model.dimensions == 0 {
            return Err(ConfigError::Invalid(
                "dimensions must be greater than 0".to_string(),
            ));
        }
        if self.limits.max_texts == 0 || self.limits.max_text_chars == 0 {
            return Err(ConfigError::Invalid(
                "request limits must be greater than 0".to_string(),
            ));
        }
        if self.model.name.trim().is_empty() {
            return Err(ConfigError::Invalid("model name cannot be empty".to_string()));
        }

        if self.model.backend == BackendKind::Onnx {
            let local_files = self.model.model_path.is_some() && self.model.tokenizer_path.is_some();
            if !local_files && self.model.hf_repo.is_none() {
                return Err(ConfigError::Invalid(
                    "onnx backend needs model_path and tokenizer_path, or hf_repo".to_string(),
                ));
            }
            for path in [&self.model.model_path, &self.model.tokenizer_path]
                .into_iter()
                .flatten()
            {
                if !path.exists() {
                    return Err(ConfigError::Invalid(format!(
                        "file not found: {}",
                        path.display()
                    )));
                }
            }
        }

        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env_string(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        None => Ok(None),
    }
}
