// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use clap::Parser;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::{BackendKind, ConfigError, ServiceConfig};

/// Fabstir Embed Node
///
/// Flags override the TOML file and `EMBED_*` environment variables.
#[derive(Parser, Debug, Default)]
#[command(name = "fabstir-embed-node")]
#[command(version = crate::version::VERSION_NUMBER)]
#[command(about = "HTTP service computing sentence embeddings on a worker pool", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, short, env = "EMBED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on (e.g., 0.0.0.0:8080)
    #[arg(long)]
    pub listen: Option<String>,

    /// Encoder backend
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Model name reported to clients
    #[arg(long)]
    pub model_name: Option<String>,

    /// Path to the ONNX model file
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// Path to tokenizer.json
    #[arg(long)]
    pub tokenizer_path: Option<PathBuf>,

    /// Number of encoder workers
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Default maximum texts per sub-batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Per-request deadline in milliseconds (0 disables it)
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,
}

impl Cli {
    /// Parses the process arguments after loading `.env`
    pub fn load() -> Self {
        Self::load_from(None, std::env::args_os())
    }

    /// Loads `env_file` (or `.env` from the working directory) before
    /// parsing, so variables it sets such as `EMBED_CONFIG` reach clap
    pub fn load_from<I, T>(env_file: Option<&Path>, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        // A missing file is fine; the variables may come from the real environment
        let _ = match env_file {
            Some(path) => dotenv::from_path(path),
            None => dotenv::dotenv().map(|_| ()),
        };
        Self::parse_from(args)
    }

    /// Loads file + environment configuration and applies the flags on top
    pub fn resolve_config(&self) -> Result<ServiceConfig, ConfigError> {
        let mut config = ServiceConfig::load(self.config.as_deref())?;
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(listen) = &self.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(backend) = self.backend {
            config.model.backend = backend;
        }
        if let Some(name) = &self.model_name {
            config.model.name = name.clone();
        }
        if let Some(path) = &self.model_path {
            config.model.model_path = Some(path.clone());
        }
        if let Some(path) = &self.tokenizer_path {
            config.model.tokenizer_path = Some(path.clone());
        }
        if let Some(pool_size) = self.pool_size {
            config.pool.pool_size = pool_size;
        }
        if let Some(batch_size) = self.batch_size {
            config.pool.batch_size = batch_size;
        }
        if let Some(timeout) = self.request_timeout_ms {
            config.pool.request_timeout_ms = timeout;
        }
    }
}
