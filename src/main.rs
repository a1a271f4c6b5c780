// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use fabstir_embed_node::{
    api::{serve, shutdown_signal, AppState},
    cli::Cli,
    embeddings::{load_pooled_model, PooledModel, WorkerPool},
    version,
};
use std::{env, sync::Arc};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("🚀 Starting Fabstir Embed Node...\n");
    println!("📦 BUILD VERSION: {}", version::VERSION);
    println!("📅 Build Date: {}", version::BUILD_DATE);
    println!("✨ Features: {}", version::FEATURES.join(", "));
    println!();

    let cli = Cli::load();
    let config = cli.resolve_config()?;
    config.validate()?;

    println!("🧠 Loading embedding model '{}'...", config.model.name);
    let model = load_pooled_model(config.model.clone()).await?;
    println!(
        "✅ Model loaded ({} dimensions, {:?} backend)",
        model.dimension(),
        config.model.backend
    );

    println!("👷 Starting {} encoder workers...", config.pool.pool_size);
    let pool = Arc::new(WorkerPool::start(model, config.pool.pool_size).await?);
    println!("✅ Worker pool ready");

    let state = Arc::new(AppState::new(
        pool.clone(),
        config.pool.clone(),
        config.limits.clone(),
    ));

    let listener = TcpListener::bind(&config.listen_addr).await?;
    let addr = listener.local_addr()?;

    println!("\n🌐 Endpoints:");
    println!("  Embed:   POST http://{}/embedding/", addr);
    println!("  Health:  GET  http://{}/health", addr);
    println!("  Models:  GET  http://{}/v1/models", addr);
    println!(
        "  Batching: {} texts per sub-batch, timeout {}",
        config.pool.batch_size,
        match config.pool.request_timeout() {
            Some(timeout) => format!("{}ms", timeout.as_millis()),
            None => "disabled".to_string(),
        }
    );
    println!();

    let served = serve(listener, state, shutdown_signal()).await;

    // The HTTP side has drained; release the workers and their models
    pool.stop().await;
    println!("👋 Fabstir Embed Node stopped");

    served
}
