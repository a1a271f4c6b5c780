// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Stub models shared by the integration tests
#![allow(dead_code)]

use fabstir_embed_node::embeddings::{
    EmbeddingVector, EncoderBackend, HashEmbeddingModel, PooledModel, WorkerPool,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub type EncodeFn = Arc<dyn Fn(&[String]) -> anyhow::Result<Vec<EmbeddingVector>> + Send + Sync>;

/// Model whose encoders run an arbitrary closure
///
/// `live_encoders` counts encoder instances that currently exist, which lets
/// tests prove that a failed start or a stop released every worker.
pub struct ScriptedModel {
    pub dimension: usize,
    pub encode: EncodeFn,
    pub failing_worker: Option<usize>,
    pub live_encoders: Arc<AtomicUsize>,
}

impl ScriptedModel {
    pub fn new(
        dimension: usize,
        encode: impl Fn(&[String]) -> anyhow::Result<Vec<EmbeddingVector>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            dimension,
            encode: Arc::new(encode),
            failing_worker: None,
            live_encoders: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_on_worker(mut self, worker_id: usize) -> Self {
        self.failing_worker = Some(worker_id);
        self
    }
}

impl PooledModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn create_encoder(&self, worker_id: usize) -> anyhow::Result<Box<dyn EncoderBackend>> {
        if self.failing_worker == Some(worker_id) {
            // Let the healthy workers get ahead so the failure hits a partially started pool
            std::thread::sleep(Duration::from_millis(20));
            anyhow::bail!("weights for worker {} are corrupt", worker_id);
        }

        self.live_encoders.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEncoder {
            encode: Arc::clone(&self.encode),
            live_encoders: Arc::clone(&self.live_encoders),
        }))
    }
}

struct ScriptedEncoder {
    encode: EncodeFn,
    live_encoders: Arc<AtomicUsize>,
}

impl EncoderBackend for ScriptedEncoder {
    fn encode_batch(&mut self, texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>> {
        (self.encode)(texts)
    }
}

impl Drop for ScriptedEncoder {
    fn drop(&mut self) {
        self.live_encoders.fetch_sub(1, Ordering::SeqCst);
    }
}

/// "hello" -> [1,0,0,0], "world" -> [0,1,0,0]
pub fn hello_world_model() -> ScriptedModel {
    ScriptedModel::new(4, |texts| {
        texts
            .iter()
            .map(|text| match text.as_str() {
                "hello" => Ok(vec![1.0, 0.0, 0.0, 0.0]),
                "world" => Ok(vec![0.0, 1.0, 0.0, 0.0]),
                other => anyhow::bail!("no stub vector for {:?}", other),
            })
            .collect()
    })
}

pub const HASH_DIMENSION: usize = 16;

pub fn hash_model() -> HashEmbeddingModel {
    HashEmbeddingModel::new("hash-test", HASH_DIMENSION, true).expect("valid hash model")
}

/// Hash vectors, but sleeps for `delay` whenever a text contains "slow"
pub fn slow_model(delay: Duration) -> ScriptedModel {
    let hash = hash_model();
    ScriptedModel::new(HASH_DIMENSION, move |texts| {
        if texts.iter().any(|t| t.contains("slow")) {
            std::thread::sleep(delay);
        }
        Ok(texts.iter().map(|t| hash.generate(t)).collect())
    })
}

/// Hash vectors, but fails any sub-batch containing `marker`
pub fn failing_model(marker: &'static str) -> ScriptedModel {
    let hash = hash_model();
    ScriptedModel::new(HASH_DIMENSION, move |texts| {
        if texts.iter().any(|t| t == marker) {
            anyhow::bail!("backend raised on {:?}", marker);
        }
        Ok(texts.iter().map(|t| hash.generate(t)).collect())
    })
}

/// Name of the worker thread running the calling encoder
pub fn current_worker() -> String {
    std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string()
}

pub fn texts(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}-{}", prefix, i)).collect()
}

pub async fn start_pool(model: impl PooledModel + 'static, size: usize) -> WorkerPool {
    WorkerPool::start(Arc::new(model), size)
        .await
        .expect("pool should start")
}

/// Router over a fresh pool, plus the pool so tests can inspect or stop it
pub async fn test_app(
    model: impl PooledModel + 'static,
    pool_size: usize,
    pool_config: fabstir_embed_node::config::PoolConfig,
) -> (axum::Router, Arc<WorkerPool>) {
    test_app_with_limits(
        model,
        pool_size,
        pool_config,
        fabstir_embed_node::config::RequestLimits::default(),
    )
    .await
}

pub async fn test_app_with_limits(
    model: impl PooledModel + 'static,
    pool_size: usize,
    pool_config: fabstir_embed_node::config::PoolConfig,
    limits: fabstir_embed_node::config::RequestLimits,
) -> (axum::Router, Arc<WorkerPool>) {
    let pool = Arc::new(start_pool(model, pool_size).await);
    let state = fabstir_embed_node::AppState::new(Arc::clone(&pool), pool_config, limits);
    (fabstir_embed_node::create_app(Arc::new(state)), pool)
}

/// Sends a request and decodes the JSON body (`Null` when the body is empty)
pub async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<&str>,
) -> (axum::http::StatusCode, serde_json::Value) {
    use tower::util::ServiceExt;

    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let request = builder
        .body(axum::body::Body::from(body.unwrap_or_default().to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn post_embedding(
    app: axum::Router,
    body: &str,
) -> (axum::http::StatusCode, serde_json::Value) {
    send(app, "POST", "/embedding/", Some(body)).await
}

/// Vectors that went through JSON only match up to float formatting
pub fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() < 1e-6, "component {}: {} != {}", i, a, e);
    }
}
