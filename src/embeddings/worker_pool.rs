// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Fixed-size pool of embedding workers
//!
//! Each worker is a dedicated OS thread that owns one `EncoderBackend`
//! instance for the lifetime of the pool. Workers pull sub-batches from a
//! single shared queue, so a sub-batch goes to whichever worker frees up
//! first and is processed by exactly one worker. Every sub-batch carries its
//! own oneshot reply channel, which lets the async side await sub-batches
//! independently of each other.
//!
//! Each worker also has a private queue, drained ahead of the shared one.
//! `submit_avoiding` uses it to send a failed sub-batch to a worker other
//! than the one it failed on.
//!
//! Lifecycle:
//! - `start`: spawn all workers and wait until every encoder is ready; if any
//!   worker fails, the queue is closed and all workers are joined
//! - `submit` / `collect`: enqueue a sub-batch, await its vectors
//! - `submit_avoiding`: enqueue a sub-batch for any worker but one
//! - `stop`: close the queue and join every worker (idempotent)

use crate::embeddings::{EmbeddingError, EmbeddingResult, EmbeddingVector, PooledModel};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
struct Reply {
    worker_id: usize,
    outcome: Result<Vec<EmbeddingVector>, String>,
}

struct Job {
    batch_id: u64,
    texts: Vec<String>,
    reply: oneshot::Sender<Reply>,
}

/// Shared queue; idle workers line up on the async lock
type JobQueue = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>;

struct Senders {
    shared: mpsc::UnboundedSender<Job>,
    /// Indexed by worker id
    direct: Vec<mpsc::UnboundedSender<Job>>,
}

#[derive(Default)]
struct Counters {
    live_workers: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Snapshot of pool activity, served by `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub pool_size: usize,
    pub live_workers: usize,
    pub running: bool,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    /// Sub-batches dropped because their request had already given up
    pub skipped: u64,
}

struct WorkerHandle {
    id: usize,
    thread: JoinHandle<()>,
}

/// Handle on a submitted sub-batch; redeem it with `WorkerPool::collect`
#[derive(Debug)]
pub struct PendingBatch {
    batch_id: u64,
    offset: usize,
    len: usize,
    reply: oneshot::Receiver<Reply>,
}

impl PendingBatch {
    pub fn batch_id(&self) -> u64 {
        self.batch_id
    }

    /// Position of the sub-batch's first text in the original request
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct WorkerPool {
    model_name: String,
    dimension: usize,
    size: usize,
    /// `None` once the pool is stopped
    senders: Mutex<Option<Senders>>,
    workers: Mutex<Vec<WorkerHandle>>,
    counters: Arc<Counters>,
    next_batch_id: AtomicU64,
    next_rerouted: AtomicUsize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("size", &self.size)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Starts `pool_size` workers, each with its own encoder created from `model`
    ///
    /// # Errors
    /// - `Configuration` if `pool_size` is 0
    /// - `Initialization` if any worker fails to create its encoder; in that
    ///   case every already-started worker is shut down before returning
    pub async fn start(model: Arc<dyn PooledModel>, pool_size: usize) -> EmbeddingResult<Self> {
        if pool_size == 0 {
            return Err(EmbeddingError::Configuration(
                "pool size must be greater than 0".to_string(),
            ));
        }

        let model_name = model.name().to_string();
        let dimension = model.dimension();
        info!(
            model = %model_name,
            pool_size,
            "🚀 Starting embedding worker pool"
        );

        let (shared, receiver) = mpsc::unbounded_channel();
        let queue: JobQueue = Arc::new(tokio::sync::Mutex::new(receiver));
        let mut direct = Vec::with_capacity(pool_size);
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(pool_size);
        let mut readiness = Vec::with_capacity(pool_size);
        let mut failure: Option<String> = None;

        for worker_id in 0..pool_size {
            let (ready_tx, ready_rx) = oneshot::channel();
            let model = Arc::clone(&model);
            let queue = Arc::clone(&queue);
            let counters = Arc::clone(&counters);
            let (direct_tx, direct_rx) = mpsc::unbounded_channel();
            direct.push(direct_tx);

            let spawned = std::thread::Builder::new()
                .name(format!("embed-worker-{}", worker_id))
                .spawn(move || {
                    worker_main(worker_id, model, queue, direct_rx, counters, ready_tx)
                });

            match spawned {
                Ok(thread) => {
                    workers.push(WorkerHandle {
                        id: worker_id,
                        thread,
                    });
                    readiness.push((worker_id, ready_rx));
                }
                Err(e) => {
                    failure = Some(format!("failed to spawn worker {}: {}", worker_id, e));
                    break;
                }
            }
        }
        drop(model);

        for (worker_id, ready_rx) in readiness {
            let outcome = match ready_rx.await {
                Ok(Ok(())) => continue,
                Ok(Err(reason)) => format!("worker {} failed to load model: {}", worker_id, reason),
                Err(_) => format!("worker {} exited before becoming ready", worker_id),
            };
            error!("✗ {}", outcome);
            failure.get_or_insert(outcome);
        }

        if let Some(reason) = failure {
            // Closing the queues makes every ready worker exit
            drop(shared);
            drop(direct);
            join_workers(workers).await;
            return Err(EmbeddingError::Initialization(reason));
        }

        info!(
            model = %model_name,
            pool_size,
            dimension,
            "✅ Embedding worker pool ready"
        );

        Ok(Self {
            model_name,
            dimension,
            size: pool_size,
            senders: Mutex::new(Some(Senders { shared, direct })),
            workers: Mutex::new(workers),
            counters,
            next_batch_id: AtomicU64::new(0),
            next_rerouted: AtomicUsize::new(0),
        })
    }

    /// Enqueues a sub-batch for the next available worker
    ///
    /// Never blocks beyond the enqueue. `offset` is the position of the first
    /// text in the caller's request and is only used for error attribution.
    pub fn submit(
        &self,
        batch_id: u64,
        offset: usize,
        texts: Vec<String>,
    ) -> EmbeddingResult<PendingBatch> {
        self.enqueue(batch_id, offset, texts, None)
    }

    /// Enqueues a sub-batch for a worker other than `worker_id`
    ///
    /// The target is picked round-robin among the remaining workers and the
    /// sub-batch waits on that worker's private queue.
    ///
    /// # Errors
    /// - `Configuration` if the pool has no worker besides `worker_id`
    /// - `PoolStopped` once the pool is stopped
    pub fn submit_avoiding(
        &self,
        batch_id: u64,
        offset: usize,
        texts: Vec<String>,
        worker_id: usize,
    ) -> EmbeddingResult<PendingBatch> {
        if self.size < 2 || worker_id >= self.size {
            return Err(EmbeddingError::Configuration(format!(
                "no worker other than {} in a pool of {}",
                worker_id, self.size
            )));
        }

        let mut target = self.next_rerouted.fetch_add(1, Ordering::Relaxed) % (self.size - 1);
        if target >= worker_id {
            target += 1;
        }
        debug!(batch_id, from = worker_id, to = target, "Rerouting sub-batch");
        self.enqueue(batch_id, offset, texts, Some(target))
    }

    fn enqueue(
        &self,
        batch_id: u64,
        offset: usize,
        texts: Vec<String>,
        target: Option<usize>,
    ) -> EmbeddingResult<PendingBatch> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let len = texts.len();

        {
            let guard = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
            let senders = guard.as_ref().ok_or(EmbeddingError::PoolStopped)?;
            let sender = match target {
                Some(id) => senders.direct.get(id).ok_or(EmbeddingError::PoolStopped)?,
                None => &senders.shared,
            };
            sender
                .send(Job {
                    batch_id,
                    texts,
                    reply: reply_tx,
                })
                .map_err(|_| EmbeddingError::PoolStopped)?;
        }

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        debug!(batch_id, offset, len, "Sub-batch submitted");

        Ok(PendingBatch {
            batch_id,
            offset,
            len,
            reply: reply_rx,
        })
    }

    /// Waits for the worker's reply to `pending`
    ///
    /// Fails with `Encode` if the backend errored or panicked, or if it
    /// returned the wrong number of vectors or a wrong dimension.
    pub async fn collect(&self, pending: PendingBatch) -> EmbeddingResult<Vec<EmbeddingVector>> {
        let PendingBatch {
            batch_id,
            offset,
            len,
            reply,
        } = pending;

        let (worker_id, vectors) = match reply.await {
            Ok(Reply {
                worker_id,
                outcome: Ok(vectors),
            }) => (worker_id, vectors),
            Ok(Reply {
                worker_id,
                outcome: Err(reason),
            }) => {
                return Err(EmbeddingError::encode(batch_id, offset, reason).on_worker(worker_id))
            }
            Err(_) => {
                return Err(EmbeddingError::encode(
                    batch_id,
                    offset,
                    "worker dropped the sub-batch without replying",
                ))
            }
        };

        if vectors.len() != len {
            return Err(EmbeddingError::encode(
                batch_id,
                offset,
                format!("backend returned {} vectors for {} texts", vectors.len(), len),
            )
            .on_worker(worker_id));
        }
        if let Some((i, bad)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != self.dimension)
        {
            return Err(EmbeddingError::encode(
                batch_id,
                offset,
                format!(
                    "vector {} has {} dimensions (expected {})",
                    offset + i,
                    bad.len(),
                    self.dimension
                ),
            )
            .on_worker(worker_id));
        }

        Ok(vectors)
    }

    /// Closes the queues and joins every worker, releasing their encoders
    ///
    /// Workers finish the sub-batch they are currently running. Calling
    /// `stop` more than once is a no-op.
    pub async fn stop(&self) {
        let senders = self
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));

        if senders.is_none() && workers.is_empty() {
            debug!("Worker pool already stopped");
            return;
        }

        info!(model = %self.model_name, "🛑 Stopping embedding worker pool");
        drop(senders);
        join_workers(workers).await;
        info!(model = %self.model_name, "Embedding worker pool stopped");
    }

    /// Allocates a pool-unique sub-batch id
    pub fn next_batch_id(&self) -> u64 {
        self.next_batch_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pool_size: self.size,
            live_workers: self.counters.live_workers.load(Ordering::Relaxed),
            running: self.is_running(),
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }
}

fn worker_main(
    worker_id: usize,
    model: Arc<dyn PooledModel>,
    queue: JobQueue,
    mut direct: mpsc::UnboundedReceiver<Job>,
    counters: Arc<Counters>,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let encoder = catch_unwind(AssertUnwindSafe(|| model.create_encoder(worker_id)));
    let mut encoder = match encoder {
        Ok(Ok(encoder)) => encoder,
        Ok(Err(e)) => {
            let _ = ready.send(Err(format!("{:#}", e)));
            return;
        }
        Err(panic) => {
            let _ = ready.send(Err(panic_message(panic.as_ref())));
            return;
        }
    };
    drop(model);

    counters.live_workers.fetch_add(1, Ordering::Relaxed);
    let _ = ready.send(Ok(()));
    debug!(worker_id, "Worker ready");

    loop {
        let Some(job) = futures::executor::block_on(next_job(&queue, &mut direct)) else {
            break;
        };

        if job.reply.is_closed() {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(worker_id, batch_id = job.batch_id, "Skipping abandoned sub-batch");
            continue;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| encoder.encode_batch(&job.texts)));
        let outcome = match outcome {
            Ok(Ok(vectors)) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                Ok(vectors)
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker_id, batch_id = job.batch_id, "Sub-batch failed: {:#}", e);
                Err(format!("{:#}", e))
            }
            Err(panic) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                let reason = panic_message(panic.as_ref());
                error!(worker_id, batch_id = job.batch_id, "Encoder panicked: {}", reason);
                Err(reason)
            }
        };

        if job.reply.send(Reply { worker_id, outcome }).is_err() {
            debug!(worker_id, batch_id = job.batch_id, "Collector went away before reply");
        }
    }

    counters.live_workers.fetch_sub(1, Ordering::Relaxed);
    debug!(worker_id, "Worker exiting");
}

/// Next job for a worker: its private queue first, then the shared one
///
/// Only one idle worker waits on the shared queue at a time; the rest wait
/// on its lock while still watching their private queues.
async fn next_job(queue: &JobQueue, direct: &mut mpsc::UnboundedReceiver<Job>) -> Option<Job> {
    tokio::select! {
        biased;
        Some(job) = direct.recv() => Some(job),
        job = async { queue.lock().await.recv().await } => job,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("encoder panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("encoder panicked: {}", msg)
    } else {
        "encoder panicked".to_string()
    }
}

async fn join_workers(workers: Vec<WorkerHandle>) {
    if workers.is_empty() {
        return;
    }

    let joined = tokio::task::spawn_blocking(move || {
        for worker in workers {
            if worker.thread.join().is_err() {
                warn!(worker_id = worker.id, "Worker thread terminated abnormally");
            }
        }
    })
    .await;

    if let Err(e) = joined {
        warn!("Failed to join worker threads: {}", e);
    }
}
