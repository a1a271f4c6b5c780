// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Batch dispatcher
//!
//! Splits a request into contiguous sub-batches, fans them out to the worker
//! pool and reassembles the vectors so that `result[i]` always belongs to
//! `texts[i]`, whatever order the workers finish in.
//!
//! A request moves through
//! `Received -> Partitioned -> Dispatched -> Collected -> Assembled -> Done`
//! and ends in `Failed` as soon as any sub-batch fails or the deadline
//! passes. Nothing partial is ever returned.

use crate::embeddings::{
    EmbeddingError, EmbeddingResult, EmbeddingVector, PendingBatch, WorkerPool,
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// A contiguous slice of the request, dispatched as one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubBatch {
    /// Index of the first text in the original request
    pub offset: usize,
    pub len: usize,
}

impl SubBatch {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Per-request dispatch settings
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOptions {
    /// Maximum texts per sub-batch
    pub batch_size: usize,
    /// Deadline for the whole request
    pub timeout: Option<Duration>,
    /// Resubmit a failed sub-batch once, on a different worker, before
    /// failing the request
    pub retry_failed_batches: bool,
}

impl DispatchOptions {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            timeout: None,
            retry_failed_batches: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry_failed_batches = retry;
        self
    }
}

/// Splits `total` texts into contiguous sub-batches of at most `batch_size`
pub fn partition(total: usize, batch_size: usize) -> EmbeddingResult<Vec<SubBatch>> {
    if batch_size == 0 {
        return Err(EmbeddingError::Configuration(
            "batch size must be greater than 0".to_string(),
        ));
    }

    Ok((0..total)
        .step_by(batch_size)
        .map(|offset| SubBatch {
            offset,
            len: batch_size.min(total - offset),
        })
        .collect())
}

/// Encodes `texts` on `pool`, without a deadline
pub async fn encode(
    texts: &[String],
    pool: &WorkerPool,
    batch_size: usize,
) -> EmbeddingResult<Vec<EmbeddingVector>> {
    encode_with_options(texts, pool, &DispatchOptions::new(batch_size)).await
}

/// Encodes `texts` on `pool`, failing with `Timeout` after `timeout`
pub async fn encode_with_deadline(
    texts: &[String],
    pool: &WorkerPool,
    batch_size: usize,
    timeout: Duration,
) -> EmbeddingResult<Vec<EmbeddingVector>> {
    encode_with_options(texts, pool, &DispatchOptions::new(batch_size).with_timeout(timeout)).await
}

pub async fn encode_with_options(
    texts: &[String],
    pool: &WorkerPool,
    options: &DispatchOptions,
) -> EmbeddingResult<Vec<EmbeddingVector>> {
    let sub_batches = partition(texts.len(), options.batch_size)?;
    if sub_batches.is_empty() {
        return Ok(vec![]);
    }
    debug!(
        texts = texts.len(),
        sub_batches = sub_batches.len(),
        batch_size = options.batch_size,
        "Request partitioned"
    );

    let outstanding = AtomicUsize::new(sub_batches.len());
    let work = dispatch_and_collect(
        texts,
        pool,
        &sub_batches,
        options.retry_failed_batches,
        &outstanding,
    );

    let result = match options.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
                pending: outstanding.load(Ordering::Relaxed),
            }),
        },
        None => work.await,
    };

    match &result {
        Ok(vectors) => debug!(vectors = vectors.len(), "Request assembled"),
        Err(e) => warn!(error_kind = e.kind(), "Request failed: {}", e),
    }
    result
}

async fn dispatch_and_collect(
    texts: &[String],
    pool: &WorkerPool,
    sub_batches: &[SubBatch],
    retry: bool,
    outstanding: &AtomicUsize,
) -> EmbeddingResult<Vec<EmbeddingVector>> {
    let mut in_flight = FuturesUnordered::new();
    for (index, sub_batch) in sub_batches.iter().enumerate() {
        let pending = submit(pool, texts, sub_batch)?;
        in_flight.push(collect_one(pool, index, 0, pending));
    }
    debug!(sub_batches = sub_batches.len(), "Request dispatched");

    // Indexed by sub-batch, so completion order does not matter
    let mut results: Vec<Option<Vec<EmbeddingVector>>> = vec![None; sub_batches.len()];

    while let Some((index, attempt, result)) = in_flight.next().await {
        match result {
            Ok(vectors) => {
                results[index] = Some(vectors);
                outstanding.fetch_sub(1, Ordering::Relaxed);
            }
            Err(err) => match err.failed_worker() {
                // Only Encode failures name a worker; a single-worker pool has nowhere else to go
                Some(failed_worker) if retry && attempt == 0 && pool.size() > 1 => {
                    warn!(failed_worker, "Retrying sub-batch once on another worker: {}", err);
                    let sub_batch = &sub_batches[index];
                    let pending = pool.submit_avoiding(
                        pool.next_batch_id(),
                        sub_batch.offset,
                        texts[sub_batch.range()].to_vec(),
                        failed_worker,
                    )?;
                    in_flight.push(collect_one(pool, index, attempt + 1, pending));
                }
                // Dropping `in_flight` abandons the remaining sub-batches
                _ => return Err(err),
            },
        }
    }
    debug!("All sub-batches collected");

    Ok(results.into_iter().flatten().flatten().collect())
}

fn submit(pool: &WorkerPool, texts: &[String], sub_batch: &SubBatch) -> EmbeddingResult<PendingBatch> {
    pool.submit(
        pool.next_batch_id(),
        sub_batch.offset,
        texts[sub_batch.range()].to_vec(),
    )
}

async fn collect_one(
    pool: &WorkerPool,
    index: usize,
    attempt: u32,
    pending: PendingBatch,
) -> (usize, u32, EmbeddingResult<Vec<EmbeddingVector>>) {
    (index, attempt, pool.collect(pending).await)
}
