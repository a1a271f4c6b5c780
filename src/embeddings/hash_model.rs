// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deterministic hash-based embedding model
//!
//! Produces pseudo-random vectors seeded by the text hash. No model files are
//! needed, which makes it the backend of choice for local development and
//! smoke tests of the full HTTP path. Identical text always yields identical
//! vectors.

use crate::embeddings::{EmbeddingError, EmbeddingVector, EncoderBackend, PooledModel};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct HashEmbeddingModel {
    name: String,
    dimension: usize,
    normalize: bool,
}

impl HashEmbeddingModel {
    pub fn new(
        name: impl Into<String>,
        dimension: usize,
        normalize: bool,
    ) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::Configuration(
                "Embedding dimension must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            name: name.into(),
            dimension,
            normalize,
        })
    }

    /// Computes the embedding of a single text
    pub fn generate(&self, text: &str) -> EmbeddingVector {
        generate(text, self.dimension, self.normalize)
    }
}

impl PooledModel for HashEmbeddingModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn create_encoder(&self, _worker_id: usize) -> anyhow::Result<Box<dyn EncoderBackend>> {
        Ok(Box::new(HashEncoder {
            dimension: self.dimension,
            normalize: self.normalize,
        }))
    }
}

struct HashEncoder {
    dimension: usize,
    normalize: bool,
}

impl EncoderBackend for HashEncoder {
    fn encode_batch(&mut self, texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>> {
        Ok(texts
            .iter()
            .map(|text| generate(text, self.dimension, self.normalize))
            .collect())
    }
}

fn generate(text: &str, dimension: usize, normalize: bool) -> EmbeddingVector {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let mut current_seed = hasher.finish();

    let mut embedding = Vec::with_capacity(dimension);
    for i in 0..dimension {
        // Linear congruential step, mixed with the component index
        current_seed =
            (current_seed.wrapping_mul(1664525).wrapping_add(1013904223)) ^ (i as u64);

        // Map to [-1, 1]
        let value = (current_seed as f64 / u64::MAX as f64) * 2.0 - 1.0;
        embedding.push(value as f32);
    }

    if normalize {
        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
    }

    embedding
}
