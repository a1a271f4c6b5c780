// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Response body for POST /embedding/

use crate::embeddings::EmbeddingVector;
use serde::{Deserialize, Serialize};

/// Response body for POST /embedding/
///
/// `embedding[i]` is the vector of `texts[i]` from the request.
///
/// # Example
/// ```json
/// {
///   "embedding": [[0.1, 0.2, ...], [0.3, 0.4, ...]],
///   "model": "all-MiniLM-L6-v2",
///   "dimensions": 384
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingResponse {
    pub embedding: Vec<EmbeddingVector>,
    pub model: String,
    pub dimensions: usize,
}

impl EmbeddingResponse {
    pub fn new(embedding: Vec<EmbeddingVector>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            embedding,
            model: model.into(),
            dimensions,
        }
    }

    pub fn embedding_count(&self) -> usize {
        self.embedding.len()
    }
}
