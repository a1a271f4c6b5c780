// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Request body for POST /embedding/

use crate::api::ApiError;
use crate::config::RequestLimits;
use serde::{Deserialize, Serialize};

/// Request body for POST /embedding/
///
/// # Example
/// ```json
/// {
///   "texts": ["Hello world", "Another text"],
///   "batchSize": 16
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingRequest {
    /// Texts to embed; output order matches this order
    pub texts: Vec<String>,

    /// Overrides the service's default sub-batch size for this request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

impl EmbeddingRequest {
    pub fn new(texts: Vec<String>) -> Self {
        Self {
            texts,
            batch_size: None,
        }
    }

    /// Validates the request against the configured limits
    ///
    /// # Validation Rules
    /// 1. **texts**: 1 to `max_texts` items
    /// 2. **non-empty**: every text has at least one character (whitespace counts)
    /// 3. **text length**: at most `max_text_chars` characters each
    /// 4. **batchSize**: when present, greater than 0
    pub fn validate(&self, limits: &RequestLimits) -> Result<(), ApiError> {
        if self.texts.is_empty() {
            return Err(ApiError::ValidationError {
                field: "texts".to_string(),
                message: "texts array must contain at least 1 item".to_string(),
            });
        }

        if self.texts.len() > limits.max_texts {
            return Err(ApiError::ValidationError {
                field: "texts".to_string(),
                message: format!(
                    "texts array cannot contain more than {} items (got {})",
                    limits.max_texts,
                    self.texts.len()
                ),
            });
        }

        for (index, text) in self.texts.iter().enumerate() {
            if text.is_empty() {
                return Err(ApiError::ValidationError {
                    field: format!("texts[{}]", index),
                    message: "text cannot be empty".to_string(),
                });
            }

            let chars = text.chars().count();
            if chars > limits.max_text_chars {
                return Err(ApiError::ValidationError {
                    field: format!("texts[{}]", index),
                    message: format!(
                        "text cannot exceed {} characters (got {} characters)",
                        limits.max_text_chars, chars
                    ),
                });
            }
        }

        if self.batch_size == Some(0) {
            return Err(ApiError::ValidationError {
                field: "batchSize".to_string(),
                message: "batchSize must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}
