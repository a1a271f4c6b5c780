// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedding API Module
//!
//! Provides the POST /embedding/ endpoint: a batch of texts in, one vector
//! per text out, in the same order.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::embed_handler;
pub use request::EmbeddingRequest;
pub use response::EmbeddingResponse;
