// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the Fabstir Embed Node

/// Full version string with feature description
pub const VERSION: &str = "v0.3.0-worker-pool-2025-11-04";

/// Semantic version number
pub const VERSION_NUMBER: &str = "0.3.0";

/// Build date
pub const BUILD_DATE: &str = "2025-11-04";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "onnx-embeddings",
    "hash-embeddings",
    "worker-pool",
    "order-preserving-batching",
    "request-deadlines",
    "graceful-shutdown",
];

pub fn get_version_info() -> String {
    format!("Fabstir Embed Node {} ({})", VERSION_NUMBER, BUILD_DATE)
}
