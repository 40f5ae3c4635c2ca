// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Taxonomy
//!
//! `QueueError` is the single error type returned by every domain port
//! (`ItemRepository`, `StageHandler`, `ToolSurface`). Infrastructure
//! implementations translate their own error types (`sqlx::Error`,
//! `reqwest::Error`, ...) into a `QueueError` variant at the boundary; the
//! domain layer never sees a foreign error type.

use thiserror::Error;

/// Errors that can occur while orchestrating an item through the pipeline.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The durable store could not be reached or a query failed.
    #[error("store error: {0}")]
    Store(String),

    /// An item could not be found for the given identifier.
    #[error("item {0} not found")]
    ItemNotFound(i64),

    /// No endpoint binding exists for the requested stage.
    #[error("no endpoint bound for stage {0}")]
    EndpointNotBound(String),

    /// The configured endpoint is unreachable (connection refused, DNS
    /// failure, TLS handshake failure).
    #[error("endpoint unreachable: {0}")]
    EndpointUnreachable(String),

    /// The handler did not produce a terminal directive before its deadline.
    #[error("handler deadline exceeded after {0:?}")]
    DeadlineExceeded(std::time::Duration),

    /// The endpoint responded with a 5xx status.
    #[error("endpoint returned server error: {0}")]
    EndpointServerError(String),

    /// The endpoint's response did not conform to the expected wire
    /// protocol (malformed JSON, missing required fields, unknown tool
    /// name).
    #[error("model protocol error: {0}")]
    ModelProtocolError(String),

    /// A tool call was rejected because it would violate a domain
    /// invariant (e.g. `write_result` called twice in one attempt).
    #[error("tool call rejected: {0}")]
    ToolRejected(String),

    /// The `web_search` tool's per-process rate limit was exhausted for
    /// this call.
    #[error("tool rate limited: {0}")]
    ToolRateLimited(String),

    /// A handler or tool call exceeded its configured timeout.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// A requested setting or endpoint key does not exist and has no
    /// built-in default.
    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    /// The caller supplied a value that fails domain-level validation
    /// (negative concurrency cap, empty URL, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization or deserialization of a JSON payload failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for infrastructure failures that don't fit a more
    /// specific variant; infrastructure should prefer a specific variant
    /// where one exists.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the domain layer.
pub type QueueResult<T> = Result<T, QueueError>;
