// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Tool Surface
//!
//! The two tools a remote endpoint can call back into during a stage
//! attempt. A fresh `ToolSurface` is constructed per `(item, attempt)` —
//! never shared across attempts — so `write_result`'s at-most-once
//! enforcement is naturally scoped to a single invocation.

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::value_objects::Directive;

/// Tool calls available to the endpoint bound to the current stage.
#[async_trait]
pub trait ToolSurface: Send + Sync {
    /// Record the handler's decision for this attempt. May be called at
    /// most once per attempt; a second call returns
    /// [`crate::error::QueueError::ToolRejected`].
    async fn write_result(&self, directive: Directive) -> QueueResult<()>;

    /// Perform a web search and return the raw result payload. Subject
    /// to a process-wide rate limit; returns
    /// [`crate::error::QueueError::ToolRateLimited`] when exhausted.
    async fn web_search(&self, query: &str) -> QueueResult<serde_json::Value>;
}
