// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Handler Completion Directive
//!
//! Every `StageHandler` invocation ends in exactly one directive. The
//! directive, not the handler's `Result`, is what the worker pool and the
//! durable store act on — an `Ok` handler return with a `retry` directive
//! still increments `retry_count`, and a handler that errors before
//! producing any directive is treated as an implicit retry (see
//! `Directive::implicit_retry`).

use serde::{Deserialize, Serialize};

use crate::value_objects::fallback_reason::FallbackReason;

/// The outcome a stage handler reports for one attempt at one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum Directive {
    /// Advance the item to the next stage (or complete it, at
    /// `post_queue`). Carries the artifact payload to persist for this
    /// stage.
    Proceed { artifact: serde_json::Value },
    /// Terminally reject the item; no further stages run.
    Reject { artifact: serde_json::Value },
    /// Re-attempt the current stage. `retry_count` is incremented; once
    /// it exceeds the stage's configured retry budget, the recovery
    /// manager routes the item to `Status::Failed` instead of
    /// re-queuing it.
    Retry { artifact: serde_json::Value },
}

impl Directive {
    /// The directive applied when a handler invocation fails before
    /// calling `write_result` at all (error, deadline, crash). Implicit
    /// and explicit retries are folded into the same `retry_count`
    /// accounting as `Directive::Retry`, carrying a marker artifact
    /// instead of a handler-produced one.
    pub fn implicit_retry() -> Directive {
        Directive::Retry {
            artifact: serde_json::json!({ "implicit": true }),
        }
    }

    /// An implicit retry that also records why the attempt failed. If
    /// this is the attempt that pushes `retry_count` over the stage's
    /// budget, the worker pool reads the cause back out of this artifact
    /// (see [`FallbackOutcome`] and
    /// `queue_runtime::application::worker_pool::StageWorkerPool::exhaust_retries`)
    /// so the resulting `FallbackRecord` reflects the actual failure
    /// rather than a generic exhaustion.
    pub fn implicit_retry_with_cause(outcome: &FallbackOutcome) -> Directive {
        Directive::Retry {
            artifact: serde_json::json!({
                "implicit": true,
                "reason": outcome.reason.as_str(),
                "detail": outcome.detail,
            }),
        }
    }

    pub fn artifact(&self) -> &serde_json::Value {
        match self {
            Directive::Proceed { artifact } | Directive::Reject { artifact } | Directive::Retry { artifact } => {
                artifact
            }
        }
    }
}

/// What the recovery manager decided to do with an item whose retry
/// budget was exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutcome {
    pub reason: FallbackReason,
    pub detail: String,
}
