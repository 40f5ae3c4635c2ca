// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Item Status
//!
//! Status is orthogonal to `Stage`: an item always has both a current stage
//! and a status describing where it sits within that stage's lifecycle.

use serde::{Deserialize, Serialize};

/// Where an item sits within its current stage's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting to be claimed by a worker for the current stage.
    Pending,
    /// Claimed by a worker; a handler invocation is in flight or has been
    /// dispatched and not yet resolved.
    Claimed,
    /// The current stage produced a `proceed` directive and the item has
    /// moved on (or, at `post_queue`, finished the pipeline entirely).
    Completed,
    /// A handler produced a `reject` directive; terminal, excluded from
    /// further claims.
    Rejected,
    /// Retries were exhausted for the current stage; a `FallbackRecord`
    /// was appended explaining why and the item is parked for operator
    /// attention.
    Failed,
}

impl Status {
    /// Every status, for callers that need to iterate the full set (e.g.
    /// `stats`'s per-stage/status aggregate).
    pub const ORDER: [Status; 5] = [Status::Pending, Status::Claimed, Status::Completed, Status::Rejected, Status::Failed];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Claimed => "claimed",
            Status::Completed => "completed",
            Status::Rejected => "rejected",
            Status::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "pending" => Some(Status::Pending),
            "claimed" => Some(Status::Claimed),
            "completed" => Some(Status::Completed),
            "rejected" => Some(Status::Rejected),
            "failed" => Some(Status::Failed),
            _ => None,
        }
    }

    /// `true` once an item can no longer be claimed for any stage.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Rejected | Status::Failed)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
