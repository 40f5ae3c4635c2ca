// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pause Flag
//!
//! Per-stage (or whole-queue, via [`PauseFlag::ALL`]) operator pause
//! state. A paused stage's worker loop keeps running but claims nothing
//! until resumed — in-flight attempts are left to finish.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseFlag {
    /// The stage this flag applies to, or [`PauseFlag::ALL`] for a
    /// queue-wide pause.
    pub scope: String,
    pub paused: bool,
    pub updated_at: DateTime<Utc>,
}

impl PauseFlag {
    /// Scope key for a queue-wide pause, as distinct from any single
    /// stage's identifier.
    pub const ALL: &'static str = ALL;
}

/// Scope key for a queue-wide pause, as distinct from any single stage's
/// identifier. Free-standing alongside [`PauseFlag::ALL`] so callers can
/// import either `PauseFlag::ALL` or `pause_flag::ALL`.
pub const ALL: &'static str = "__all__";
