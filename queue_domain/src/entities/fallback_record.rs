// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fallback Record
//!
//! Appended by the Recovery & Retry Manager whenever a stage's retry
//! budget is exhausted for an item. One record per exhaustion event; an
//! item that fails, is manually reset, and exhausts again gets a second
//! record rather than an updated one, preserving the full history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{FallbackReason, Stage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRecord {
    pub id: i64,
    pub item_id: i64,
    pub stage: Stage,
    pub reason: FallbackReason,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}
