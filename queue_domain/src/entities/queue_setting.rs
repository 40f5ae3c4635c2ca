// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Queue Setting
//!
//! A single operator-tunable key/value pair (retry budgets, stuck-item
//! thresholds, handler deadlines, tool-call caps). Stored as text so new
//! settings never require a schema migration; callers parse the value
//! into the type they expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSetting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Well-known setting keys with built-in defaults, used when no row
/// exists yet for the key.
pub mod keys {
    pub const MAX_RETRIES: &str = "max_retries";
    pub const STUCK_THRESHOLD_SECONDS: &str = "stuck_threshold_seconds";
    pub const HANDLER_DEADLINE_SECONDS: &str = "handler_deadline_seconds";
    pub const TOOL_CALL_CAP: &str = "tool_call_cap";
    pub const WEB_SEARCH_RATE_PER_MINUTE: &str = "web_search_rate_per_minute";
    /// Minimum time a retried item waits before it is eligible to be
    /// claimed again, counted from its last update.
    pub const RETRY_TIMEOUT_SECONDS: &str = "retry_timeout_seconds";
}

/// The default value for a well-known setting key, used when the store
/// has no row for it yet.
pub fn default_for(key: &str) -> Option<&'static str> {
    match key {
        keys::MAX_RETRIES => Some("3"),
        keys::STUCK_THRESHOLD_SECONDS => Some("1800"),
        keys::HANDLER_DEADLINE_SECONDS => Some("60"),
        keys::TOOL_CALL_CAP => Some("8"),
        keys::WEB_SEARCH_RATE_PER_MINUTE => Some("30"),
        keys::RETRY_TIMEOUT_SECONDS => Some("300"),
        _ => None,
    }
}
