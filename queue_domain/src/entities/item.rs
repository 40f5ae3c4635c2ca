// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Item
//!
//! The unit of work flowing through the pipeline: one social-media
//! submission, tracked from ingestion through its terminal outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{Stage, Status};

/// A single submission moving through the content-analysis pipeline.
///
/// `stage` and `status` are orthogonal: `stage` says which pipeline step
/// the item is at, `status` says where it sits in that step's lifecycle.
/// `retry_count` resets to zero whenever `stage` advances and accumulates
/// implicit and explicit retries identically within a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    /// The ingestion collaborator's external identifier; globally unique,
    /// which is what makes re-ingesting the same submission a no-op.
    pub source_id: String,
    pub stage: Stage,
    pub status: Status,
    pub title: String,
    pub author: String,
    pub body: String,
    pub source_url: String,
    /// When the submission was created on the originating platform, as
    /// distinct from `created_at` (when this store first saw it).
    pub source_created_at: DateTime<Utc>,
    pub retry_count: u32,
    /// Caller-supplied metadata; always contains at least `priority`.
    pub metadata: serde_json::Value,
    /// Set when `status == Claimed`; cleared on release.
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// The `priority` carried in `metadata`, defaulting to 5 when absent
    /// or not an integer — mirrors the store's `COALESCE` on this same
    /// field so in-memory and persisted views agree.
    pub fn priority(&self) -> i64 {
        self.metadata.get("priority").and_then(|v| v.as_i64()).unwrap_or(5)
    }

    /// `true` once the item can no longer be claimed for any stage.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal() || (self.stage.is_terminal() && self.status == Status::Completed)
    }
}

/// The fields the external ingestion collaborator supplies for one new
/// submission. Everything pipeline-related (`stage`, `status`,
/// `retry_count`, ...) is assigned by [`crate::repositories::ItemRepository::ingest_item`]
/// itself — the collaborator only ever describes content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub source_id: String,
    pub title: String,
    pub author: String,
    pub body: String,
    pub source_url: String,
    pub source_created_at: DateTime<Utc>,
    /// Defaults to 5 (see spec.md §6) when the collaborator omits one.
    pub priority: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(priority_json: serde_json::Value) -> Item {
        Item {
            id: 1,
            source_id: "abc".to_string(),
            stage: Stage::Triage,
            status: Status::Pending,
            title: "t".to_string(),
            author: "a".to_string(),
            body: "b".to_string(),
            source_url: "https://example.invalid/1".to_string(),
            source_created_at: Utc::now(),
            retry_count: 0,
            metadata: priority_json,
            assigned_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn priority_defaults_to_five_when_absent() {
        assert_eq!(item(serde_json::json!({})).priority(), 5);
    }

    #[test]
    fn priority_reads_the_stored_value() {
        assert_eq!(item(serde_json::json!({"priority": 9})).priority(), 9);
    }
}
