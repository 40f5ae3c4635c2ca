// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Artifact
//!
//! The append-only audit trail of every attempt an item makes at a stage.
//! Artifacts are never updated or deleted — each attempt, successful or
//! not, appends a new row, which is what lets `history` reconstruct an
//! item's full path through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{Directive, FallbackOutcome, FallbackReason, Stage};

/// One recorded attempt at one stage for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageArtifact {
    pub id: i64,
    pub item_id: i64,
    pub stage: Stage,
    /// The attempt number within this stage, starting at 1.
    pub attempt: u32,
    /// Opaque handler-defined payload carried by the directive.
    pub payload: serde_json::Value,
    /// The directive this attempt resolved to, stored as its tag so a
    /// later reader can distinguish `proceed`/`reject`/`retry` without
    /// deserializing the full directive.
    pub directive: String,
    pub created_at: DateTime<Utc>,
}

impl StageArtifact {
    /// Build the artifact row for one resolved handler directive, ready
    /// to append alongside the item's stage/status transition.
    pub fn from_directive(item_id: i64, stage: Stage, attempt: u32, directive: &Directive) -> StageArtifact {
        let tag = match directive {
            Directive::Proceed { .. } => "proceed",
            Directive::Reject { .. } => "reject",
            Directive::Retry { .. } => "retry",
        };
        StageArtifact {
            id: 0,
            item_id,
            stage,
            attempt,
            payload: directive.artifact().clone(),
            directive: tag.to_string(),
            created_at: Utc::now(),
        }
    }

    /// The cause recorded by [`Directive::implicit_retry_with_cause`], if
    /// this is a `retry` artifact carrying one. `None` for a `proceed`/
    /// `reject` artifact, a plain [`Directive::implicit_retry`] marker, or
    /// an explicit handler-produced retry that didn't set a cause.
    pub fn retry_cause(&self) -> Option<FallbackOutcome> {
        if self.directive != "retry" {
            return None;
        }
        let reason = FallbackReason::parse(self.payload.get("reason")?.as_str()?)?;
        let detail = self.payload.get("detail")?.as_str()?.to_string();
        Some(FallbackOutcome { reason, detail })
    }
}
