// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Item Repository Interface
//!
//! The durable store's contract as seen by the worker pool, the recovery
//! manager, and the control API. Two methods carry the system's
//! atomicity invariants and must be implemented as single transactions:
//!
//! - [`ItemRepository::claim_pending`] — no two workers may claim the
//!   same item for the same stage concurrently.
//! - [`ItemRepository::write_artifact_and_transition`] — the artifact
//!   insert and the item's stage/status update either both happen or
//!   neither does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entities::{EndpointBinding, FallbackRecord, Item, NewItem, PauseFlag, QueueSetting, StageArtifact};
use crate::error::QueueResult;
use crate::value_objects::{Directive, FallbackReason, Stage, Status};

/// One row of the `count_by_stage_and_status` aggregate.
///
/// `avg_retry_count` and `oldest` are `0.0`/`None` when `count` is zero —
/// callers that only need the count can ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageStatusCounts {
    pub stage: Stage,
    pub status: Status,
    pub count: u64,
    pub avg_retry_count: f64,
    pub oldest: Option<DateTime<Utc>>,
}

/// Durable storage for items, their artifact history, and the operator
/// configuration entities that govern how they're processed.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Insert a new item at `Stage::Triage` / `Status::Pending`, keyed by
    /// `new_item.source_id`. Idempotent: if an item with this `source_id`
    /// already exists, it is returned unchanged and no row is inserted —
    /// re-ingesting the same submission is always a no-op.
    async fn ingest_item(&self, new_item: NewItem, now: DateTime<Utc>) -> QueueResult<Item>;

    /// Atomically claim up to `limit` pending items at `stage`, marking
    /// them `Status::Claimed` with `assigned_at = now` and returning the
    /// claimed rows. Items are claimed highest-priority first, oldest
    /// first within a priority tier. An item with `retry_count > 0` is
    /// excluded until `retry_timeout` has elapsed since it was last
    /// updated, giving a failing upstream endpoint room to recover
    /// before the same item is retried against it again.
    async fn claim_pending(&self, stage: Stage, limit: u32, retry_timeout: chrono::Duration, now: DateTime<Utc>) -> QueueResult<Vec<Item>>;

    /// Append a `StageArtifact` for this attempt and apply the item
    /// transition implied by `directive` (advance to the next stage on
    /// `Proceed`, mark `Rejected` on `Reject`, return to `Pending` at the
    /// same stage with `retry_count` incremented on `Retry`) as one
    /// transaction.
    async fn write_artifact_and_transition(
        &self,
        item_id: i64,
        stage: Stage,
        attempt: u32,
        directive: &Directive,
    ) -> QueueResult<Item>;

    /// Reclaim items that have been `Claimed` at `stage` for longer than
    /// `stuck_after`, returning them to `Pending` and incrementing
    /// `retry_count` — a worker that never returned (crash, hang,
    /// network partition) still counts against the item's retry budget,
    /// the same as an explicit or implicit handler retry. Returns the
    /// recovered item ids.
    async fn recover_stuck(&self, stage: Stage, stuck_after: chrono::Duration, now: DateTime<Utc>) -> QueueResult<Vec<i64>>;

    /// Every artifact recorded for `item_id`, oldest first — the full
    /// audit trail used by `history` and by handlers that need prior
    /// stage output.
    async fn read_prior_artifacts(&self, item_id: i64) -> QueueResult<Vec<StageArtifact>>;

    /// Aggregate of items at `stage` with `status` — count, mean
    /// `retry_count`, and the oldest `created_at` among them — for
    /// `stats`/`status`.
    async fn count_by_stage_and_status(&self, stage: Stage, status: Status) -> QueueResult<StageStatusCounts>;

    /// Items at `stage` in `Status::Pending`, most-claimable first.
    async fn list_pending(&self, stage: Option<Stage>, limit: u32) -> QueueResult<Vec<Item>>;

    /// Items in `Status::Rejected`.
    async fn list_rejected(&self, limit: u32) -> QueueResult<Vec<Item>>;

    /// Items in `Status::Failed`, alongside the fallback record that
    /// explains why each landed there.
    async fn list_fallback(&self, limit: u32) -> QueueResult<Vec<(Item, FallbackRecord)>>;

    /// Append a fallback record and move the item to `Status::Failed`,
    /// as one transaction — called by the worker pool once a stage's
    /// retry budget is exhausted.
    async fn append_fallback(&self, item_id: i64, stage: Stage, reason: FallbackReason, detail: String) -> QueueResult<FallbackRecord>;

    /// Insert or replace the binding for `binding.stage`.
    async fn upsert_endpoint(&self, binding: EndpointBinding) -> QueueResult<()>;

    /// The current binding for `stage`, if one has been configured.
    async fn get_endpoint(&self, stage: Stage) -> QueueResult<Option<EndpointBinding>>;

    /// Every configured endpoint binding, used to build a registry
    /// snapshot on startup and on `reload-endpoints`.
    async fn list_endpoints(&self) -> QueueResult<Vec<EndpointBinding>>;

    /// Insert or replace the value for `key`.
    async fn upsert_setting(&self, key: &str, value: &str) -> QueueResult<()>;

    /// The current value for `key`, falling back to
    /// [`crate::entities::queue_setting::default_for`] when unset.
    async fn get_setting(&self, key: &str) -> QueueResult<Option<QueueSetting>>;

    /// Set the pause state for `scope` (a stage identifier or
    /// [`PauseFlag::ALL`]).
    async fn set_pause(&self, scope: &str, paused: bool) -> QueueResult<PauseFlag>;

    /// The current pause state for `scope`, defaulting to not-paused
    /// when no flag has ever been set.
    async fn get_pause(&self, scope: &str) -> QueueResult<PauseFlag>;
}
