// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Control & Observability API
//!
//! The operator surface: pause/resume, status/stats queries, the
//! rejected/fallback/pending listings, item history, and the
//! setting/endpoint mutation operations. `queue-bootstrap`'s CLI
//! subcommands are thin wrappers that call straight into this type —
//! there is no HTTP layer between the two, matching the teacher's own
//! CLI-driven operator surface rather than standing up a web framework
//! this workspace has no other use for.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use queue_domain::entities::{pause_flag::ALL as PAUSE_ALL, EndpointBinding, FallbackRecord, Item, PauseFlag, StageArtifact};
use queue_domain::entities::queue_setting::default_for;
use queue_domain::error::{QueueError, QueueResult};
use queue_domain::repositories::{ItemRepository, StageStatusCounts};
use queue_domain::value_objects::{Stage, Status};

use crate::application::recovery;
use crate::infrastructure::endpoint_registry::EndpointRegistry;
use crate::infrastructure::llm_client::RemoteEndpointHandler;
use crate::infrastructure::metrics::MetricsService;

/// Pending/claimed depth and pause state for one stage, as reported by
/// [`ControlApi::status`].
#[derive(Debug, Clone, Serialize)]
pub struct StageStatus {
    pub stage: Stage,
    pub paused: bool,
    pub pending: u64,
    pub claimed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// The queue-wide pause flag; when set, every stage is paused
    /// regardless of its own flag.
    pub queue_paused: bool,
    pub stages: Vec<StageStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Count, mean `retry_count`, and oldest `created_at` for every
    /// `(stage, status)` pair — the full aggregate an operator can slice
    /// however they need.
    pub by_stage_and_status: Vec<StageStatusCounts>,
    pub completed: u64,
    pub rejected: u64,
    pub fallback: u64,
    /// Prometheus text exposition of every counter/gauge/histogram this
    /// process has recorded since startup.
    pub metrics_text: String,
}

/// Orchestrates the durable store, the endpoint registry, and the
/// metrics service behind one call surface. Cheap to construct per
/// request shape — every method borrows shared `Arc`s, nothing here is
/// exclusive state.
pub struct ControlApi {
    repository: Arc<dyn ItemRepository>,
    registry: Arc<EndpointRegistry>,
    metrics: Arc<MetricsService>,
    handlers: HashMap<Stage, Arc<RemoteEndpointHandler>>,
}

impl ControlApi {
    pub fn new(
        repository: Arc<dyn ItemRepository>,
        registry: Arc<EndpointRegistry>,
        metrics: Arc<MetricsService>,
        handlers: HashMap<Stage, Arc<RemoteEndpointHandler>>,
    ) -> Self {
        Self { repository, registry, metrics, handlers }
    }

    /// Pause `stage`, or the whole queue when `stage` is `None`.
    pub async fn pause(&self, stage: Option<Stage>) -> QueueResult<PauseFlag> {
        let scope = stage.map(|s| s.as_str().to_string()).unwrap_or_else(|| PAUSE_ALL.to_string());
        self.repository.set_pause(&scope, true).await
    }

    /// Resume `stage`, or the whole queue when `stage` is `None`.
    pub async fn resume(&self, stage: Option<Stage>) -> QueueResult<PauseFlag> {
        let scope = stage.map(|s| s.as_str().to_string()).unwrap_or_else(|| PAUSE_ALL.to_string());
        self.repository.set_pause(&scope, false).await
    }

    /// Pending/claimed depth and pause state for every stage.
    pub async fn status(&self) -> QueueResult<StatusReport> {
        let queue_paused = self.repository.get_pause(PAUSE_ALL).await?.paused;

        let mut stages = Vec::with_capacity(Stage::ORDER.len());
        for stage in Stage::ORDER {
            let paused = queue_paused || self.repository.get_pause(stage.as_str()).await?.paused;
            let pending = self.repository.count_by_stage_and_status(stage, Status::Pending).await?.count;
            let claimed = self.repository.count_by_stage_and_status(stage, Status::Claimed).await?.count;
            stages.push(StageStatus { stage, paused, pending, claimed });
        }

        Ok(StatusReport { queue_paused, stages })
    }

    /// The full per-`(stage, status)` aggregate, terminal-outcome totals
    /// rolled up across stages, and a Prometheus text dump of every
    /// metric recorded this process.
    pub async fn stats(&self) -> QueueResult<StatsReport> {
        let mut by_stage_and_status = Vec::with_capacity(Stage::ORDER.len() * Status::ORDER.len());
        let mut completed = 0u64;
        let mut rejected = 0u64;
        let mut fallback = 0u64;

        for stage in Stage::ORDER {
            for status in Status::ORDER {
                let counts = self.repository.count_by_stage_and_status(stage, status).await?;
                match status {
                    Status::Completed => completed += counts.count,
                    Status::Rejected => rejected += counts.count,
                    Status::Failed => fallback += counts.count,
                    Status::Pending | Status::Claimed => {}
                }
                by_stage_and_status.push(counts);
            }
        }

        let metrics_text = self.metrics.get_metrics()?;
        Ok(StatsReport { by_stage_and_status, completed, rejected, fallback, metrics_text })
    }

    /// Ingest one submission, idempotent on `new_item.source_id`.
    pub async fn ingest(&self, new_item: queue_domain::entities::NewItem) -> QueueResult<Item> {
        self.repository.ingest_item(new_item, chrono::Utc::now()).await
    }

    pub async fn list_pending(&self, stage: Option<Stage>, limit: u32) -> QueueResult<Vec<Item>> {
        self.repository.list_pending(stage, limit).await
    }

    pub async fn list_rejected(&self, limit: u32) -> QueueResult<Vec<Item>> {
        self.repository.list_rejected(limit).await
    }

    pub async fn list_fallback(&self, limit: u32) -> QueueResult<Vec<(Item, FallbackRecord)>> {
        self.repository.list_fallback(limit).await
    }

    /// Every attempt recorded for `item_id`, oldest first.
    pub async fn history(&self, item_id: i64) -> QueueResult<Vec<StageArtifact>> {
        self.repository.read_prior_artifacts(item_id).await
    }

    /// Update a setting. Rejects keys outside the recognized set
    /// (`queue_domain::entities::queue_setting::keys`) rather than
    /// silently persisting an operator typo.
    pub async fn set_setting(&self, key: &str, value: &str) -> QueueResult<()> {
        if default_for(key).is_none() {
            return Err(QueueError::UnknownKey(key.to_string()));
        }
        self.repository.upsert_setting(key, value).await
    }

    /// Persist a new endpoint binding and push the change out to every
    /// worker through the registry's reload signal.
    pub async fn set_endpoint(&self, binding: EndpointBinding) -> QueueResult<()> {
        self.registry.rebind(binding).await
    }

    /// `GET /v1/models` against the stage's currently bound endpoint, so
    /// an operator can check reachability without waiting for a claim.
    pub async fn probe_endpoint(&self, stage: Stage) -> QueueResult<Vec<String>> {
        match self.handlers.get(&stage) {
            Some(handler) => handler.probe().await,
            None => Err(queue_domain::error::QueueError::EndpointNotBound(stage.to_string())),
        }
    }

    /// Items currently claimed per stage. Not every claimed item is
    /// stuck — only those older than the stuck threshold are — so this
    /// is an upper bound on what `reset-stuck` would reclaim right now.
    pub async fn stuck_report(&self) -> QueueResult<Vec<(Stage, u64)>> {
        let mut report = Vec::with_capacity(Stage::ORDER.len());
        for stage in Stage::ORDER {
            let claimed = self.repository.count_by_stage_and_status(stage, Status::Claimed).await?.count;
            report.push((stage, claimed));
        }
        Ok(report)
    }

    /// Reclaim every stuck claim across every stage right now, rather
    /// than waiting for the recovery manager's next scheduled sweep.
    pub async fn reset_stuck(&self) -> Vec<(Stage, Vec<i64>)> {
        recovery::sweep_once(self.repository.as_ref(), &self.metrics).await
    }

    /// Re-read every endpoint binding from the store, discarding the
    /// in-memory view — for bindings changed out-of-band.
    pub async fn reload_endpoints(&self) -> QueueResult<()> {
        self.registry.reload().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    use queue_domain::entities::{NewItem, QueueSetting};
    use queue_domain::error::QueueError;
    use queue_domain::value_objects::{Directive, FallbackReason};

    #[derive(Default)]
    struct FakeRepository {
        pause_flags: Mutex<HashMap<String, bool>>,
        settings: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl ItemRepository for FakeRepository {
        async fn ingest_item(&self, _new_item: NewItem, _now: DateTime<Utc>) -> QueueResult<Item> {
            unimplemented!("not exercised by control-api tests")
        }
        async fn claim_pending(&self, _stage: Stage, _limit: u32, _retry_timeout: chrono::Duration, _now: DateTime<Utc>) -> QueueResult<Vec<Item>> {
            Ok(vec![])
        }
        async fn write_artifact_and_transition(&self, item_id: i64, _stage: Stage, _attempt: u32, _directive: &Directive) -> QueueResult<Item> {
            Err(QueueError::ItemNotFound(item_id))
        }
        async fn recover_stuck(&self, _stage: Stage, _stuck_after: chrono::Duration, _now: DateTime<Utc>) -> QueueResult<Vec<i64>> {
            Ok(vec![])
        }
        async fn read_prior_artifacts(&self, _item_id: i64) -> QueueResult<Vec<StageArtifact>> {
            Ok(vec![])
        }
        async fn count_by_stage_and_status(&self, stage: Stage, status: Status) -> QueueResult<StageStatusCounts> {
            Ok(StageStatusCounts { stage, status, count: 0, avg_retry_count: 0.0, oldest: None })
        }
        async fn list_pending(&self, _stage: Option<Stage>, _limit: u32) -> QueueResult<Vec<Item>> {
            Ok(vec![])
        }
        async fn list_rejected(&self, _limit: u32) -> QueueResult<Vec<Item>> {
            Ok(vec![])
        }
        async fn list_fallback(&self, _limit: u32) -> QueueResult<Vec<(Item, FallbackRecord)>> {
            Ok(vec![])
        }
        async fn append_fallback(&self, item_id: i64, stage: Stage, reason: FallbackReason, detail: String) -> QueueResult<FallbackRecord> {
            Ok(FallbackRecord { id: 1, item_id, stage, reason, detail, created_at: Utc::now() })
        }
        async fn upsert_endpoint(&self, _binding: EndpointBinding) -> QueueResult<()> {
            Ok(())
        }
        async fn get_endpoint(&self, _stage: Stage) -> QueueResult<Option<EndpointBinding>> {
            Ok(None)
        }
        async fn list_endpoints(&self) -> QueueResult<Vec<EndpointBinding>> {
            Ok(vec![])
        }
        async fn upsert_setting(&self, key: &str, value: &str) -> QueueResult<()> {
            self.settings.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }
        async fn get_setting(&self, key: &str) -> QueueResult<Option<QueueSetting>> {
            Ok(self
                .settings
                .lock()
                .unwrap()
                .get(key)
                .map(|v| QueueSetting { key: key.to_string(), value: v.clone(), updated_at: Utc::now() }))
        }
        async fn set_pause(&self, scope: &str, paused: bool) -> QueueResult<PauseFlag> {
            self.pause_flags.lock().unwrap().insert(scope.to_string(), paused);
            Ok(PauseFlag { scope: scope.to_string(), paused, updated_at: Utc::now() })
        }
        async fn get_pause(&self, scope: &str) -> QueueResult<PauseFlag> {
            let paused = self.pause_flags.lock().unwrap().get(scope).copied().unwrap_or(false);
            Ok(PauseFlag { scope: scope.to_string(), paused, updated_at: Utc::now() })
        }
    }

    async fn control_api(repo: Arc<FakeRepository>) -> ControlApi {
        let registry = Arc::new(EndpointRegistry::load(repo.clone()).await.unwrap());
        let metrics = Arc::new(MetricsService::new().unwrap());
        ControlApi::new(repo, registry, metrics, HashMap::new())
    }

    #[tokio::test]
    async fn pause_with_no_stage_sets_the_queue_wide_flag() {
        let repo = Arc::new(FakeRepository::default());
        let api = control_api(repo.clone()).await;

        api.pause(None).await.unwrap();
        assert!(repo.get_pause(PAUSE_ALL).await.unwrap().paused);
    }

    #[tokio::test]
    async fn pause_with_a_stage_only_affects_that_stage() {
        let repo = Arc::new(FakeRepository::default());
        let api = control_api(repo.clone()).await;

        api.pause(Some(Stage::Triage)).await.unwrap();
        assert!(repo.get_pause(Stage::Triage.as_str()).await.unwrap().paused);
        assert!(!repo.get_pause(PAUSE_ALL).await.unwrap().paused);
    }

    #[tokio::test]
    async fn probe_endpoint_rejects_an_unbound_stage() {
        let repo = Arc::new(FakeRepository::default());
        let api = control_api(repo).await;

        let result = api.probe_endpoint(Stage::Triage).await;
        assert!(matches!(result, Err(QueueError::EndpointNotBound(_))));
    }

    #[tokio::test]
    async fn status_reports_the_queue_wide_pause_as_paused_on_every_stage() {
        let repo = Arc::new(FakeRepository::default());
        let api = control_api(repo).await;

        api.pause(None).await.unwrap();
        let report = api.status().await.unwrap();

        assert!(report.queue_paused);
        assert!(report.stages.iter().all(|s| s.paused));
    }

    #[tokio::test]
    async fn set_setting_accepts_a_recognized_key() {
        let repo = Arc::new(FakeRepository::default());
        let api = control_api(repo.clone()).await;

        api.set_setting("max_retries", "5").await.unwrap();
        assert_eq!(repo.settings.lock().unwrap().get("max_retries").map(String::as_str), Some("5"));
    }

    #[tokio::test]
    async fn set_setting_rejects_an_unrecognized_key() {
        let repo = Arc::new(FakeRepository::default());
        let api = control_api(repo.clone()).await;

        let result = api.set_setting("not_a_real_setting", "5").await;
        assert!(matches!(result, Err(QueueError::UnknownKey(_))));
        assert!(repo.settings.lock().unwrap().is_empty());
    }
}
