// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Recovery & Retry Manager
//!
//! A long-lived loop, structured the same way as
//! [`crate::application::worker_pool::StageWorkerPool::run`], that sweeps
//! every stage on a fixed interval and reclaims claims that have sat
//! longer than the stage's stuck threshold. Retry-budget exhaustion is
//! handled inline by the worker pool at claim time (`exhaust_retries`);
//! this manager's only job is stuck-claim reclamation, which has to
//! happen on a timer rather than at claim time since nothing else
//! touches an item while it's stuck.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use queue_bootstrap::shutdown::CancellationToken;

use queue_domain::entities::queue_setting::keys;
use queue_domain::repositories::ItemRepository;
use queue_domain::value_objects::Stage;

use crate::application::settings::read_u64;
use crate::infrastructure::metrics::MetricsService;

pub struct RecoveryManager {
    repository: Arc<dyn ItemRepository>,
    metrics: Arc<MetricsService>,
    sweep_interval: Duration,
}

impl RecoveryManager {
    pub fn new(repository: Arc<dyn ItemRepository>, metrics: Arc<MetricsService>, sweep_interval: Duration) -> Self {
        Self { repository, metrics, sweep_interval }
    }

    /// Run until `shutdown` fires, sweeping every stage once per
    /// `sweep_interval`.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                info!("recovery manager shutting down");
                return;
            }

            let recovered = sweep_once(self.repository.as_ref(), &self.metrics).await;
            let total: usize = recovered.iter().map(|(_, ids)| ids.len()).sum();
            if total > 0 {
                info!(total, "recovery sweep reclaimed stuck items");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {}
                _ = shutdown.cancelled() => {}
            }
        }
    }
}

/// Reclaim stuck claims for every stage once, returning the ids
/// recovered per stage. Shared by [`RecoveryManager::run`]'s periodic
/// sweep and the `reset-stuck` control operation, which is exactly this
/// same sweep run on demand rather than on a timer.
pub async fn sweep_once(repository: &dyn ItemRepository, metrics: &MetricsService) -> Vec<(Stage, Vec<i64>)> {
    let stuck_after_secs = read_u64(repository, keys::STUCK_THRESHOLD_SECONDS, 1800).await;
    let stuck_after = chrono::Duration::seconds(stuck_after_secs as i64);
    let now = chrono::Utc::now();

    let mut results = Vec::with_capacity(Stage::ORDER.len());
    for stage in Stage::ORDER {
        match repository.recover_stuck(stage, stuck_after, now).await {
            Ok(ids) => {
                if !ids.is_empty() {
                    metrics.record_stuck_recovered(ids.len() as u64);
                }
                results.push((stage, ids));
            }
            Err(e) => {
                warn!(stage = %stage, error = %e, "stuck-claim recovery failed for stage");
                results.push((stage, Vec::new()));
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    use queue_domain::entities::{EndpointBinding, FallbackRecord, Item, NewItem, PauseFlag, QueueSetting, StageArtifact};
    use queue_domain::error::QueueResult;
    use queue_domain::repositories::StageStatusCounts;
    use queue_domain::value_objects::{Directive, FallbackReason, Status};

    #[derive(Default)]
    struct FakeRepository {
        recovered_calls: Mutex<Vec<Stage>>,
    }

    #[async_trait]
    impl ItemRepository for FakeRepository {
        async fn ingest_item(&self, _new_item: NewItem, _now: DateTime<Utc>) -> QueueResult<Item> {
            unimplemented!("not exercised by recovery-manager tests")
        }
        async fn claim_pending(&self, _stage: Stage, _limit: u32, _retry_timeout: chrono::Duration, _now: DateTime<Utc>) -> QueueResult<Vec<Item>> {
            Ok(vec![])
        }
        async fn write_artifact_and_transition(&self, item_id: i64, _stage: Stage, _attempt: u32, _directive: &Directive) -> QueueResult<Item> {
            Err(queue_domain::error::QueueError::ItemNotFound(item_id))
        }
        async fn recover_stuck(&self, stage: Stage, _stuck_after: chrono::Duration, _now: DateTime<Utc>) -> QueueResult<Vec<i64>> {
            self.recovered_calls.lock().unwrap().push(stage);
            if stage == Stage::Triage {
                Ok(vec![1, 2])
            } else {
                Ok(vec![])
            }
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
        async fn upsert_setting(&self, _key: &str, _value: &str) -> QueueResult<()> {
            Ok(())
        }
        async fn get_setting(&self, _key: &str) -> QueueResult<Option<QueueSetting>> {
            Ok(None)
        }
        async fn set_pause(&self, scope: &str, paused: bool) -> QueueResult<PauseFlag> {
            Ok(PauseFlag { scope: scope.to_string(), paused, updated_at: Utc::now() })
        }
        async fn get_pause(&self, scope: &str) -> QueueResult<PauseFlag> {
            Ok(PauseFlag { scope: scope.to_string(), paused: false, updated_at: Utc::now() })
        }
    }

    #[tokio::test]
    async fn sweep_once_visits_every_stage_and_aggregates_recovered_ids() {
        let repo = FakeRepository::default();
        let metrics = MetricsService::new().unwrap();

        let results = sweep_once(&repo, &metrics).await;

        assert_eq!(results.len(), Stage::ORDER.len());
        assert_eq!(repo.recovered_calls.lock().unwrap().len(), Stage::ORDER.len());
        let triage_recovered = results.iter().find(|(stage, _)| *stage == Stage::Triage).unwrap();
        assert_eq!(triage_recovered.1, vec![1, 2]);
    }
}
