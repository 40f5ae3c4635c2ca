// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Worker Pool
//!
//! One long-lived loop per stage. Each iteration snapshots the pause
//! flag and the current endpoint binding, claims as many items as there
//! are free concurrency slots, and spawns one bounded task per claimed
//! item. The loop never blocks on another stage's progress — everything
//! it needs to know is either in the store or in the endpoint registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use queue_bootstrap::shutdown::CancellationToken;

use queue_domain::entities::{pause_flag::ALL as PAUSE_ALL, queue_setting::keys, Item};
use queue_domain::repositories::ItemRepository;
use queue_domain::services::stage_handler::{StageHandler, StageInput};
use queue_domain::value_objects::{Directive, FallbackOutcome, FallbackReason, Stage};

use crate::application::settings::read_u64;
use crate::infrastructure::endpoint_registry::EndpointRegistry;
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::tools::{RemoteToolSurface, WebSearchLimiter};

/// Deadline grace added on top of an endpoint binding's configured
/// timeout before the worker forcibly abandons a handler invocation.
const DEADLINE_GRACE: Duration = Duration::from_secs(5);

pub struct StageWorkerPool {
    stage: Stage,
    repository: Arc<dyn ItemRepository>,
    handler: Arc<dyn StageHandler>,
    registry: Arc<EndpointRegistry>,
    metrics: Arc<MetricsService>,
    limiter: Arc<WebSearchLimiter>,
    search_url: String,
    search_api_key_env: String,
    poll_interval: Duration,
    claim_batch_size: u32,
    in_flight: Arc<AtomicUsize>,
}

impl StageWorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stage: Stage,
        repository: Arc<dyn ItemRepository>,
        handler: Arc<dyn StageHandler>,
        registry: Arc<EndpointRegistry>,
        metrics: Arc<MetricsService>,
        limiter: Arc<WebSearchLimiter>,
        search_url: String,
        search_api_key_env: String,
        poll_interval: Duration,
        claim_batch_size: u32,
    ) -> Self {
        Self {
            stage,
            repository,
            handler,
            registry,
            metrics,
            limiter,
            search_url,
            search_api_key_env,
            poll_interval,
            claim_batch_size,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run until `shutdown` fires. Does not itself wait for in-flight
    /// handlers to drain — that's the caller's job, tracked through the
    /// same `ShutdownCoordinator` every other long-lived task uses.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut current_cap = self.registry.current(self.stage).map(|b| b.concurrency_cap).unwrap_or(0);
        let mut semaphore = Arc::new(Semaphore::new(current_cap.max(1) as usize));
        let mut reload_rx = self.registry.subscribe();

        loop {
            if shutdown.is_cancelled() {
                info!(stage = %self.stage, "worker loop shutting down");
                return;
            }

            if reload_rx.has_changed().unwrap_or(false) {
                reload_rx.borrow_and_update();
                let new_cap = self.registry.current(self.stage).map(|b| b.concurrency_cap).unwrap_or(0);
                if new_cap != current_cap {
                    current_cap = new_cap;
                    semaphore = Arc::new(Semaphore::new(current_cap.max(1) as usize));
                }
            }

            if self.is_paused().await {
                self.sleep_or_shutdown(&shutdown).await;
                continue;
            }

            let Some(binding) = self.registry.current(self.stage) else {
                self.sleep_or_shutdown(&shutdown).await;
                continue;
            };

            let available = semaphore.available_permits();
            if available == 0 {
                self.sleep_or_shutdown(&shutdown).await;
                continue;
            }

            let claim_limit = self.claim_batch_size.min(available as u32).max(1);
            let retry_timeout_secs = read_u64(self.repository.as_ref(), keys::RETRY_TIMEOUT_SECONDS, 300).await;
            let retry_timeout = chrono::Duration::seconds(retry_timeout_secs as i64);
            let claimed = match self.repository.claim_pending(self.stage, claim_limit, retry_timeout, chrono::Utc::now()).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(stage = %self.stage, error = %e, "claim failed, treating as empty batch");
                    self.sleep_or_shutdown(&shutdown).await;
                    continue;
                }
            };

            if !claimed.is_empty() {
                self.metrics.record_claimed(claimed.len() as u64);
            }

            let max_retries = read_u64(self.repository.as_ref(), keys::MAX_RETRIES, 3).await;
            let deadline = binding.timeout + DEADLINE_GRACE;

            for item in claimed {
                if item.retry_count as u64 >= max_retries {
                    self.exhaust_retries(&item).await;
                    continue;
                }

                let permit = match Arc::clone(&semaphore).try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => continue,
                };

                let repository = Arc::clone(&self.repository);
                let handler = Arc::clone(&self.handler);
                let metrics = Arc::clone(&self.metrics);
                let limiter = Arc::clone(&self.limiter);
                let search_url = self.search_url.clone();
                let search_api_key_env = self.search_api_key_env.clone();
                let stage = self.stage;
                let in_flight = Arc::clone(&self.in_flight);

                in_flight.fetch_add(1, Ordering::SeqCst);
                metrics.handler_started();
                tokio::spawn(async move {
                    let _permit = permit;
                    run_attempt(repository, handler, Arc::clone(&metrics), limiter, search_url, search_api_key_env, stage, item, deadline).await;
                    metrics.handler_finished();
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                });
            }

            self.sleep_or_shutdown(&shutdown).await;
        }
    }

    async fn is_paused(&self) -> bool {
        let all_paused = self.repository.get_pause(PAUSE_ALL).await.map(|f| f.paused).unwrap_or(true);
        if all_paused {
            return true;
        }
        self.repository.get_pause(self.stage.as_str()).await.map(|f| f.paused).unwrap_or(true)
    }

    async fn exhaust_retries(&self, item: &Item) {
        let FallbackOutcome { reason, detail } = self.last_retry_cause(item.id).await.unwrap_or_else(|| FallbackOutcome {
            reason: FallbackReason::RetryExhausted,
            detail: format!("retry_count {} exceeded budget before stage {}", item.retry_count, self.stage),
        });

        if let Err(e) = self.repository.append_fallback(item.id, self.stage, reason, detail).await {
            error!(item_id = item.id, stage = %self.stage, error = %e, "failed to record retry exhaustion");
            return;
        }
        self.metrics.record_fallback(reason.as_str());
    }

    /// The cause of the most recent implicit retry at this stage, if the
    /// artifact trail carries one — lets a fallback record reflect the
    /// failure that actually exhausted the budget (`endpoint_5xx`,
    /// `deadline_exceeded`, ...) instead of a generic exhaustion.
    async fn last_retry_cause(&self, item_id: i64) -> Option<FallbackOutcome> {
        let artifacts = self.repository.read_prior_artifacts(item_id).await.ok()?;
        artifacts.iter().rev().find(|artifact| artifact.stage == self.stage).and_then(|artifact| artifact.retry_cause())
    }

    async fn sleep_or_shutdown(&self, shutdown: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {}
            _ = shutdown.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    use queue_domain::entities::{EndpointBinding, FallbackRecord, Item, NewItem, PauseFlag, QueueSetting, StageArtifact};
    use queue_domain::error::{QueueError, QueueResult};
    use queue_domain::repositories::StageStatusCounts;
    use queue_domain::value_objects::{FallbackReason, Status};

    #[derive(Default)]
    struct FakeRepository {
        pause_flags: Mutex<HashMap<String, bool>>,
        fallbacks: Mutex<Vec<FallbackRecord>>,
        artifacts: Mutex<Vec<StageArtifact>>,
    }

    #[async_trait]
    impl ItemRepository for FakeRepository {
        async fn ingest_item(&self, _new_item: NewItem, _now: DateTime<Utc>) -> QueueResult<Item> {
            unimplemented!("not exercised by worker-pool tests")
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
        async fn read_prior_artifacts(&self, item_id: i64) -> QueueResult<Vec<StageArtifact>> {
            Ok(self.artifacts.lock().unwrap().iter().filter(|a| a.item_id == item_id).cloned().collect())
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
            let record = FallbackRecord { id: 1, item_id, stage, reason, detail, created_at: Utc::now() };
            self.fallbacks.lock().unwrap().push(record.clone());
            Ok(record)
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
            self.pause_flags.lock().unwrap().insert(scope.to_string(), paused);
            Ok(PauseFlag { scope: scope.to_string(), paused, updated_at: Utc::now() })
        }
        async fn get_pause(&self, scope: &str) -> QueueResult<PauseFlag> {
            let paused = self.pause_flags.lock().unwrap().get(scope).copied().unwrap_or(false);
            Ok(PauseFlag { scope: scope.to_string(), paused, updated_at: Utc::now() })
        }
    }

    fn fake_item(id: i64, retry_count: u32) -> Item {
        Item {
            id,
            source_id: format!("src-{id}"),
            stage: Stage::Triage,
            status: Status::Pending,
            title: "title".to_string(),
            author: "author".to_string(),
            body: "body".to_string(),
            source_url: "https://example.invalid".to_string(),
            source_created_at: Utc::now(),
            retry_count,
            metadata: serde_json::json!({}),
            assigned_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn pool(repository: Arc<FakeRepository>) -> StageWorkerPool {
        let registry = EndpointRegistry::load(Arc::clone(&repository) as Arc<dyn ItemRepository>).await.unwrap();
        StageWorkerPool::new(
            Stage::Triage,
            repository as Arc<dyn ItemRepository>,
            Arc::new(NeverCalledHandler),
            Arc::new(registry),
            Arc::new(MetricsService::new().unwrap()),
            WebSearchLimiter::spawn(60),
            "https://search.example.invalid".to_string(),
            "SEARCH_API_KEY".to_string(),
            Duration::from_secs(5),
            10,
        )
    }

    struct NeverCalledHandler;

    #[async_trait]
    impl StageHandler for NeverCalledHandler {
        async fn handle(&self, _input: StageInput<'_>, _tools: &dyn queue_domain::services::tool_surface::ToolSurface) -> QueueResult<Directive> {
            unimplemented!("no claims are produced by these fakes, so the handler is never invoked")
        }
    }

    #[tokio::test]
    async fn queue_wide_pause_overrides_an_unpaused_stage_flag() {
        let repo = Arc::new(FakeRepository::default());
        repo.set_pause(PAUSE_ALL, true).await.unwrap();
        let worker = pool(repo).await;

        assert!(worker.is_paused().await);
    }

    #[tokio::test]
    async fn stage_pause_alone_pauses_without_the_queue_wide_flag() {
        let repo = Arc::new(FakeRepository::default());
        repo.set_pause(Stage::Triage.as_str(), true).await.unwrap();
        let worker = pool(repo).await;

        assert!(worker.is_paused().await);
    }

    #[tokio::test]
    async fn unpaused_stage_with_unpaused_queue_is_not_paused() {
        let repo = Arc::new(FakeRepository::default());
        let worker = pool(repo).await;

        assert!(!worker.is_paused().await);
    }

    #[tokio::test]
    async fn exhausting_retries_appends_a_fallback_record() {
        let repo = Arc::new(FakeRepository::default());
        let worker = pool(Arc::clone(&repo)).await;
        let item = fake_item(7, 5);

        worker.exhaust_retries(&item).await;

        let fallbacks = repo.fallbacks.lock().unwrap();
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].item_id, 7);
        assert_eq!(fallbacks[0].reason, FallbackReason::RetryExhausted, "no cause to draw on falls back to a generic exhaustion reason");
    }

    #[tokio::test]
    async fn exhausting_retries_carries_the_last_attempt_s_actual_failure_cause() {
        let repo = Arc::new(FakeRepository::default());
        let cause = FallbackOutcome { reason: FallbackReason::Endpoint5xx, detail: "endpoint returned server error: 503".to_string() };
        let directive = Directive::implicit_retry_with_cause(&cause);
        repo.artifacts.lock().unwrap().push(StageArtifact::from_directive(7, Stage::Triage, 5, &directive));
        let worker = pool(Arc::clone(&repo)).await;
        let item = fake_item(7, 5);

        worker.exhaust_retries(&item).await;

        let fallbacks = repo.fallbacks.lock().unwrap();
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].reason, FallbackReason::Endpoint5xx);
        assert_eq!(fallbacks[0].detail, "endpoint returned server error: 503");
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_attempt(
    repository: Arc<dyn ItemRepository>,
    handler: Arc<dyn StageHandler>,
    metrics: Arc<MetricsService>,
    limiter: Arc<WebSearchLimiter>,
    search_url: String,
    search_api_key_env: String,
    stage: Stage,
    item: Item,
    deadline: Duration,
) {
    let started = std::time::Instant::now();
    let attempt = item.retry_count + 1;

    let prior_artifacts = match repository.read_prior_artifacts(item.id).await {
        Ok(artifacts) => artifacts,
        Err(e) => {
            warn!(item_id = item.id, stage = %stage, error = %e, "failed to load prior artifacts, retrying");
            let _ = repository.write_artifact_and_transition(item.id, stage, attempt, &Directive::implicit_retry()).await;
            metrics.record_retry();
            return;
        }
    };

    let tools = RemoteToolSurface::new(Arc::clone(&repository), item.id, stage, attempt, limiter, search_url, search_api_key_env);
    let input = StageInput { item: &item, attempt, prior_artifacts: &prior_artifacts };

    let outcome = tokio::time::timeout(deadline, handler.handle(input, &tools)).await;
    metrics.record_handler_duration(started.elapsed());

    match outcome {
        Ok(Ok(_directive)) => {
            metrics.record_completed();
        }
        Ok(Err(e)) => {
            warn!(item_id = item.id, stage = %stage, error = %e, "handler failed before deciding, implicit retry");
            let cause = FallbackOutcome { reason: FallbackReason::from_error(&e), detail: e.to_string() };
            let directive = Directive::implicit_retry_with_cause(&cause);
            if let Err(write_err) = repository.write_artifact_and_transition(item.id, stage, attempt, &directive).await {
                error!(item_id = item.id, stage = %stage, error = %write_err, "failed to record implicit retry");
            }
            metrics.record_retry();
        }
        Err(_elapsed) => {
            warn!(item_id = item.id, stage = %stage, "handler exceeded deadline, implicit retry");
            let cause = FallbackOutcome {
                reason: FallbackReason::DeadlineExceeded,
                detail: format!("handler exceeded deadline of {deadline:?}"),
            };
            let directive = Directive::implicit_retry_with_cause(&cause);
            if let Err(write_err) = repository.write_artifact_and_transition(item.id, stage, attempt, &directive).await {
                error!(item_id = item.id, stage = %stage, error = %write_err, "failed to record deadline-exceeded retry");
            }
            metrics.record_retry();
        }
    }
}
