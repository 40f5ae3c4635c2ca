// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Tool Surface — Concrete Implementation
//!
//! `write_result` closes over one `(item, attempt)` and enforces
//! at-most-once with an `AtomicBool`; a fresh [`RemoteToolSurface`] is
//! constructed per attempt, so there is nothing to reset between calls.
//! `web_search` shares a process-wide [`WebSearchLimiter`] across every
//! concurrent attempt — the rate limit is a single counter for this
//! process, not a per-item or per-stage budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Semaphore;

use queue_domain::error::{QueueError, QueueResult};
use queue_domain::repositories::ItemRepository;
use queue_domain::services::tool_surface::ToolSurface;
use queue_domain::value_objects::{Directive, Stage};

/// Caps `web_search` calls to a rate per minute, refilling the permit
/// pool once a minute rather than on a per-call timer — a burst up to
/// the full rate is allowed, matching how a token-bucket search API key
/// is typically enforced upstream.
pub struct WebSearchLimiter {
    semaphore: Arc<Semaphore>,
    cap: usize,
}

impl WebSearchLimiter {
    /// Build the limiter and spawn its background refill task. The task
    /// runs for the lifetime of the process; there is no shutdown hook
    /// because it holds no resources worth draining.
    pub fn spawn(rate_per_minute: u32) -> Arc<Self> {
        let cap = rate_per_minute.max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(cap));
        let limiter = Arc::new(Self { semaphore: Arc::clone(&semaphore), cap });

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let available = semaphore.available_permits();
                if available < cap {
                    semaphore.add_permits(cap - available);
                }
            }
        });

        limiter
    }

    fn try_acquire(&self) -> QueueResult<()> {
        match self.semaphore.try_acquire() {
            Ok(permit) => {
                permit.forget();
                Ok(())
            }
            Err(_) => Err(QueueError::ToolRateLimited("web search rate limit exhausted for this minute".to_string())),
        }
    }
}

/// The tool bundle bound to exactly one stage handler invocation.
pub struct RemoteToolSurface {
    repository: Arc<dyn ItemRepository>,
    item_id: i64,
    stage: Stage,
    attempt: u32,
    decided: AtomicBool,
    limiter: Arc<WebSearchLimiter>,
    http: Client,
    search_url: String,
    search_api_key_env: String,
}

impl RemoteToolSurface {
    pub fn new(
        repository: Arc<dyn ItemRepository>,
        item_id: i64,
        stage: Stage,
        attempt: u32,
        limiter: Arc<WebSearchLimiter>,
        search_url: String,
        search_api_key_env: String,
    ) -> Self {
        Self {
            repository,
            item_id,
            stage,
            attempt,
            decided: AtomicBool::new(false),
            limiter,
            http: Client::new(),
            search_url,
            search_api_key_env,
        }
    }
}

#[async_trait]
impl ToolSurface for RemoteToolSurface {
    async fn write_result(&self, directive: Directive) -> QueueResult<()> {
        if self.decided.swap(true, Ordering::SeqCst) {
            return Err(QueueError::ToolRejected(format!(
                "write_result already called for item {} stage {} attempt {}",
                self.item_id, self.stage, self.attempt
            )));
        }
        self.repository
            .write_artifact_and_transition(self.item_id, self.stage, self.attempt, &directive)
            .await?;
        Ok(())
    }

    async fn web_search(&self, query: &str) -> QueueResult<Value> {
        self.limiter.try_acquire()?;

        let mut request = self.http.get(&self.search_url).query(&[("q", query)]);
        if let Ok(key) = std::env::var(&self.search_api_key_env) {
            request = request.header("X-Subscription-Token", key);
        }

        let response = request.send().await.map_err(|e| QueueError::EndpointUnreachable(e.to_string()))?;
        if response.status().is_server_error() {
            return Err(QueueError::EndpointServerError(response.status().to_string()));
        }
        if response.status().as_u16() == 429 {
            return Err(QueueError::ToolRateLimited("search provider returned 429".to_string()));
        }

        let body: Value = response.json().await.map_err(|e| QueueError::ModelProtocolError(e.to_string()))?;
        Ok(normalize_search_results(&body))
    }
}

/// Best-effort normalization of a search provider's response into
/// `{title, url, description, published}` entries. Providers vary in
/// envelope shape; this walks the common `web.results`/`results` array
/// names and falls back to returning the raw body untouched.
fn normalize_search_results(body: &Value) -> Value {
    let results = body
        .get("web")
        .and_then(|w| w.get("results"))
        .or_else(|| body.get("results"))
        .and_then(|r| r.as_array());

    match results {
        Some(items) => {
            let normalized: Vec<Value> = items
                .iter()
                .map(|item| {
                    serde_json::json!({
                        "title": item.get("title").cloned().unwrap_or(Value::Null),
                        "url": item.get("url").cloned().unwrap_or(Value::Null),
                        "description": item.get("description").cloned().unwrap_or(Value::Null),
                        "published": item.get("age").or_else(|| item.get("published")).cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            Value::Array(normalized)
        }
        None => body.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    use queue_domain::entities::{EndpointBinding, FallbackRecord, Item, NewItem, PauseFlag, QueueSetting, StageArtifact};
    use queue_domain::repositories::StageStatusCounts;
    use queue_domain::value_objects::{FallbackReason, Status};

    struct RecordingRepository {
        writes: std::sync::Mutex<Vec<Directive>>,
    }

    #[async_trait]
    impl ItemRepository for RecordingRepository {
        async fn ingest_item(&self, _new_item: NewItem, _now: chrono::DateTime<Utc>) -> QueueResult<Item> {
            unimplemented!("not exercised by tool-surface tests")
        }
        async fn claim_pending(&self, _stage: Stage, _limit: u32, _retry_timeout: chrono::Duration, _now: chrono::DateTime<Utc>) -> QueueResult<Vec<Item>> {
            Ok(vec![])
        }
        async fn write_artifact_and_transition(&self, item_id: i64, _stage: Stage, _attempt: u32, directive: &Directive) -> QueueResult<Item> {
            self.writes.lock().unwrap().push(directive.clone());
            Ok(Item {
                id: item_id,
                source_id: format!("src-{item_id}"),
                stage: Stage::Triage,
                status: Status::Pending,
                title: "title".to_string(),
                author: "author".to_string(),
                body: "body".to_string(),
                source_url: "https://example.invalid".to_string(),
                source_created_at: Utc::now(),
                retry_count: 0,
                metadata: serde_json::json!({}),
                assigned_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        }
        async fn recover_stuck(&self, _stage: Stage, _stuck_after: chrono::Duration, _now: chrono::DateTime<Utc>) -> QueueResult<Vec<i64>> {
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

    fn surface(repo: Arc<RecordingRepository>) -> RemoteToolSurface {
        RemoteToolSurface::new(
            repo,
            1,
            Stage::Triage,
            1,
            WebSearchLimiter::spawn(30),
            "https://example.invalid/search".to_string(),
            "TEST_SEARCH_KEY".to_string(),
        )
    }

    #[tokio::test]
    async fn second_write_result_is_rejected() {
        let repo = Arc::new(RecordingRepository { writes: std::sync::Mutex::new(vec![]) });
        let tools = surface(Arc::clone(&repo));

        tools.write_result(Directive::Proceed { artifact: serde_json::json!({}) }).await.unwrap();
        let second = tools.write_result(Directive::Reject { artifact: serde_json::json!({}) }).await;

        assert!(matches!(second, Err(QueueError::ToolRejected(_))));
        assert_eq!(repo.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rate_limiter_rejects_once_exhausted() {
        let limiter = WebSearchLimiter::spawn(2);
        limiter.try_acquire().unwrap();
        limiter.try_acquire().unwrap();
        assert!(matches!(limiter.try_acquire(), Err(QueueError::ToolRateLimited(_))));
    }

    #[test]
    fn normalize_handles_brave_shaped_envelope() {
        let body = serde_json::json!({
            "web": { "results": [ { "title": "t", "url": "u", "description": "d", "age": "1 day ago" } ] }
        });
        let normalized = normalize_search_results(&body);
        assert_eq!(normalized[0]["title"], "t");
        assert_eq!(normalized[0]["published"], "1 day ago");
    }
}
