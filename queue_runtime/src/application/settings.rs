// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Helpers for reading operator-tunable settings with their built-in
//! defaults. A store error or a malformed stored value both fall back to
//! the default rather than failing the caller — settings are advisory
//! tuning, not correctness-critical state.

use queue_domain::entities::queue_setting::default_for;
use queue_domain::repositories::ItemRepository;

pub async fn read_u64(repository: &dyn ItemRepository, key: &str, fallback: u64) -> u64 {
    let parsed = match repository.get_setting(key).await {
        Ok(Some(setting)) => setting.value.parse().ok(),
        _ => None,
    };
    parsed.or_else(|| default_for(key).and_then(|s| s.parse().ok())).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use queue_domain::entities::{EndpointBinding, FallbackRecord, Item, NewItem, PauseFlag, QueueSetting, StageArtifact};
    use queue_domain::error::QueueResult;
    use queue_domain::repositories::StageStatusCounts;
    use queue_domain::value_objects::{Directive, FallbackReason, Stage, Status};

    struct FakeRepository {
        stored: Option<&'static str>,
    }

    #[async_trait]
    impl ItemRepository for FakeRepository {
        async fn ingest_item(&self, _new_item: NewItem, _now: DateTime<Utc>) -> QueueResult<Item> {
            unimplemented!("not exercised by settings tests")
        }
        async fn claim_pending(&self, _stage: Stage, _limit: u32, _retry_timeout: chrono::Duration, _now: DateTime<Utc>) -> QueueResult<Vec<Item>> {
            Ok(vec![])
        }
        async fn write_artifact_and_transition(&self, item_id: i64, _stage: Stage, _attempt: u32, _directive: &Directive) -> QueueResult<Item> {
            Err(queue_domain::error::QueueError::ItemNotFound(item_id))
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
        async fn upsert_setting(&self, _key: &str, _value: &str) -> QueueResult<()> {
            Ok(())
        }
        async fn get_setting(&self, _key: &str) -> QueueResult<Option<QueueSetting>> {
            Ok(self.stored.map(|v| QueueSetting { key: "k".to_string(), value: v.to_string(), updated_at: Utc::now() }))
        }
        async fn set_pause(&self, scope: &str, paused: bool) -> QueueResult<PauseFlag> {
            Ok(PauseFlag { scope: scope.to_string(), paused, updated_at: Utc::now() })
        }
        async fn get_pause(&self, scope: &str) -> QueueResult<PauseFlag> {
            Ok(PauseFlag { scope: scope.to_string(), paused: false, updated_at: Utc::now() })
        }
    }

    #[tokio::test]
    async fn falls_back_to_built_in_default_when_unset() {
        let repo = FakeRepository { stored: None };
        let value = read_u64(&repo, queue_domain::entities::queue_setting::keys::MAX_RETRIES, 99).await;
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn prefers_stored_value_over_default() {
        let repo = FakeRepository { stored: Some("7") };
        let value = read_u64(&repo, queue_domain::entities::queue_setting::keys::MAX_RETRIES, 99).await;
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn falls_back_to_caller_default_for_unknown_key() {
        let repo = FakeRepository { stored: None };
        let value = read_u64(&repo, "not_a_real_key", 42).await;
        assert_eq!(value, 42);
    }
}
