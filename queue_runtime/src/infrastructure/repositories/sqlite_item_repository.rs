// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Item Repository
//!
//! The durable store. SQLite's connection pool serializes writers, so the
//! `UPDATE ... WHERE id IN (SELECT ... LIMIT ?) RETURNING ...` pattern
//! used by [`claim_pending`](ItemRepository::claim_pending) gets the same
//! "no two workers claim the same row" guarantee a `FOR UPDATE SKIP
//! LOCKED` claim gets on Postgres, without needing row locking clauses
//! SQLite doesn't have.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use queue_domain::entities::{EndpointBinding, FallbackRecord, Item, NewItem, PauseFlag, QueueSetting, StageArtifact};
use queue_domain::error::{QueueError, QueueResult};
use queue_domain::repositories::{ItemRepository, StageStatusCounts};
use queue_domain::value_objects::{Directive, FallbackReason, ProviderKind, Stage, Status};

pub struct SqliteItemRepository {
    pool: SqlitePool,
}

impl SqliteItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn store_err(e: sqlx::Error) -> QueueError {
    QueueError::Store(e.to_string())
}

fn parse_stage(s: &str) -> QueueResult<Stage> {
    Stage::parse(s).ok_or_else(|| QueueError::Internal(format!("unknown stage in store: {s}")))
}

fn parse_status(s: &str) -> QueueResult<Status> {
    Status::parse(s).ok_or_else(|| QueueError::Internal(format!("unknown status in store: {s}")))
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> QueueResult<Item> {
    let metadata_text: String = row.try_get("metadata").map_err(store_err)?;
    Ok(Item {
        id: row.try_get("id").map_err(store_err)?,
        source_id: row.try_get("source_id").map_err(store_err)?,
        stage: parse_stage(&row.try_get::<String, _>("stage").map_err(store_err)?)?,
        status: parse_status(&row.try_get::<String, _>("status").map_err(store_err)?)?,
        title: row.try_get("title").map_err(store_err)?,
        author: row.try_get("author").map_err(store_err)?,
        body: row.try_get("body").map_err(store_err)?,
        source_url: row.try_get("source_url").map_err(store_err)?,
        source_created_at: row.try_get("source_created_at").map_err(store_err)?,
        retry_count: row.try_get::<i64, _>("retry_count").map_err(store_err)? as u32,
        metadata: serde_json::from_str(&metadata_text)?,
        assigned_at: row.try_get("assigned_at").map_err(store_err)?,
        created_at: row.try_get("created_at").map_err(store_err)?,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
    })
}

fn row_to_artifact(row: &sqlx::sqlite::SqliteRow) -> QueueResult<StageArtifact> {
    let payload_text: String = row.try_get("payload").map_err(store_err)?;
    Ok(StageArtifact {
        id: row.try_get("id").map_err(store_err)?,
        item_id: row.try_get("item_id").map_err(store_err)?,
        stage: parse_stage(&row.try_get::<String, _>("stage").map_err(store_err)?)?,
        attempt: row.try_get::<i64, _>("attempt").map_err(store_err)? as u32,
        payload: serde_json::from_str(&payload_text)?,
        directive: row.try_get("directive").map_err(store_err)?,
        created_at: row.try_get("created_at").map_err(store_err)?,
    })
}

fn row_to_endpoint(row: &sqlx::sqlite::SqliteRow) -> QueueResult<EndpointBinding> {
    Ok(EndpointBinding {
        stage: parse_stage(&row.try_get::<String, _>("stage").map_err(store_err)?)?,
        provider: ProviderKind::parse(&row.try_get::<String, _>("provider").map_err(store_err)?)
            .ok_or_else(|| QueueError::Internal("unknown provider in store".to_string()))?,
        url: row.try_get("url").map_err(store_err)?,
        model: row.try_get("model").map_err(store_err)?,
        timeout: std::time::Duration::from_secs(row.try_get::<i64, _>("timeout_seconds").map_err(store_err)? as u64),
        secret_env_var: row.try_get("secret_env_var").map_err(store_err)?,
        concurrency_cap: row.try_get::<i64, _>("concurrency_cap").map_err(store_err)? as u32,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
    })
}

fn row_to_fallback(row: &sqlx::sqlite::SqliteRow) -> QueueResult<FallbackRecord> {
    Ok(FallbackRecord {
        id: row.try_get("id").map_err(store_err)?,
        item_id: row.try_get("item_id").map_err(store_err)?,
        stage: parse_stage(&row.try_get::<String, _>("stage").map_err(store_err)?)?,
        reason: FallbackReason::parse(&row.try_get::<String, _>("reason").map_err(store_err)?)
            .ok_or_else(|| QueueError::Internal("unknown fallback reason in store".to_string()))?,
        detail: row.try_get("detail").map_err(store_err)?,
        created_at: row.try_get("created_at").map_err(store_err)?,
    })
}

/// The item state implied by a resolved directive, applied as part of
/// the same transaction that appends its artifact.
fn next_state(stage: Stage, status: Status, retry_count: u32, directive: &Directive) -> (Stage, Status, u32) {
    match directive {
        Directive::Proceed { .. } => match stage.next() {
            Some(next) => (next, Status::Pending, 0),
            None => (stage, Status::Completed, retry_count),
        },
        Directive::Reject { .. } => (stage, Status::Rejected, retry_count),
        Directive::Retry { .. } => (stage, Status::Pending, retry_count + 1),
    }
}

#[async_trait]
impl ItemRepository for SqliteItemRepository {
    async fn ingest_item(&self, new_item: NewItem, now: DateTime<Utc>) -> QueueResult<Item> {
        let metadata = serde_json::json!({ "priority": new_item.priority });
        sqlx::query(
            r#"
            INSERT INTO items (
                source_id, stage, status, title, author, body, source_url,
                source_created_at, retry_count, metadata, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            ON CONFLICT(source_id) DO NOTHING
            "#,
        )
        .bind(&new_item.source_id)
        .bind(Stage::Triage.as_str())
        .bind(Status::Pending.as_str())
        .bind(&new_item.title)
        .bind(&new_item.author)
        .bind(&new_item.body)
        .bind(&new_item.source_url)
        .bind(new_item.source_created_at)
        .bind(serde_json::to_string(&metadata)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        let row = sqlx::query("SELECT * FROM items WHERE source_id = ?")
            .bind(&new_item.source_id)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;

        row_to_item(&row)
    }

    async fn claim_pending(&self, stage: Stage, limit: u32, retry_timeout: chrono::Duration, now: DateTime<Utc>) -> QueueResult<Vec<Item>> {
        let retry_cutoff = now - retry_timeout;
        let rows = sqlx::query(
            r#"
            UPDATE items
            SET status = 'claimed', assigned_at = ?, updated_at = ?
            WHERE id IN (
                SELECT id FROM items
                WHERE stage = ? AND status = 'pending'
                  AND (retry_count = 0 OR updated_at <= ?)
                ORDER BY json_extract(metadata, '$.priority') DESC, created_at ASC
                LIMIT ?
            )
            RETURNING id, source_id, stage, status, title, author, body, source_url,
                      source_created_at, retry_count, metadata, assigned_at, created_at, updated_at
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(stage.as_str())
        .bind(retry_cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(row_to_item).collect()
    }

    async fn write_artifact_and_transition(
        &self,
        item_id: i64,
        stage: Stage,
        attempt: u32,
        directive: &Directive,
    ) -> QueueResult<Item> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let now = Utc::now();

        let artifact = StageArtifact::from_directive(item_id, stage, attempt, directive);
        sqlx::query(
            "INSERT INTO artifacts (item_id, stage, attempt, payload, directive, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(artifact.item_id)
        .bind(artifact.stage.as_str())
        .bind(artifact.attempt)
        .bind(serde_json::to_string(&artifact.payload)?)
        .bind(&artifact.directive)
        .bind(artifact.created_at)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        let current = sqlx::query("SELECT stage, status, retry_count FROM items WHERE id = ?")
            .bind(item_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?
            .ok_or(QueueError::ItemNotFound(item_id))?;

        let current_status = parse_status(&current.try_get::<String, _>("status").map_err(store_err)?)?;
        let current_retry_count = current.try_get::<i64, _>("retry_count").map_err(store_err)? as u32;

        let (new_stage, new_status, new_retry_count) = next_state(stage, current_status, current_retry_count, directive);

        let row = sqlx::query(
            r#"
            UPDATE items SET stage = ?, status = ?, retry_count = ?, assigned_at = NULL, updated_at = ?
            WHERE id = ?
            RETURNING id, source_id, stage, status, title, author, body, source_url,
                      source_created_at, retry_count, metadata, assigned_at, created_at, updated_at
            "#,
        )
        .bind(new_stage.as_str())
        .bind(new_status.as_str())
        .bind(new_retry_count)
        .bind(now)
        .bind(item_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        let item = row_to_item(&row)?;
        tx.commit().await.map_err(store_err)?;
        Ok(item)
    }

    async fn recover_stuck(&self, stage: Stage, stuck_after: chrono::Duration, now: DateTime<Utc>) -> QueueResult<Vec<i64>> {
        let threshold = now - stuck_after;
        let rows = sqlx::query(
            r#"
            UPDATE items
            SET status = 'pending', assigned_at = NULL, retry_count = retry_count + 1, updated_at = ?
            WHERE stage = ? AND status = 'claimed' AND assigned_at < ?
            RETURNING id
            "#,
        )
        .bind(now)
        .bind(stage.as_str())
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(|r| r.try_get::<i64, _>("id").map_err(store_err)).collect()
    }

    async fn read_prior_artifacts(&self, item_id: i64) -> QueueResult<Vec<StageArtifact>> {
        let rows = sqlx::query("SELECT * FROM artifacts WHERE item_id = ? ORDER BY created_at ASC")
            .bind(item_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.iter().map(row_to_artifact).collect()
    }

    async fn count_by_stage_and_status(&self, stage: Stage, status: Status) -> QueueResult<StageStatusCounts> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count, AVG(retry_count) as avg_retry, MIN(created_at) as oldest \
             FROM items WHERE stage = ? AND status = ?",
        )
        .bind(stage.as_str())
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;

        let count: i64 = row.try_get("count").map_err(store_err)?;
        let avg_retry: Option<f64> = row.try_get("avg_retry").map_err(store_err)?;
        let oldest: Option<DateTime<Utc>> = row.try_get("oldest").map_err(store_err)?;

        Ok(StageStatusCounts {
            stage,
            status,
            count: count as u64,
            avg_retry_count: avg_retry.unwrap_or(0.0),
            oldest,
        })
    }

    async fn list_pending(&self, stage: Option<Stage>, limit: u32) -> QueueResult<Vec<Item>> {
        let rows = match stage {
            Some(stage) => {
                sqlx::query(
                    "SELECT * FROM items WHERE stage = ? AND status = 'pending' \
                     ORDER BY json_extract(metadata, '$.priority') DESC, created_at ASC LIMIT ?",
                )
                .bind(stage.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM items WHERE status = 'pending' \
                     ORDER BY json_extract(metadata, '$.priority') DESC, created_at ASC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(store_err)?;

        rows.iter().map(row_to_item).collect()
    }

    async fn list_rejected(&self, limit: u32) -> QueueResult<Vec<Item>> {
        let rows = sqlx::query("SELECT * FROM items WHERE status = 'rejected' ORDER BY updated_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.iter().map(row_to_item).collect()
    }

    async fn list_fallback(&self, limit: u32) -> QueueResult<Vec<(Item, FallbackRecord)>> {
        let rows = sqlx::query(
            r#"
            SELECT items.*, fallback_records.id as fr_id, fallback_records.item_id as fr_item_id,
                   fallback_records.stage as fr_stage, fallback_records.reason as fr_reason,
                   fallback_records.detail as fr_detail, fallback_records.created_at as fr_created_at
            FROM items
            JOIN fallback_records ON fallback_records.item_id = items.id
            WHERE items.status = 'failed'
              AND fallback_records.created_at = (
                  SELECT MAX(created_at) FROM fallback_records AS fr2 WHERE fr2.item_id = items.id
              )
            ORDER BY fallback_records.created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                let item = row_to_item(row)?;
                let record = FallbackRecord {
                    id: row.try_get("fr_id").map_err(store_err)?,
                    item_id: row.try_get("fr_item_id").map_err(store_err)?,
                    stage: parse_stage(&row.try_get::<String, _>("fr_stage").map_err(store_err)?)?,
                    reason: FallbackReason::parse(&row.try_get::<String, _>("fr_reason").map_err(store_err)?)
                        .ok_or_else(|| QueueError::Internal("unknown fallback reason in store".to_string()))?,
                    detail: row.try_get("fr_detail").map_err(store_err)?,
                    created_at: row.try_get("fr_created_at").map_err(store_err)?,
                };
                Ok((item, record))
            })
            .collect()
    }

    async fn append_fallback(&self, item_id: i64, stage: Stage, reason: FallbackReason, detail: String) -> QueueResult<FallbackRecord> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO fallback_records (item_id, stage, reason, detail, created_at) VALUES (?, ?, ?, ?, ?) \
             RETURNING id, item_id, stage, reason, detail, created_at",
        )
        .bind(item_id)
        .bind(stage.as_str())
        .bind(reason.as_str())
        .bind(&detail)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        sqlx::query("UPDATE items SET status = 'failed', assigned_at = NULL, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        let record = row_to_fallback(&row)?;
        tx.commit().await.map_err(store_err)?;
        Ok(record)
    }

    async fn upsert_endpoint(&self, binding: EndpointBinding) -> QueueResult<()> {
        sqlx::query(
            r#"
            INSERT INTO endpoints (stage, provider, url, model, timeout_seconds, secret_env_var, concurrency_cap, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(stage) DO UPDATE SET
                provider = excluded.provider,
                url = excluded.url,
                model = excluded.model,
                timeout_seconds = excluded.timeout_seconds,
                secret_env_var = excluded.secret_env_var,
                concurrency_cap = excluded.concurrency_cap,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(binding.stage.as_str())
        .bind(binding.provider.as_str())
        .bind(&binding.url)
        .bind(&binding.model)
        .bind(binding.timeout.as_secs() as i64)
        .bind(&binding.secret_env_var)
        .bind(binding.concurrency_cap)
        .bind(binding.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_endpoint(&self, stage: Stage) -> QueueResult<Option<EndpointBinding>> {
        let row = sqlx::query("SELECT * FROM endpoints WHERE stage = ?")
            .bind(stage.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.as_ref().map(row_to_endpoint).transpose()
    }

    async fn list_endpoints(&self) -> QueueResult<Vec<EndpointBinding>> {
        let rows = sqlx::query("SELECT * FROM endpoints").fetch_all(&self.pool).await.map_err(store_err)?;
        rows.iter().map(row_to_endpoint).collect()
    }

    async fn upsert_setting(&self, key: &str, value: &str) -> QueueResult<()> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> QueueResult<Option<QueueSetting>> {
        let row = sqlx::query("SELECT * FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        match row {
            Some(row) => Ok(Some(QueueSetting {
                key: row.try_get("key").map_err(store_err)?,
                value: row.try_get("value").map_err(store_err)?,
                updated_at: row.try_get("updated_at").map_err(store_err)?,
            })),
            None => Ok(None),
        }
    }

    async fn set_pause(&self, scope: &str, paused: bool) -> QueueResult<PauseFlag> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO pause_flags (scope, paused, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(scope) DO UPDATE SET paused = excluded.paused, updated_at = excluded.updated_at",
        )
        .bind(scope)
        .bind(paused)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(PauseFlag {
            scope: scope.to_string(),
            paused,
            updated_at: now,
        })
    }

    async fn get_pause(&self, scope: &str) -> QueueResult<PauseFlag> {
        let row = sqlx::query("SELECT * FROM pause_flags WHERE scope = ?")
            .bind(scope)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        match row {
            Some(row) => Ok(PauseFlag {
                scope: row.try_get("scope").map_err(store_err)?,
                paused: row.try_get("paused").map_err(store_err)?,
                updated_at: row.try_get("updated_at").map_err(store_err)?,
            }),
            None => Ok(PauseFlag {
                scope: scope.to_string(),
                paused: false,
                updated_at: Utc::now(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema::initialize_database;
    use tempfile::NamedTempFile;

    async fn test_repo() -> (SqliteItemRepository, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite://{}", temp.path().to_str().unwrap());
        let pool = initialize_database(&db_url).await.unwrap();
        (SqliteItemRepository::new(pool), temp)
    }

    async fn seed_item(repo: &SqliteItemRepository, priority: i64) -> i64 {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO items (source_id, stage, status, title, author, body, source_url, \
             source_created_at, retry_count, metadata, created_at, updated_at) \
             VALUES (?, ?, ?, 'title', 'author', 'body', 'https://example.invalid', ?, 0, ?, ?, ?)",
        )
        .bind(format!("seed-{}", uuid_like()))
        .bind(Stage::Triage.as_str())
        .bind(Status::Pending.as_str())
        .bind(now)
        .bind(format!(r#"{{"priority": {priority}}}"#))
        .bind(now)
        .bind(now)
        .execute(&repo.pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn seed_retrying_item(repo: &SqliteItemRepository, retry_count: i64, updated_at: DateTime<Utc>) -> i64 {
        sqlx::query(
            "INSERT INTO items (source_id, stage, status, title, author, body, source_url, \
             source_created_at, retry_count, metadata, created_at, updated_at) \
             VALUES (?, ?, ?, 'title', 'author', 'body', 'https://example.invalid', ?, ?, ?, ?, ?)",
        )
        .bind(format!("seed-{}", uuid_like()))
        .bind(Stage::Triage.as_str())
        .bind(Status::Pending.as_str())
        .bind(updated_at)
        .bind(retry_count)
        .bind(r#"{"priority": 0}"#)
        .bind(updated_at)
        .bind(updated_at)
        .execute(&repo.pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    /// A cheap per-process-unique suffix for `source_id` columns in tests
    /// that don't care about the value, just that it's distinct per row.
    fn uuid_like() -> String {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
    }

    #[tokio::test]
    async fn claim_pending_is_exclusive_and_orders_by_priority() {
        let (repo, _temp) = test_repo().await;
        seed_item(&repo, 5).await;
        let urgent = seed_item(&repo, 9).await;

        let claimed = repo.claim_pending(Stage::Triage, 1, chrono::Duration::seconds(0), Utc::now()).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, urgent);
        assert_eq!(claimed[0].status, Status::Claimed);

        let second_claim = repo.claim_pending(Stage::Triage, 10, chrono::Duration::seconds(0), Utc::now()).await.unwrap();
        assert_eq!(second_claim.len(), 1, "already-claimed item must not be claimable again");
    }

    #[tokio::test]
    async fn claim_pending_excludes_items_still_inside_their_retry_backoff_window() {
        let (repo, _temp) = test_repo().await;
        let now = Utc::now();
        let recently_retried = seed_retrying_item(&repo, 1, now).await;

        let claimed = repo.claim_pending(Stage::Triage, 10, chrono::Duration::seconds(300), now).await.unwrap();
        assert!(claimed.is_empty(), "item updated moments ago should still be inside its backoff window");

        let later = now + chrono::Duration::seconds(301);
        let claimed = repo.claim_pending(Stage::Triage, 10, chrono::Duration::seconds(300), later).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, recently_retried);
    }

    #[tokio::test]
    async fn claim_pending_never_backs_off_an_item_that_has_not_yet_retried() {
        let (repo, _temp) = test_repo().await;
        let now = Utc::now();
        seed_retrying_item(&repo, 0, now).await;

        let claimed = repo.claim_pending(Stage::Triage, 10, chrono::Duration::seconds(300), now).await.unwrap();
        assert_eq!(claimed.len(), 1, "a first attempt is claimable immediately regardless of retry_timeout");
    }

    #[tokio::test]
    async fn proceed_advances_stage_and_resets_retry_count() {
        let (repo, _temp) = test_repo().await;
        let id = seed_item(&repo, 5).await;
        repo.claim_pending(Stage::Triage, 1, chrono::Duration::seconds(0), Utc::now()).await.unwrap();

        let item = repo
            .write_artifact_and_transition(id, Stage::Triage, 1, &Directive::Proceed { artifact: serde_json::json!({}) })
            .await
            .unwrap();

        assert_eq!(item.stage, Stage::Research);
        assert_eq!(item.status, Status::Pending);
        assert_eq!(item.retry_count, 0);
    }

    #[tokio::test]
    async fn retry_increments_count_and_keeps_stage() {
        let (repo, _temp) = test_repo().await;
        let id = seed_item(&repo, 5).await;
        repo.claim_pending(Stage::Triage, 1, chrono::Duration::seconds(0), Utc::now()).await.unwrap();

        let item = repo
            .write_artifact_and_transition(id, Stage::Triage, 1, &Directive::implicit_retry())
            .await
            .unwrap();

        assert_eq!(item.stage, Stage::Triage);
        assert_eq!(item.status, Status::Pending);
        assert_eq!(item.retry_count, 1);
    }

    #[tokio::test]
    async fn reject_is_terminal() {
        let (repo, _temp) = test_repo().await;
        let id = seed_item(&repo, 5).await;
        repo.claim_pending(Stage::Triage, 1, chrono::Duration::seconds(0), Utc::now()).await.unwrap();

        let item = repo
            .write_artifact_and_transition(id, Stage::Triage, 1, &Directive::Reject { artifact: serde_json::json!({}) })
            .await
            .unwrap();

        assert_eq!(item.status, Status::Rejected);
        assert!(item.is_terminal());
    }

    #[tokio::test]
    async fn recover_stuck_returns_claims_to_pending_and_increments_retry_count() {
        let (repo, _temp) = test_repo().await;
        let id = seed_item(&repo, 5).await;
        repo.claim_pending(Stage::Triage, 1, chrono::Duration::seconds(0), Utc::now()).await.unwrap();

        let far_future = Utc::now() + chrono::Duration::days(1);
        let recovered = repo.recover_stuck(Stage::Triage, chrono::Duration::seconds(0), far_future).await.unwrap();

        assert_eq!(recovered, vec![id]);
        let pending = repo.list_pending(Some(Stage::Triage), 10).await.unwrap();
        assert_eq!(pending[0].retry_count, 1, "a crashed worker's claim still counts against the retry budget");
    }

    #[tokio::test]
    async fn append_fallback_moves_item_and_records_reason() {
        let (repo, _temp) = test_repo().await;
        let id = seed_item(&repo, 5).await;

        repo.append_fallback(id, Stage::Triage, FallbackReason::RetryExhausted, "3 retries".to_string())
            .await
            .unwrap();

        let fallback = repo.list_fallback(10).await.unwrap();
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].0.status, Status::Failed);
        assert_eq!(fallback[0].1.reason, FallbackReason::RetryExhausted);
    }

    #[tokio::test]
    async fn settings_and_pause_flags_round_trip() {
        let (repo, _temp) = test_repo().await;

        assert!(repo.get_setting("max_retries").await.unwrap().is_none());
        repo.upsert_setting("max_retries", "5").await.unwrap();
        assert_eq!(repo.get_setting("max_retries").await.unwrap().unwrap().value, "5");

        let flag = repo.get_pause(PauseFlag::ALL).await.unwrap();
        assert!(!flag.paused);
        repo.set_pause(PauseFlag::ALL, true).await.unwrap();
        assert!(repo.get_pause(PauseFlag::ALL).await.unwrap().paused);
    }

    fn sample_new_item(source_id: &str) -> NewItem {
        NewItem {
            source_id: source_id.to_string(),
            title: "A headline".to_string(),
            author: "someone".to_string(),
            body: "the submission text".to_string(),
            source_url: "https://example.invalid/posts/1".to_string(),
            source_created_at: Utc::now(),
            priority: 5,
        }
    }

    #[tokio::test]
    async fn ingest_item_starts_items_at_triage_pending() {
        let (repo, _temp) = test_repo().await;
        let item = repo.ingest_item(sample_new_item("src-1"), Utc::now()).await.unwrap();
        assert_eq!(item.stage, Stage::Triage);
        assert_eq!(item.status, Status::Pending);
        assert_eq!(item.source_id, "src-1");
    }

    #[tokio::test]
    async fn ingest_item_is_idempotent_by_source_id() {
        let (repo, _temp) = test_repo().await;
        let first = repo.ingest_item(sample_new_item("dup"), Utc::now()).await.unwrap();
        let second = repo.ingest_item(sample_new_item("dup"), Utc::now()).await.unwrap();
        assert_eq!(first.id, second.id, "re-ingesting the same source_id must not create a second row");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE source_id = 'dup'")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
