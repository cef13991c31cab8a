//! SQLite checkpoint store implementation.
//!
//! Implements `CheckpointStore` from `stepwise-core` using sqlx with split
//! read/write pools. Rows are keyed by `(workflow_id, step_number)`; a write
//! for an existing key replaces the row, so each step has exactly one
//! current checkpoint. Payloads are stored as JSON text and timestamps as
//! RFC 3339 strings.

use chrono::{DateTime, Utc};
use sqlx::Row;
use stepwise_core::checkpoint::CheckpointStore;
use stepwise_types::checkpoint::{CheckpointStatus, ExecutionCheckpoint};
use stepwise_types::error::StoreError;
use uuid::Uuid;

use super::pool::DatabasePool;

const COLUMNS: &str = "id, workflow_id, step_number, step_name, status, attempts, state_json, \
                       input_json, output_json, error_message, created_at, execution_duration_ms, \
                       definition_hash";

/// SQLite-backed implementation of `CheckpointStore`.
pub struct SqliteCheckpointStore {
    pool: DatabasePool,
}

impl SqliteCheckpointStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Distinct workflow ids with at least one checkpoint, most recent first.
    pub async fn list_workflows(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT workflow_id, MAX(created_at) AS last_write FROM execution_checkpoints \
             GROUP BY workflow_id ORDER BY last_write DESC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                row.try_get("workflow_id")
                    .map_err(|e| StoreError::Query(e.to_string()))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct CheckpointRow {
    id: String,
    workflow_id: String,
    step_number: i64,
    step_name: String,
    status: String,
    attempts: i64,
    state_json: String,
    input_json: String,
    output_json: Option<String>,
    error_message: Option<String>,
    created_at: String,
    execution_duration_ms: i64,
    definition_hash: Option<String>,
}

impl CheckpointRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            step_number: row.try_get("step_number")?,
            step_name: row.try_get("step_name")?,
            status: row.try_get("status")?,
            attempts: row.try_get("attempts")?,
            state_json: row.try_get("state_json")?,
            input_json: row.try_get("input_json")?,
            output_json: row.try_get("output_json")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            execution_duration_ms: row.try_get("execution_duration_ms")?,
            definition_hash: row.try_get("definition_hash")?,
        })
    }

    fn into_checkpoint(self) -> Result<ExecutionCheckpoint, StoreError> {
        let status: CheckpointStatus = self.status.parse().map_err(StoreError::Query)?;
        let step_number = u32::try_from(self.step_number)
            .map_err(|_| StoreError::Query(format!("invalid step number: {}", self.step_number)))?;
        let attempts = u32::try_from(self.attempts)
            .map_err(|_| StoreError::Query(format!("invalid attempt count: {}", self.attempts)))?;

        Ok(ExecutionCheckpoint {
            id: parse_uuid(&self.id)?,
            workflow_id: self.workflow_id,
            step_number,
            step_name: self.step_name,
            status,
            attempts,
            state_json: self.state_json,
            input_json: self.input_json,
            output_json: self.output_json,
            error_message: self.error_message,
            created_at: parse_datetime(&self.created_at)?,
            execution_duration_ms: self.execution_duration_ms.max(0) as u64,
            definition_hash: self.definition_hash,
        })
    }
}

fn rows_to_checkpoints(
    rows: &[sqlx::sqlite::SqliteRow],
) -> Result<Vec<ExecutionCheckpoint>, StoreError> {
    let mut checkpoints = Vec::with_capacity(rows.len());
    for row in rows {
        let r = CheckpointRow::from_row(row).map_err(|e| StoreError::Query(e.to_string()))?;
        checkpoints.push(r.into_checkpoint()?);
    }
    Ok(checkpoints)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    s.parse::<Uuid>()
        .map_err(|e| StoreError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// CheckpointStore impl
// ---------------------------------------------------------------------------

impl CheckpointStore for SqliteCheckpointStore {
    async fn save_checkpoint(&self, checkpoint: &ExecutionCheckpoint) -> Result<(), StoreError> {
        let duration_ms = i64::try_from(checkpoint.execution_duration_ms).unwrap_or(i64::MAX);

        sqlx::query(
            r#"INSERT INTO execution_checkpoints
                 (id, workflow_id, step_number, step_name, status, attempts, state_json,
                  input_json, output_json, error_message, created_at, execution_duration_ms,
                  definition_hash)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(workflow_id, step_number) DO UPDATE SET
                 id = excluded.id,
                 step_name = excluded.step_name,
                 status = excluded.status,
                 attempts = excluded.attempts,
                 state_json = excluded.state_json,
                 input_json = excluded.input_json,
                 output_json = excluded.output_json,
                 error_message = excluded.error_message,
                 created_at = excluded.created_at,
                 execution_duration_ms = excluded.execution_duration_ms,
                 definition_hash = excluded.definition_hash"#,
        )
        .bind(checkpoint.id.to_string())
        .bind(&checkpoint.workflow_id)
        .bind(i64::from(checkpoint.step_number))
        .bind(&checkpoint.step_name)
        .bind(checkpoint.status.as_str())
        .bind(i64::from(checkpoint.attempts))
        .bind(&checkpoint.state_json)
        .bind(&checkpoint.input_json)
        .bind(&checkpoint.output_json)
        .bind(&checkpoint.error_message)
        .bind(format_datetime(&checkpoint.created_at))
        .bind(duration_ms)
        .bind(&checkpoint.definition_hash)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_checkpoint(
        &self,
        workflow_id: &str,
        checkpoint_id: &Uuid,
    ) -> Result<Option<ExecutionCheckpoint>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM execution_checkpoints WHERE workflow_id = ? AND id = ?"
        ))
        .bind(workflow_id)
        .bind(checkpoint_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = CheckpointRow::from_row(&row)
                    .map_err(|e| StoreError::Query(e.to_string()))?;
                Ok(Some(r.into_checkpoint()?))
            }
            None => Ok(None),
        }
    }

    async fn get_latest_checkpoint(
        &self,
        workflow_id: &str,
    ) -> Result<Option<ExecutionCheckpoint>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM execution_checkpoints WHERE workflow_id = ? \
             ORDER BY step_number DESC, created_at DESC LIMIT 1"
        ))
        .bind(workflow_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = CheckpointRow::from_row(&row)
                    .map_err(|e| StoreError::Query(e.to_string()))?;
                Ok(Some(r.into_checkpoint()?))
            }
            None => Ok(None),
        }
    }

    async fn get_workflow_checkpoints(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<ExecutionCheckpoint>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM execution_checkpoints WHERE workflow_id = ? \
             ORDER BY step_number ASC"
        ))
        .bind(workflow_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        rows_to_checkpoints(&rows)
    }

    async fn purge_workflow_checkpoints(&self, workflow_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM execution_checkpoints WHERE workflow_id = ?")
            .bind(workflow_id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        tracing::debug!(
            workflow_id,
            deleted = result.rows_affected(),
            "purged checkpoints"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use serde_json::json;
    use stepwise_core::workflow::definition::{ExecutionStep, WorkflowDefinition};
    use stepwise_core::workflow::engine::{WorkflowEngine, WorkflowExecutor};
    use stepwise_core::workflow::step::{StepContext, StepError, StepOutput, fn_step};
    use stepwise_types::config::EngineConfig;
    use stepwise_types::workflow::RetryConfig;
    use tokio_util::sync::CancellationToken;

    use crate::sqlite::pool::default_database_url;

    /// The returned directory must outlive the store.
    async fn test_store() -> (SqliteCheckpointStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = default_database_url(dir.path());
        let store = SqliteCheckpointStore::new(DatabasePool::new(&url).await.unwrap());
        (store, dir)
    }

    fn completed(workflow_id: &str, step_number: u32, output: serde_json::Value) -> ExecutionCheckpoint {
        ExecutionCheckpoint::completed(
            workflow_id,
            step_number,
            &format!("step-{step_number}"),
            1,
            json!({"completed_steps": step_number + 1}).to_string(),
            json!({"n": step_number}).to_string(),
            output.to_string(),
            12,
        )
    }

    #[tokio::test]
    async fn test_save_and_get_checkpoint() {
        let (store, _dir) = test_store().await;
        let cp = completed("wf", 0, json!({"rows": 3, "label": "naïve ✓"}));
        store.save_checkpoint(&cp).await.unwrap();

        let found = store.get_checkpoint("wf", &cp.id).await.unwrap().unwrap();
        assert_eq!(found, cp);

        assert!(store.get_checkpoint("other", &cp.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_checkpoints_ordered_by_step_number() {
        let (store, _dir) = test_store().await;
        for n in [2, 0, 1] {
            store.save_checkpoint(&completed("wf", n, json!(n))).await.unwrap();
        }

        let chain = store.get_workflow_checkpoints("wf").await.unwrap();
        let numbers: Vec<u32> = chain.iter().map(|cp| cp.step_number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);

        let latest = store.get_latest_checkpoint("wf").await.unwrap().unwrap();
        assert_eq!(latest.step_number, 2);
    }

    #[tokio::test]
    async fn test_later_write_supersedes_same_step() {
        let (store, _dir) = test_store().await;
        let failed = ExecutionCheckpoint::failed(
            "wf",
            0,
            "step-0",
            3,
            "{}".to_string(),
            "null".to_string(),
            "connection reset",
            40,
        );
        store.save_checkpoint(&failed).await.unwrap();
        let retried = completed("wf", 0, json!("ok"));
        store.save_checkpoint(&retried).await.unwrap();

        let chain = store.get_workflow_checkpoints("wf").await.unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0], retried);
        assert!(store.get_checkpoint("wf", &failed.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_checkpoint_round_trips_error() {
        let (store, _dir) = test_store().await;
        let failed = ExecutionCheckpoint::failed(
            "wf",
            4,
            "publish",
            2,
            "{}".to_string(),
            "null".to_string(),
            "HTTP 503",
            7,
        )
        .with_definition_hash("9f86d081884c7d65");
        store.save_checkpoint(&failed).await.unwrap();

        let found = store.get_latest_checkpoint("wf").await.unwrap().unwrap();
        assert_eq!(found.status, CheckpointStatus::Failed);
        assert_eq!(found.error_message.as_deref(), Some("HTTP 503"));
        assert!(found.output_json.is_none());
        assert_eq!(found.attempts, 2);
        assert_eq!(found.definition_hash.as_deref(), Some("9f86d081884c7d65"));
    }

    #[tokio::test]
    async fn test_purge_is_idempotent_and_isolated() {
        let (store, _dir) = test_store().await;
        store.save_checkpoint(&completed("a", 0, json!(1))).await.unwrap();
        store.save_checkpoint(&completed("b", 0, json!(2))).await.unwrap();

        store.purge_workflow_checkpoints("a").await.unwrap();
        store.purge_workflow_checkpoints("a").await.unwrap();
        store.purge_workflow_checkpoints("never-existed").await.unwrap();

        assert!(store.get_workflow_checkpoints("a").await.unwrap().is_empty());
        assert!(store.get_latest_checkpoint("a").await.unwrap().is_none());
        assert_eq!(store.get_workflow_checkpoints("b").await.unwrap().len(), 1);
        assert_eq!(store.list_workflows().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_engine_resumes_across_store_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = default_database_url(dir.path());
        let config = EngineConfig {
            default_retry: RetryConfig::fixed(2, 1),
            ..EngineConfig::default()
        };

        let calls: Vec<Arc<AtomicU32>> = (0..3).map(|_| Arc::new(AtomicU32::new(0))).collect();
        let broken = Arc::new(AtomicBool::new(true));
        let def = {
            let mut def = WorkflowDefinition::new("durable", "durable");
            for (i, c) in calls.iter().enumerate() {
                let c = c.clone();
                let broken = broken.clone();
                def = def.step(ExecutionStep::new(
                    format!("s{i}"),
                    fn_step(move |ctx: StepContext| {
                        let c = c.clone();
                        let broken = broken.clone();
                        async move {
                            c.fetch_add(1, Ordering::SeqCst);
                            if ctx.step_number == 1 && broken.load(Ordering::SeqCst) {
                                return Err(StepError::failed("disk full"));
                            }
                            Ok(StepOutput::new(json!(ctx.step_number))
                                .with_state("last", json!(ctx.step_name)))
                        }
                    }),
                ));
            }
            def
        };

        // First process: step 1 fails.
        {
            let pool = DatabasePool::new(&url).await.unwrap();
            let engine = WorkflowEngine::new(SqliteCheckpointStore::new(pool.clone()), config.clone());
            let result = engine.execute(&def, &CancellationToken::new()).await.unwrap();
            assert!(!result.success);
            pool.close().await;
        }

        // Second process: same database, fixed cause.
        broken.store(false, Ordering::SeqCst);
        let pool = DatabasePool::new(&url).await.unwrap();
        let engine = WorkflowEngine::new(SqliteCheckpointStore::new(pool), config);
        let result = engine.resume(&def, &CancellationToken::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.final_output, Some(json!(2)));

        assert_eq!(calls[0].load(Ordering::SeqCst), 1);
        assert_eq!(calls[1].load(Ordering::SeqCst), 3);
        assert_eq!(calls[2].load(Ordering::SeqCst), 1);

        let chain = engine
            .checkpoints()
            .store()
            .get_workflow_checkpoints("durable")
            .await
            .unwrap();
        assert_eq!(chain.len(), 3);
        assert!(chain.iter().all(|cp| cp.is_completed()));
    }
}
