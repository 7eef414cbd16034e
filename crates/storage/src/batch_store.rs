// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-batch embedded store (`data/batch_<id>.db`): executions, their step
//! children, log entries, and this batch's slice of the sync queue.
//!
//! One connection per file (a single-connection pool), write-ahead
//! journaling and foreign-key enforcement on at open time. Readers may
//! overlap; writes are serialized by SQLite itself. Each public method is
//! one independent, synchronously-committed statement — there is no
//! multi-statement transaction API at this layer (see `StoreError`).

use std::path::Path;
use std::str::FromStr;

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Row, SqlitePool};
use station_core::{
    BatchId, ExecutionId, ExecutionResult, ExecutionStatus, LogEntry, LogLevel, StepResultRow,
    StepResultStatus, StoreError, SyncAction, SyncEntityType, SyncQueueItem,
};

use crate::schema::BATCH_SCHEMA;

/// Embedded store for one batch's executions, step results, logs, and sync
/// queue items.
#[derive(Clone)]
pub struct BatchStore {
    pool: SqlitePool,
}

impl BatchStore {
    /// Open (creating if absent) the SQLite file at `path`, run the batch
    /// schema DDL idempotently, and enable WAL + foreign keys.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(BATCH_SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self { pool })
    }

    /// In-memory store, for tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        sqlx::query(BATCH_SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(Self { pool })
    }

    // ---- executions -----------------------------------------------------

    /// Insert a new `execution_results` row. The execution is expected to
    /// be `status = running`, `completed_at = None`, no steps yet.
    pub async fn create_execution(&self, exec: &ExecutionResult) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO execution_results
                (execution_id, batch_id, sequence_name, sequence_version, status,
                 overall_pass, started_at, completed_at, duration_ms, parameters, synced_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(exec.execution_id.as_str())
        .bind(exec.batch_id.as_str())
        .bind(&exec.sequence_name)
        .bind(&exec.sequence_version)
        .bind(exec.status.to_string())
        .bind(exec.overall_pass.map(|b| b as i64))
        .bind(exec.started_at as i64)
        .bind(exec.completed_at.map(|v| v as i64))
        .bind(exec.duration_ms.map(|v| v as i64))
        .bind(exec.parameters.to_string())
        .bind(exec.synced_at.map(|v| v as i64))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    /// Transition an execution to a terminal status, recording
    /// `overall_pass`, `completed_at`, and `duration_ms`. Also writes the
    /// ordered step rows (replacing any prior rows for this execution id,
    /// which cascades from `ON DELETE CASCADE`).
    pub async fn complete_execution(
        &self,
        execution_id: &ExecutionId,
        status: ExecutionStatus,
        overall_pass: Option<bool>,
        completed_at: u64,
        duration_ms: u64,
        steps: &[StepResultRow],
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE execution_results
               SET status = ?, overall_pass = ?, completed_at = ?, duration_ms = ?
               WHERE execution_id = ?"#,
        )
        .bind(status.to_string())
        .bind(overall_pass.map(|b| b as i64))
        .bind(completed_at as i64)
        .bind(duration_ms as i64)
        .bind(execution_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM step_results WHERE execution_id = ?")
            .bind(execution_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        for (i, step) in steps.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO step_results
                    (execution_id, step_order, name, status, pass, duration_ms, payload, error)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(execution_id.as_str())
            .bind(i as i64 + 1)
            .bind(&step.name)
            .bind(step.status.to_string())
            .bind(step.pass.map(|b| b as i64))
            .bind(step.duration_ms.map(|v| v as i64))
            .bind(step.payload.as_ref().map(|v| v.to_string()))
            .bind(&step.error)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        Ok(())
    }

    /// Mark an execution as synced to the backend at `synced_at`.
    pub async fn mark_execution_synced(
        &self,
        execution_id: &ExecutionId,
        synced_at: u64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE execution_results SET synced_at = ? WHERE execution_id = ?")
            .bind(synced_at as i64)
            .bind(execution_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("execution {execution_id}")));
        }
        Ok(())
    }

    /// Fetch one execution with its step rows in ascending `step_order`
    /// (see I6).
    pub async fn get_execution_with_steps(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<ExecutionResult, StoreError> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"SELECT execution_id, batch_id, sequence_name, sequence_version, status,
                      overall_pass, started_at, completed_at, duration_ms, parameters, synced_at
               FROM execution_results WHERE execution_id = ?"#,
        )
        .bind(execution_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .ok_or_else(|| StoreError::NotFound(format!("execution {execution_id}")))?;

        let step_rows = sqlx::query_as::<_, StepRow>(
            r#"SELECT step_order, name, status, pass, duration_ms, payload, error
               FROM step_results WHERE execution_id = ? ORDER BY step_order ASC"#,
        )
        .bind(execution_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.into_execution_result(step_rows)
    }

    /// All executions recorded for this batch, most recent first.
    pub async fn list_executions(&self, limit: i64) -> Result<Vec<ExecutionResult>, StoreError> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            r#"SELECT execution_id, batch_id, sequence_name, sequence_version, status,
                      overall_pass, started_at, completed_at, duration_ms, parameters, synced_at
               FROM execution_results ORDER BY started_at DESC LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let step_rows = sqlx::query_as::<_, StepRow>(
                "SELECT step_order, name, status, pass, duration_ms, payload, error \
                 FROM step_results WHERE execution_id = ? ORDER BY step_order ASC",
            )
            .bind(&row.execution_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
            out.push(row.into_execution_result(step_rows)?);
        }
        Ok(out)
    }

    /// Raw sorted durations (ms) for percentile computation, across all
    /// completed executions of this batch (used by `station_storage::stats`).
    pub async fn get_step_durations(&self) -> Result<Vec<i64>, StoreError> {
        let rows = sqlx::query(
            "SELECT duration_ms FROM step_results WHERE duration_ms IS NOT NULL ORDER BY duration_ms ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(|r| r.get::<i64, _>("duration_ms")).collect())
    }

    // ---- logs -------------------------------------------------------------

    pub async fn append_log(&self, entry: &LogEntry) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO log_entries (batch_id, execution_id, level, message, timestamp) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.batch_id.as_str())
        .bind(entry.execution_id.as_ref().map(|e| e.as_str()))
        .bind(entry.level.to_string())
        .bind(&entry.message)
        .bind(entry.timestamp as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn recent_logs(&self, limit: i64) -> Result<Vec<LogEntry>, StoreError> {
        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT id, batch_id, execution_id, level, message, timestamp \
             FROM log_entries ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    // ---- sync queue ---------------------------------------------------------

    pub async fn enqueue(&self, item: &SyncQueueItem) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"INSERT INTO sync_queue
                (batch_id, entity_type, entity_id, action, payload, retry_count, last_error, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(item.batch_id.as_str())
        .bind(item.entity_type.to_string())
        .bind(&item.entity_id)
        .bind(item.action.to_string())
        .bind(item.payload.to_string())
        .bind(item.retry_count as i64)
        .bind(&item.last_error)
        .bind(item.created_at as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn dequeue(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("sync_queue item {id}")));
        }
        Ok(())
    }

    /// Increment `retry_count` and record `last_error`. Called after a
    /// transient delivery failure; the item remains pending until
    /// `retry_count` reaches `MAX_RETRIES`.
    pub async fn mark_failed(&self, id: i64, error: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE sync_queue SET retry_count = retry_count + 1, last_error = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn count_pending(&self, max_retries: u32) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sync_queue WHERE retry_count < ?")
            .bind(max_retries as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Up to `limit` pending items (`retry_count < max_retries`), strictly
    /// FIFO by `created_at`.
    pub async fn get_pending_items(
        &self,
        limit: i64,
        max_retries: u32,
    ) -> Result<Vec<SyncQueueItem>, StoreError> {
        let rows = sqlx::query_as::<_, SyncQueueRow>(
            r#"SELECT id, batch_id, entity_type, entity_id, action, payload, retry_count, last_error, created_at
               FROM sync_queue WHERE retry_count < ? ORDER BY created_at ASC LIMIT ?"#,
        )
        .bind(max_retries as i64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Garbage-collect items older than `ttl_ms` that have exhausted
    /// `max_retries`.
    pub async fn cleanup_old_items(
        &self,
        now_epoch_ms: u64,
        ttl_ms: u64,
        max_retries: u32,
    ) -> Result<u64, StoreError> {
        let cutoff = now_epoch_ms.saturating_sub(ttl_ms);
        let result = sqlx::query("DELETE FROM sync_queue WHERE retry_count >= ? AND created_at < ?")
            .bind(max_retries as i64)
            .bind(cutoff as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

#[derive(FromRow)]
struct ExecutionRow {
    execution_id: String,
    batch_id: String,
    sequence_name: String,
    sequence_version: String,
    status: String,
    overall_pass: Option<i64>,
    started_at: i64,
    completed_at: Option<i64>,
    duration_ms: Option<i64>,
    parameters: String,
    synced_at: Option<i64>,
}

impl ExecutionRow {
    fn into_execution_result(self, steps: Vec<StepRow>) -> Result<ExecutionResult, StoreError> {
        Ok(ExecutionResult {
            execution_id: ExecutionId::from_string(self.execution_id),
            batch_id: BatchId::new(self.batch_id),
            sequence_name: self.sequence_name,
            sequence_version: self.sequence_version,
            status: parse_execution_status(&self.status)?,
            overall_pass: self.overall_pass.map(|v| v != 0),
            started_at: self.started_at as u64,
            completed_at: self.completed_at.map(|v| v as u64),
            duration_ms: self.duration_ms.map(|v| v as u64),
            parameters: Value::from_str(&self.parameters).unwrap_or(Value::Null),
            steps: steps.into_iter().map(TryInto::try_into).collect::<Result<_, _>>()?,
            synced_at: self.synced_at.map(|v| v as u64),
        })
    }
}

#[derive(FromRow)]
struct StepRow {
    step_order: i64,
    name: String,
    status: String,
    pass: Option<i64>,
    duration_ms: Option<i64>,
    payload: Option<String>,
    error: Option<String>,
}

impl TryFrom<StepRow> for StepResultRow {
    type Error = StoreError;

    fn try_from(row: StepRow) -> Result<Self, StoreError> {
        Ok(StepResultRow {
            step_order: row.step_order as u32,
            name: row.name,
            status: parse_step_status(&row.status)?,
            pass: row.pass.map(|v| v != 0),
            duration_ms: row.duration_ms.map(|v| v as u64),
            payload: row.payload.and_then(|p| Value::from_str(&p).ok()),
            error: row.error,
        })
    }
}

#[derive(FromRow)]
struct LogRow {
    id: i64,
    batch_id: String,
    execution_id: Option<String>,
    level: String,
    message: String,
    timestamp: i64,
}

impl TryFrom<LogRow> for LogEntry {
    type Error = StoreError;

    fn try_from(row: LogRow) -> Result<Self, StoreError> {
        Ok(LogEntry {
            id: row.id,
            batch_id: BatchId::new(row.batch_id),
            execution_id: row.execution_id.map(ExecutionId::from_string),
            level: parse_log_level(&row.level)?,
            message: row.message,
            timestamp: row.timestamp as u64,
        })
    }
}

#[derive(FromRow)]
struct SyncQueueRow {
    id: i64,
    batch_id: String,
    entity_type: String,
    entity_id: String,
    action: String,
    payload: String,
    retry_count: i64,
    last_error: Option<String>,
    created_at: i64,
}

impl TryFrom<SyncQueueRow> for SyncQueueItem {
    type Error = StoreError;

    fn try_from(row: SyncQueueRow) -> Result<Self, StoreError> {
        Ok(SyncQueueItem {
            id: row.id,
            batch_id: BatchId::new(row.batch_id),
            entity_type: parse_entity_type(&row.entity_type)?,
            entity_id: row.entity_id,
            action: parse_sync_action(&row.action)?,
            payload: Value::from_str(&row.payload).unwrap_or(Value::Null),
            retry_count: row.retry_count as u32,
            last_error: row.last_error,
            created_at: row.created_at as u64,
        })
    }
}

fn parse_execution_status(s: &str) -> Result<ExecutionStatus, StoreError> {
    match s {
        "running" => Ok(ExecutionStatus::Running),
        "completed" => Ok(ExecutionStatus::Completed),
        "failed" => Ok(ExecutionStatus::Failed),
        "stopped" => Ok(ExecutionStatus::Stopped),
        other => Err(StoreError::Database(format!("unknown execution status: {other}"))),
    }
}

fn parse_step_status(s: &str) -> Result<StepResultStatus, StoreError> {
    match s {
        "pending" => Ok(StepResultStatus::Pending),
        "running" => Ok(StepResultStatus::Running),
        "completed" => Ok(StepResultStatus::Completed),
        "failed" => Ok(StepResultStatus::Failed),
        "skipped" => Ok(StepResultStatus::Skipped),
        other => Err(StoreError::Database(format!("unknown step status: {other}"))),
    }
}

fn parse_log_level(s: &str) -> Result<LogLevel, StoreError> {
    match s {
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warning" => Ok(LogLevel::Warning),
        "error" => Ok(LogLevel::Error),
        other => Err(StoreError::Database(format!("unknown log level: {other}"))),
    }
}

fn parse_entity_type(s: &str) -> Result<SyncEntityType, StoreError> {
    match s {
        "wip_process" => Ok(SyncEntityType::WipProcess),
        "execution" => Ok(SyncEntityType::Execution),
        other => Err(StoreError::Database(format!("unknown sync entity type: {other}"))),
    }
}

fn parse_sync_action(s: &str) -> Result<SyncAction, StoreError> {
    match s {
        "start_process" => Ok(SyncAction::StartProcess),
        "complete_process" => Ok(SyncAction::CompleteProcess),
        "convert_to_serial" => Ok(SyncAction::ConvertToSerial),
        "create" => Ok(SyncAction::Create),
        "update" => Ok(SyncAction::Update),
        other => Err(StoreError::Database(format!("unknown sync action: {other}"))),
    }
}

#[cfg(test)]
#[path = "batch_store_tests.rs"]
mod tests;
