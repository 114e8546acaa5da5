use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo_core::{
    ExecutionFinish, ExecutionLogEntry, ExecutionLogStore, ExecutionStatus, GeoResult,
    NewExecutionLog,
};
use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use crate::database::mapping::{column, MappingHelpers};
use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation, StoreOperationContext};
use crate::store_context;

const LOG_COLUMNS: &str = "id, task_key, target_id, instance_id, status, started_at, heartbeat_at, \
    finished_at, duration_ms, result_summary, error_type, error_msg, retry_count";

/// 执行记录存储
///
/// 记录只追加；结束操作带 `status = 'running'` 条件，重复结束不会覆盖第一次的结果。
#[derive(Clone)]
pub struct SqliteExecutionLogStore {
    pool: SqlitePool,
}

impl SqliteExecutionLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &SqliteRow, context: &StoreOperationContext) -> GeoResult<ExecutionLogEntry> {
        Ok(ExecutionLogEntry {
            id: column(row, "id", context)?,
            task_key: column(row, "task_key", context)?,
            target_id: column(row, "target_id", context)?,
            instance_id: column(row, "instance_id", context)?,
            status: MappingHelpers::execution_status(row, "status", context)?,
            started_at: column(row, "started_at", context)?,
            heartbeat_at: column(row, "heartbeat_at", context)?,
            finished_at: column(row, "finished_at", context)?,
            duration_ms: column(row, "duration_ms", context)?,
            result_summary: column(row, "result_summary", context)?,
            error_type: column(row, "error_type", context)?,
            error_msg: column(row, "error_msg", context)?,
            retry_count: column(row, "retry_count", context)?,
        })
    }

    fn rows_to_entries(
        rows: &[SqliteRow],
        context: &StoreOperationContext,
    ) -> GeoResult<Vec<ExecutionLogEntry>> {
        rows.iter().map(|row| Self::row_to_entry(row, context)).collect()
    }
}

#[async_trait]
impl ExecutionLogStore for SqliteExecutionLogStore {
    #[instrument(skip(self, entry), fields(task_key = %entry.task_key, target_id = ?entry.target_id))]
    async fn start(&self, entry: &NewExecutionLog) -> GeoResult<ExecutionLogEntry> {
        let context = store_context!(RepositoryOperation::Create, "执行记录", &entry.task_key);
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO execution_logs
                (task_key, target_id, instance_id, status, started_at, heartbeat_at, retry_count)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {LOG_COLUMNS}
            "#
        ))
        .bind(&entry.task_key)
        .bind(entry.target_id)
        .bind(&entry.instance_id)
        .bind(ExecutionStatus::Running.as_str())
        .bind(entry.started_at)
        .bind(entry.started_at)
        .bind(entry.retry_count)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        Self::row_to_entry(&row, &context)
    }

    #[instrument(skip(self))]
    async fn heartbeat(&self, id: i64, at: DateTime<Utc>) -> GeoResult<()> {
        let context = store_context!(RepositoryOperation::Update, "执行记录", id);
        sqlx::query("UPDATE execution_logs SET heartbeat_at = ? WHERE id = ? AND status = 'running'")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
        Ok(())
    }

    #[instrument(skip(self, finish), fields(status = %finish.status))]
    async fn finish(&self, id: i64, finish: &ExecutionFinish) -> GeoResult<bool> {
        let context = store_context!(RepositoryOperation::Update, "执行记录", id);
        let started_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT started_at FROM execution_logs WHERE id = ? AND status = 'running'",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        let Some(started_at) = started_at else {
            debug!("执行记录 {} 已结束或不存在，忽略", id);
            return Ok(false);
        };
        let duration_ms = (finish.finished_at - started_at).num_milliseconds().max(0);

        let result = sqlx::query(
            r#"
            UPDATE execution_logs
            SET status = ?, finished_at = ?, duration_ms = ?, result_summary = ?,
                error_type = ?, error_msg = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(finish.status.as_str())
        .bind(finish.finished_at)
        .bind(duration_ms)
        .bind(&finish.result_summary)
        .bind(&finish.error_type)
        .bind(&finish.error_msg)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> GeoResult<Option<ExecutionLogEntry>> {
        let context = store_context!(RepositoryOperation::Read, "执行记录", id);
        let row = sqlx::query(&format!("SELECT {LOG_COLUMNS} FROM execution_logs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.map(|row| Self::row_to_entry(&row, &context)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_by_task(
        &self,
        task_key: &str,
        limit: i64,
    ) -> GeoResult<Vec<ExecutionLogEntry>> {
        let context = store_context!(RepositoryOperation::Query, "执行记录", task_key);
        let rows = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM execution_logs WHERE task_key = ? \
             ORDER BY started_at DESC, id DESC LIMIT ?"
        ))
        .bind(task_key)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        Self::rows_to_entries(&rows, &context)
    }

    #[instrument(skip(self))]
    async fn list_by_target(
        &self,
        task_key: &str,
        target_id: i64,
        limit: i64,
    ) -> GeoResult<Vec<ExecutionLogEntry>> {
        let context = store_context!(
            RepositoryOperation::Query,
            "执行记录",
            format!("{task_key}#{target_id}")
        );
        let rows = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM execution_logs WHERE task_key = ? AND target_id = ? \
             ORDER BY started_at DESC, id DESC LIMIT ?"
        ))
        .bind(task_key)
        .bind(target_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        Self::rows_to_entries(&rows, &context)
    }

    #[instrument(skip(self))]
    async fn list_stale_running(
        &self,
        seen_before: DateTime<Utc>,
    ) -> GeoResult<Vec<ExecutionLogEntry>> {
        let context = store_context!(RepositoryOperation::Query, "失联执行记录");
        let rows = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM execution_logs \
             WHERE status = 'running' AND MAX(heartbeat_at, started_at) < ? ORDER BY id"
        ))
        .bind(seen_before)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        Self::rows_to_entries(&rows, &context)
    }

    async fn count_running(&self) -> GeoResult<i64> {
        let context = store_context!(RepositoryOperation::Query, "执行记录");
        sqlx::query_scalar("SELECT COUNT(*) FROM execution_logs WHERE status = 'running'")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))
    }

    #[instrument(skip(self))]
    async fn cleanup_before(&self, before: DateTime<Utc>) -> GeoResult<u64> {
        let context = store_context!(RepositoryOperation::Delete, "执行记录");
        let result = sqlx::query(
            "DELETE FROM execution_logs WHERE finished_at IS NOT NULL AND finished_at < ?",
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!("删除过期执行记录 {} 条", removed);
        }
        Ok(removed)
    }
}

