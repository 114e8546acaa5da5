use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo_core::{GeoError, GeoResult, ScheduledTaskConfig, TaskScheduleUpdate, TaskStore};
use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;
use tracing::{debug, info, instrument, warn};

use crate::database::mapping::column;
use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation, StoreOperationContext};
use crate::store_context;

const TASK_COLUMNS: &str = "id, task_key, name, cron_expression, is_active, description, \
    consecutive_failures, is_quarantined, quarantine_reason, quarantine_at, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow, context: &StoreOperationContext) -> GeoResult<ScheduledTaskConfig> {
        Ok(ScheduledTaskConfig {
            id: column(row, "id", context)?,
            task_key: column(row, "task_key", context)?,
            name: column(row, "name", context)?,
            cron_expression: column(row, "cron_expression", context)?,
            is_active: column(row, "is_active", context)?,
            description: column(row, "description", context)?,
            consecutive_failures: column(row, "consecutive_failures", context)?,
            is_quarantined: column(row, "is_quarantined", context)?,
            quarantine_reason: column(row, "quarantine_reason", context)?,
            quarantine_at: column(row, "quarantine_at", context)?,
            created_at: column(row, "created_at", context)?,
            updated_at: column(row, "updated_at", context)?,
        })
    }

    fn not_found(task_key: &str) -> GeoError {
        GeoError::TaskNotFound {
            task_key: task_key.to_string(),
        }
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    #[instrument(skip(self))]
    async fn list(&self) -> GeoResult<Vec<ScheduledTaskConfig>> {
        let context = store_context!(RepositoryOperation::Query, "定时任务");
        let rows = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM scheduled_tasks ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        rows.iter()
            .map(|row| Self::row_to_task(row, &context))
            .collect()
    }

    #[instrument(skip(self))]
    async fn get(&self, task_key: &str) -> GeoResult<Option<ScheduledTaskConfig>> {
        let context = store_context!(RepositoryOperation::Read, "定时任务", task_key);
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE task_key = ?"
        ))
        .bind(task_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.map(|row| Self::row_to_task(&row, &context)).transpose()
    }

    #[instrument(skip(self, task), fields(task_key = %task.task_key))]
    async fn create_if_absent(&self, task: &ScheduledTaskConfig) -> GeoResult<bool> {
        let context = store_context!(RepositoryOperation::Create, "定时任务", &task.task_key);
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO scheduled_tasks
                (task_key, name, cron_expression, is_active, description, consecutive_failures,
                 is_quarantined, quarantine_reason, quarantine_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.task_key)
        .bind(&task.name)
        .bind(&task.cron_expression)
        .bind(task.is_active)
        .bind(&task.description)
        .bind(task.consecutive_failures)
        .bind(task.is_quarantined)
        .bind(&task.quarantine_reason)
        .bind(task.quarantine_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        let created = result.rows_affected() == 1;
        if created {
            info!("写入默认定时任务: {} ({})", task.task_key, task.cron_expression);
        }
        Ok(created)
    }

    #[instrument(skip(self, update))]
    async fn update_schedule(
        &self,
        task_key: &str,
        update: &TaskScheduleUpdate,
    ) -> GeoResult<ScheduledTaskConfig> {
        let context = store_context!(RepositoryOperation::Update, "定时任务", task_key);
        let row = sqlx::query(&format!(
            r#"
            UPDATE scheduled_tasks SET
                cron_expression = COALESCE(?, cron_expression),
                is_active = COALESCE(?, is_active),
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                updated_at = ?
            WHERE task_key = ?
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&update.cron_expression)
        .bind(update.is_active)
        .bind(&update.name)
        .bind(&update.description)
        .bind(Utc::now())
        .bind(task_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        match row {
            Some(row) => {
                let task = Self::row_to_task(&row, &context)?;
                debug!("更新定时任务: {} cron={} active={}", task_key, task.cron_expression, task.is_active);
                Ok(task)
            }
            None => Err(Self::not_found(task_key)),
        }
    }

    #[instrument(skip(self))]
    async fn record_success(&self, task_key: &str) -> GeoResult<()> {
        let context = store_context!(RepositoryOperation::Update, "定时任务", task_key);
        let result = sqlx::query(
            "UPDATE scheduled_tasks SET consecutive_failures = 0, updated_at = ? WHERE task_key = ?",
        )
        .bind(Utc::now())
        .bind(task_key)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(task_key));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_failure(&self, task_key: &str) -> GeoResult<i32> {
        let context = store_context!(RepositoryOperation::Update, "定时任务", task_key);
        let failures: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE scheduled_tasks
            SET consecutive_failures = consecutive_failures + 1, updated_at = ?
            WHERE task_key = ?
            RETURNING consecutive_failures
            "#,
        )
        .bind(Utc::now())
        .bind(task_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        failures.ok_or_else(|| Self::not_found(task_key))
    }

    #[instrument(skip(self))]
    async fn quarantine(&self, task_key: &str, reason: &str, at: DateTime<Utc>) -> GeoResult<()> {
        let context = store_context!(RepositoryOperation::Update, "定时任务", task_key);
        let result = sqlx::query(
            r#"
            UPDATE scheduled_tasks
            SET is_quarantined = 1, quarantine_reason = ?, quarantine_at = ?, updated_at = ?
            WHERE task_key = ?
            "#,
        )
        .bind(reason)
        .bind(at)
        .bind(at)
        .bind(task_key)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(task_key));
        }
        warn!("定时任务已隔离: {} - {}", task_key, reason);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_quarantine(&self, task_key: &str) -> GeoResult<()> {
        let context = store_context!(RepositoryOperation::Update, "定时任务", task_key);
        let result = sqlx::query(
            r#"
            UPDATE scheduled_tasks
            SET is_quarantined = 0, quarantine_reason = NULL, quarantine_at = NULL,
                consecutive_failures = 0, updated_at = ?
            WHERE task_key = ?
            "#,
        )
        .bind(Utc::now())
        .bind(task_key)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(task_key));
        }
        info!("定时任务已解除隔离: {}", task_key);
        Ok(())
    }
}
