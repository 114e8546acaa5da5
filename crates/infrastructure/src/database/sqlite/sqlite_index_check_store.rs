use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo_core::{GeoError, GeoResult, IndexCheckStore, IndexCheckTarget, IndexStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;
use tracing::instrument;

use crate::database::mapping::{column, placeholders, MappingHelpers};
use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation, StoreOperationContext};
use crate::store_context;

const TARGET_COLUMNS: &str = "id, keyword_id, keyword, question, platform, article_id, \
    index_status, last_check_time, last_answer_excerpt, last_attempt_at";

#[derive(Clone)]
pub struct SqliteIndexCheckStore {
    pool: SqlitePool,
}

impl SqliteIndexCheckStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, target: &IndexCheckTarget) -> GeoResult<i64> {
        let context = store_context!(RepositoryOperation::Create, "收录检测目标", &target.keyword);
        sqlx::query_scalar(
            r#"
            INSERT INTO index_check_targets
                (keyword_id, keyword, question, platform, article_id, index_status,
                 last_check_time, last_answer_excerpt, last_attempt_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(target.keyword_id)
        .bind(&target.keyword)
        .bind(&target.question)
        .bind(&target.platform)
        .bind(target.article_id)
        .bind(target.index_status.as_str())
        .bind(target.last_check_time)
        .bind(&target.last_answer_excerpt)
        .bind(target.last_attempt_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))
    }

    fn row_to_target(row: &SqliteRow, context: &StoreOperationContext) -> GeoResult<IndexCheckTarget> {
        Ok(IndexCheckTarget {
            id: column(row, "id", context)?,
            keyword_id: column(row, "keyword_id", context)?,
            keyword: column(row, "keyword", context)?,
            question: column(row, "question", context)?,
            platform: column(row, "platform", context)?,
            article_id: column(row, "article_id", context)?,
            index_status: MappingHelpers::index_status(row, "index_status", context)?,
            last_check_time: column(row, "last_check_time", context)?,
            last_answer_excerpt: column(row, "last_answer_excerpt", context)?,
            last_attempt_at: column(row, "last_attempt_at", context)?,
        })
    }
}

#[async_trait]
impl IndexCheckStore for SqliteIndexCheckStore {
    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> GeoResult<Option<IndexCheckTarget>> {
        let context = store_context!(RepositoryOperation::Read, "收录检测目标", id);
        let row = sqlx::query(&format!(
            "SELECT {TARGET_COLUMNS} FROM index_check_targets WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.map(|row| Self::row_to_target(&row, &context)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_due(
        &self,
        before: DateTime<Utc>,
        platforms: &[String],
        limit: i64,
    ) -> GeoResult<Vec<IndexCheckTarget>> {
        if platforms.is_empty() {
            return Ok(Vec::new());
        }

        let context = store_context!(RepositoryOperation::Query, "收录检测目标");
        let sql = format!(
            r#"
            SELECT {TARGET_COLUMNS} FROM index_check_targets
            WHERE (last_check_time IS NULL OR last_check_time <= ?)
            AND platform IN ({})
            ORDER BY last_attempt_at IS NOT NULL, last_attempt_at ASC,
                     last_check_time IS NOT NULL, last_check_time ASC, id ASC
            LIMIT ?
            "#,
            placeholders(platforms.len())
        );

        let mut query = sqlx::query(&sql).bind(before);
        for platform in platforms {
            query = query.bind(platform);
        }
        let rows = query
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        rows.iter()
            .map(|row| Self::row_to_target(row, &context))
            .collect()
    }

    #[instrument(skip(self))]
    async fn record_attempt(&self, id: i64, at: DateTime<Utc>) -> GeoResult<()> {
        let context = store_context!(RepositoryOperation::Update, "收录检测目标", id);
        sqlx::query("UPDATE index_check_targets SET last_attempt_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
        Ok(())
    }

    #[instrument(skip(self, answer_excerpt))]
    async fn record_result(
        &self,
        id: i64,
        status: IndexStatus,
        answer_excerpt: Option<&str>,
        checked_at: DateTime<Utc>,
    ) -> GeoResult<()> {
        let context = store_context!(RepositoryOperation::Update, "收录检测目标", id);
        let result = sqlx::query(
            r#"
            UPDATE index_check_targets
            SET index_status = ?, last_answer_excerpt = ?, last_check_time = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(answer_excerpt)
        .bind(checked_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        if result.rows_affected() == 0 {
            return Err(GeoError::IndexTargetNotFound { id });
        }
        Ok(())
    }
}
