use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo_core::{
    ArticleStore, GeoError, GeoResult, PublishFailure, PublishStatus, PublishableArticle,
    CONTENT_PLACEHOLDER,
};
use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use crate::database::mapping::{column, placeholders, MappingHelpers};
use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation, StoreOperationContext};
use crate::store_context;

const ARTICLE_COLUMNS: &str = "id, title, content, platform, publish_status, retry_count, \
    next_retry_at, error_msg, platform_url, published_at, last_attempt_at, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteArticleStore {
    pool: SqlitePool,
}

impl SqliteArticleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 写入一篇文章，返回新ID
    ///
    /// 文章由内容生成侧创建，调度核心本身只读写发布状态。
    pub async fn insert(&self, article: &PublishableArticle) -> GeoResult<i64> {
        let context = store_context!(RepositoryOperation::Create, "文章", &article.title);
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO articles
                (title, content, platform, publish_status, retry_count, next_retry_at, error_msg,
                 platform_url, published_at, last_attempt_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.platform)
        .bind(article.publish_status.as_str())
        .bind(article.retry_count)
        .bind(article.next_retry_at)
        .bind(&article.error_msg)
        .bind(&article.platform_url)
        .bind(article.published_at)
        .bind(article.last_attempt_at)
        .bind(article.created_at)
        .bind(article.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
        Ok(id)
    }

    fn row_to_article(row: &SqliteRow, context: &StoreOperationContext) -> GeoResult<PublishableArticle> {
        Ok(PublishableArticle {
            id: column(row, "id", context)?,
            title: column(row, "title", context)?,
            content: column(row, "content", context)?,
            platform: column(row, "platform", context)?,
            publish_status: MappingHelpers::publish_status(row, "publish_status", context)?,
            retry_count: column(row, "retry_count", context)?,
            next_retry_at: column(row, "next_retry_at", context)?,
            error_msg: column(row, "error_msg", context)?,
            platform_url: column(row, "platform_url", context)?,
            published_at: column(row, "published_at", context)?,
            last_attempt_at: column(row, "last_attempt_at", context)?,
            created_at: column(row, "created_at", context)?,
            updated_at: column(row, "updated_at", context)?,
        })
    }
}

#[async_trait]
impl ArticleStore for SqliteArticleStore {
    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> GeoResult<Option<PublishableArticle>> {
        let context = store_context!(RepositoryOperation::Read, "文章", id);
        let row = sqlx::query(&format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.map(|row| Self::row_to_article(&row, &context)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_eligible(
        &self,
        now: DateTime<Utc>,
        platforms: &[String],
        limit: i64,
    ) -> GeoResult<Vec<PublishableArticle>> {
        if platforms.is_empty() {
            return Ok(Vec::new());
        }

        let context = store_context!(RepositoryOperation::Query, "待发布文章");
        let sql = format!(
            r#"
            SELECT {ARTICLE_COLUMNS} FROM articles
            WHERE (
                (publish_status = 'scheduled' AND (next_retry_at IS NULL OR next_retry_at <= ?))
                OR (publish_status = 'failed' AND next_retry_at IS NOT NULL AND next_retry_at <= ?)
            )
            AND TRIM(content) <> ''
            AND TRIM(content) <> ?
            AND platform IN ({})
            ORDER BY last_attempt_at IS NOT NULL, last_attempt_at ASC, created_at ASC, id ASC
            LIMIT ?
            "#,
            placeholders(platforms.len())
        );

        let mut query = sqlx::query(&sql)
            .bind(now)
            .bind(now)
            .bind(CONTENT_PLACEHOLDER);
        for platform in platforms {
            query = query.bind(platform);
        }
        let rows = query
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        let mut articles = Vec::with_capacity(rows.len());
        for row in &rows {
            let article = Self::row_to_article(row, &context)?;
            // TRIM 只去掉空格，其余空白字符在这里补判
            if article.is_eligible(now) {
                articles.push(article);
            }
        }
        debug!("资格扫描命中 {} 篇文章", articles.len());
        Ok(articles)
    }

    #[instrument(skip(self))]
    async fn record_attempt(&self, id: i64, at: DateTime<Utc>) -> GeoResult<()> {
        let context = store_context!(RepositoryOperation::Update, "文章", id);
        sqlx::query("UPDATE articles SET last_attempt_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn try_claim(
        &self,
        id: i64,
        expected_status: PublishStatus,
        expected_retry_count: i32,
        now: DateTime<Utc>,
    ) -> GeoResult<bool> {
        let context = store_context!(RepositoryOperation::Claim, "文章", id);
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET publish_status = 'publishing', last_attempt_at = ?, updated_at = ?
            WHERE id = ? AND publish_status = ? AND retry_count = ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(expected_status.as_str())
        .bind(expected_retry_count)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn mark_published(
        &self,
        id: i64,
        platform_url: Option<&str>,
        at: DateTime<Utc>,
    ) -> GeoResult<()> {
        let context = store_context!(RepositoryOperation::Update, "文章", id);
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET publish_status = 'published', platform_url = ?, published_at = ?,
                next_retry_at = NULL, error_msg = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(platform_url)
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        if result.rows_affected() == 0 {
            return Err(GeoError::ArticleNotFound { id });
        }
        Ok(())
    }

    #[instrument(skip(self, failure), fields(retry_count = failure.retry_count))]
    async fn mark_failed(&self, id: i64, failure: &PublishFailure) -> GeoResult<()> {
        let context = store_context!(RepositoryOperation::Update, "文章", id);
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET publish_status = 'failed', retry_count = ?, next_retry_at = ?, error_msg = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(failure.retry_count)
        .bind(failure.next_retry_at)
        .bind(&failure.error_msg)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        if result.rows_affected() == 0 {
            return Err(GeoError::ArticleNotFound { id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_stuck_publishing(
        &self,
        updated_before: DateTime<Utc>,
    ) -> GeoResult<Vec<PublishableArticle>> {
        let context = store_context!(RepositoryOperation::Query, "发布中文章");
        let rows = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE publish_status = 'publishing' AND updated_at < ? ORDER BY id"
        ))
        .bind(updated_before)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        rows.iter()
            .map(|row| Self::row_to_article(row, &context))
            .collect()
    }
}
