use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use geo_core::config::models::DatabaseConfig;
use geo_core::GeoResult;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::sqlite::{
    SqliteAccountProvider, SqliteArticleStore, SqliteExecutionLogStore, SqliteIndexCheckStore,
    SqliteTaskStore,
};
use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};
use crate::store_context;

/// SQLite 连接池及表结构初始化
///
/// 所有存储共用同一个连接池；时间字段全部由调用方显式绑定，
/// 不依赖数据库的 `CURRENT_TIMESTAMP`。
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("无效的数据库URL: {}", config.url))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.connection_timeout_seconds));

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("创建数据库目录失败: {}", parent.display()))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(options)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.url))?;

        info!("数据库连接池已创建: {}", config.url);
        Ok(Self { pool })
    }

    /// 单连接的内存数据库，连接池存活期间数据一直保留
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("创建内存数据库失败")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> GeoResult<()> {
        run_migrations(&self.pool).await
    }

    pub async fn health_check(&self) -> GeoResult<()> {
        let context = store_context!(RepositoryOperation::Query, "数据库");
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn task_store(&self) -> SqliteTaskStore {
        SqliteTaskStore::new(self.pool.clone())
    }

    pub fn article_store(&self) -> SqliteArticleStore {
        SqliteArticleStore::new(self.pool.clone())
    }

    pub fn execution_log_store(&self) -> SqliteExecutionLogStore {
        SqliteExecutionLogStore::new(self.pool.clone())
    }

    pub fn account_provider(&self) -> SqliteAccountProvider {
        SqliteAccountProvider::new(self.pool.clone())
    }

    pub fn index_check_store(&self) -> SqliteIndexCheckStore {
        SqliteIndexCheckStore::new(self.pool.clone())
    }
}

/// 幂等地创建表结构和索引
pub async fn run_migrations(pool: &SqlitePool) -> GeoResult<()> {
    debug!("开始初始化数据库表结构");
    let context = store_context!(RepositoryOperation::Migrate, "数据库表结构");

    let tables = [
        r#"
        CREATE TABLE IF NOT EXISTS scheduled_tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_key TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            cron_expression TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            description TEXT,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            is_quarantined INTEGER NOT NULL DEFAULT 0,
            quarantine_reason TEXT,
            quarantine_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            platform TEXT NOT NULL,
            publish_status TEXT NOT NULL DEFAULT 'generating',
            retry_count INTEGER NOT NULL DEFAULT 0,
            next_retry_at TEXT,
            error_msg TEXT,
            platform_url TEXT,
            published_at TEXT,
            last_attempt_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS platform_accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            platform TEXT NOT NULL,
            account_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            session_payload TEXT NOT NULL DEFAULT '{}',
            invalid_reason TEXT,
            last_used_at TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS execution_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_key TEXT NOT NULL,
            target_id INTEGER,
            instance_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'running',
            started_at TEXT NOT NULL,
            heartbeat_at TEXT NOT NULL,
            finished_at TEXT,
            duration_ms INTEGER,
            result_summary TEXT,
            error_type TEXT,
            error_msg TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS index_check_targets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            keyword_id INTEGER NOT NULL,
            keyword TEXT NOT NULL,
            question TEXT NOT NULL,
            platform TEXT NOT NULL,
            article_id INTEGER,
            index_status TEXT NOT NULL DEFAULT 'unchecked',
            last_check_time TEXT,
            last_answer_excerpt TEXT,
            last_attempt_at TEXT
        )
        "#,
    ];

    for table_sql in tables {
        sqlx::query(table_sql)
            .execute(pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
    }

    // 早期版本创建的表没有尝试时间列
    for table in ["articles", "index_check_targets"] {
        add_column_if_missing(pool, table, "last_attempt_at", "TEXT").await?;
    }

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(publish_status, next_retry_at)",
        "CREATE INDEX IF NOT EXISTS idx_articles_created_at ON articles(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_accounts_platform ON platform_accounts(platform, status)",
        "CREATE INDEX IF NOT EXISTS idx_execution_logs_task ON execution_logs(task_key, started_at)",
        "CREATE INDEX IF NOT EXISTS idx_execution_logs_target ON execution_logs(task_key, target_id)",
        "CREATE INDEX IF NOT EXISTS idx_execution_logs_status ON execution_logs(status)",
        "CREATE INDEX IF NOT EXISTS idx_index_targets_check ON index_check_targets(last_check_time)",
    ];

    for index_sql in indexes {
        sqlx::query(index_sql)
            .execute(pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
    }

    debug!("数据库表结构初始化完成");
    Ok(())
}

async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    definition: &str,
) -> GeoResult<()> {
    let context = store_context!(
        RepositoryOperation::Migrate,
        "数据库列",
        format!("{table}.{column}")
    );
    let exists: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
    if exists > 0 {
        return Ok(());
    }

    info!("为表 {} 添加列 {}", table, column);
    sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
        .execute(pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = DatabaseManager::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
        db.health_check().await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(db.pool())
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|(name,)| name.as_str()).collect();
        for expected in [
            "articles",
            "execution_logs",
            "index_check_targets",
            "platform_accounts",
            "scheduled_tasks",
        ] {
            assert!(names.contains(&expected), "缺少表 {expected}");
        }
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("geo.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            ..DatabaseConfig::default()
        };

        let db = DatabaseManager::new(&config).await.unwrap();
        db.migrate().await.unwrap();
        assert!(path.exists());
        db.close().await;
    }
}
