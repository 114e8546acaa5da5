use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo_core::{AccountProvider, AccountStatus, GeoResult, PlatformAccount};
use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;
use tracing::{instrument, warn};

use crate::database::mapping::{column, MappingHelpers};
use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation, StoreOperationContext};
use crate::store_context;

const ACCOUNT_COLUMNS: &str =
    "id, platform, account_name, status, session_payload, invalid_reason, last_used_at, updated_at";

#[derive(Clone)]
pub struct SqliteAccountProvider {
    pool: SqlitePool,
}

impl SqliteAccountProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, account: &PlatformAccount) -> GeoResult<i64> {
        let context = store_context!(RepositoryOperation::Create, "平台账号", &account.account_name);
        sqlx::query_scalar(
            r#"
            INSERT INTO platform_accounts
                (platform, account_name, status, session_payload, invalid_reason, last_used_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&account.platform)
        .bind(&account.account_name)
        .bind(account.status.as_str())
        .bind(&account.session_payload)
        .bind(&account.invalid_reason)
        .bind(account.last_used_at)
        .bind(account.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))
    }

    pub async fn get(&self, id: i64) -> GeoResult<Option<PlatformAccount>> {
        let context = store_context!(RepositoryOperation::Read, "平台账号", id);
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM platform_accounts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.map(|row| Self::row_to_account(&row, &context)).transpose()
    }

    fn row_to_account(row: &SqliteRow, context: &StoreOperationContext) -> GeoResult<PlatformAccount> {
        Ok(PlatformAccount {
            id: column(row, "id", context)?,
            platform: column(row, "platform", context)?,
            account_name: column(row, "account_name", context)?,
            status: MappingHelpers::account_status(row, "status", context)?,
            session_payload: column(row, "session_payload", context)?,
            invalid_reason: column(row, "invalid_reason", context)?,
            last_used_at: column(row, "last_used_at", context)?,
            updated_at: column(row, "updated_at", context)?,
        })
    }
}

#[async_trait]
impl AccountProvider for SqliteAccountProvider {
    /// 从未使用过的账号排在最前，其次按最近使用时间升序
    #[instrument(skip(self))]
    async fn active_account(&self, platform: &str) -> GeoResult<Option<PlatformAccount>> {
        let context = store_context!(RepositoryOperation::Query, "平台账号", platform);
        let row = sqlx::query(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS} FROM platform_accounts
            WHERE platform = ? AND status = ?
            ORDER BY last_used_at IS NOT NULL, last_used_at ASC, id ASC
            LIMIT 1
            "#
        ))
        .bind(platform)
        .bind(AccountStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.map(|row| Self::row_to_account(&row, &context)).transpose()
    }

    #[instrument(skip(self))]
    async fn mark_invalid(&self, account_id: i64, reason: &str) -> GeoResult<()> {
        let context = store_context!(RepositoryOperation::Update, "平台账号", account_id);
        sqlx::query(
            "UPDATE platform_accounts SET status = ?, invalid_reason = ?, updated_at = ? WHERE id = ?",
        )
        .bind(AccountStatus::Invalid.as_str())
        .bind(reason)
        .bind(Utc::now())
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        warn!("平台账号 {} 已标记为失效: {}", account_id, reason);
        Ok(())
    }

    async fn touch(&self, account_id: i64, at: DateTime<Utc>) -> GeoResult<()> {
        let context = store_context!(RepositoryOperation::Update, "平台账号", account_id);
        sqlx::query("UPDATE platform_accounts SET last_used_at = ? WHERE id = ?")
            .bind(at)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
        Ok(())
    }
}
