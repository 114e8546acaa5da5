//! SQLite 行到领域模型的映射工具
//!
//! 状态类字段以小写字符串存储，读取时统一在这里解析。

use std::str::FromStr;

use geo_core::{
    AccountStatus, ExecutionStatus, GeoResult, IndexStatus, PublishStatus,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error_handling::{RepositoryErrorHelpers, StoreOperationContext};

pub struct MappingHelpers;

impl MappingHelpers {
    fn text(row: &SqliteRow, column: &str, context: &StoreOperationContext) -> GeoResult<String> {
        row.try_get::<String, _>(column)
            .map_err(|e| RepositoryErrorHelpers::database_error(context, e))
    }

    pub fn publish_status(
        row: &SqliteRow,
        column: &str,
        context: &StoreOperationContext,
    ) -> GeoResult<PublishStatus> {
        let value = Self::text(row, column, context)?;
        PublishStatus::from_str(&value)
            .map_err(|_| RepositoryErrorHelpers::invalid_value(context, column, &value))
    }

    pub fn execution_status(
        row: &SqliteRow,
        column: &str,
        context: &StoreOperationContext,
    ) -> GeoResult<ExecutionStatus> {
        let value = Self::text(row, column, context)?;
        ExecutionStatus::from_str(&value)
            .map_err(|_| RepositoryErrorHelpers::invalid_value(context, column, &value))
    }

    pub fn account_status(
        row: &SqliteRow,
        column: &str,
        context: &StoreOperationContext,
    ) -> GeoResult<AccountStatus> {
        let value = Self::text(row, column, context)?;
        AccountStatus::parse(&value)
            .ok_or_else(|| RepositoryErrorHelpers::invalid_value(context, column, &value))
    }

    pub fn index_status(
        row: &SqliteRow,
        column: &str,
        context: &StoreOperationContext,
    ) -> GeoResult<IndexStatus> {
        let value = Self::text(row, column, context)?;
        IndexStatus::parse(&value)
            .ok_or_else(|| RepositoryErrorHelpers::invalid_value(context, column, &value))
    }
}

/// 读取单列，sqlx 错误附带上下文
pub(crate) fn column<'r, T>(
    row: &'r SqliteRow,
    name: &str,
    context: &StoreOperationContext,
) -> GeoResult<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get::<T, _>(name)
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))
}

/// `IN (...)` 使用的占位符列表，如 `?, ?, ?`
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::placeholders;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
