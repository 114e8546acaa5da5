//! 存储操作的错误上下文
//!
//! 把 sqlx 错误连同操作类型、实体描述一起转换为 [`GeoError`]，
//! 并在转换时记录结构化日志。

use std::fmt;

use geo_core::GeoError;
use sqlx::Error as SqlxError;
use tracing::error;

/// 存储操作类型
#[derive(Debug, Clone, Copy)]
pub enum RepositoryOperation {
    Create,
    Read,
    Update,
    Delete,
    Query,
    Claim,
    Migrate,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Delete => write!(f, "删除"),
            RepositoryOperation::Query => write!(f, "查询"),
            RepositoryOperation::Claim => write!(f, "抢占"),
            RepositoryOperation::Migrate => write!(f, "初始化"),
        }
    }
}

/// 一次存储操作的上下文
#[derive(Debug, Clone)]
pub struct StoreOperationContext {
    pub operation: RepositoryOperation,
    pub entity: &'static str,
    pub key: Option<String>,
}

impl StoreOperationContext {
    pub fn new(operation: RepositoryOperation, entity: &'static str) -> Self {
        Self {
            operation,
            entity,
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl fmt::Display) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn entity_description(&self) -> String {
        match &self.key {
            Some(key) => format!("{} ({})", self.entity, key),
            None => self.entity.to_string(),
        }
    }
}

/// 构造带上下文的存储错误
#[macro_export]
macro_rules! store_context {
    ($op:expr, $entity:expr) => {
        $crate::error_handling::StoreOperationContext::new($op, $entity)
    };
    ($op:expr, $entity:expr, $key:expr) => {
        $crate::error_handling::StoreOperationContext::new($op, $entity).with_key($key)
    };
}

pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    pub fn database_error(context: &StoreOperationContext, error: SqlxError) -> GeoError {
        let entity_desc = context.entity_description();
        let operation_desc = context.operation.to_string();

        let error_msg = match &error {
            SqlxError::Database(db_error) => match db_error.constraint() {
                Some(constraint) => format!(
                    "{operation_desc}{entity_desc}时发生数据库约束冲突: {constraint}"
                ),
                None => format!("{operation_desc}{entity_desc}时发生数据库错误: {db_error}"),
            },
            SqlxError::PoolClosed => format!("{operation_desc}{entity_desc}时数据库连接池已关闭"),
            SqlxError::PoolTimedOut => format!("{operation_desc}{entity_desc}时数据库连接池超时"),
            SqlxError::ColumnDecode { index, source } => {
                format!("{operation_desc}{entity_desc}时字段 {index} 解析失败: {source}")
            }
            _ => format!("{operation_desc}{entity_desc}时发生未知数据库错误: {error}"),
        };

        error!(error = %error, "{}", error_msg);
        GeoError::DatabaseOperation(error_msg)
    }

    /// 数据库里存放了无法识别的枚举值
    pub fn invalid_value(context: &StoreOperationContext, column: &str, value: &str) -> GeoError {
        let error_msg = format!(
            "{}{}时字段 {} 的值无法识别: {}",
            context.operation,
            context.entity_description(),
            column,
            value
        );
        error!("{}", error_msg);
        GeoError::DatabaseOperation(error_msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_description_includes_key() {
        let context = store_context!(RepositoryOperation::Update, "文章", 42);
        assert_eq!(context.entity_description(), "文章 (42)");
        let context = store_context!(RepositoryOperation::Query, "执行记录");
        assert_eq!(context.entity_description(), "执行记录");
    }

    #[test]
    fn test_pool_closed_maps_to_database_kind() {
        let context = store_context!(RepositoryOperation::Read, "定时任务", "auto_publish");
        let err = RepositoryErrorHelpers::database_error(&context, SqlxError::PoolClosed);
        assert_eq!(err.kind(), "Database");
        assert!(err.to_string().contains("查询定时任务 (auto_publish)时数据库连接池已关闭"));
    }
}
