use thiserror::Error;

/// 发布调度系统错误类型定义
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("定时任务未找到: {task_key}")]
    TaskNotFound { task_key: String },

    #[error("文章未找到: {id}")]
    ArticleNotFound { id: i64 },

    #[error("执行记录未找到: {id}")]
    ExecutionLogNotFound { id: i64 },

    #[error("收录检测目标未找到: {id}")]
    IndexTargetNotFound { id: i64 },

    #[error("平台 {platform} 没有可用账号")]
    AccountUnavailable { platform: String },

    #[error("账号 {account_id} 的会话数据无法解析: {message}")]
    SessionDecode { account_id: i64, message: String },

    #[error("平台 {platform} 未注册执行器")]
    UnsupportedPlatform { platform: String },

    #[error("定时任务 {task_key} 没有对应的执行体")]
    HandlerNotRegistered { task_key: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("定时任务 {task_key} 已被隔离: {reason}")]
    TaskQuarantined { task_key: String, reason: String },

    #[error("没有空闲的并发槽位（等待 {waited_ms}ms）")]
    ConcurrencyBusy { waited_ms: u64 },

    #[error("执行超时（{seconds}秒）")]
    ExecutionTimeout { seconds: u64 },

    #[error("浏览器自动化失败: {0}")]
    Automation(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl GeoError {
    /// 稳定的错误类别名称，写入执行记录的 `error_type` 字段
    pub fn kind(&self) -> &'static str {
        match self {
            GeoError::Database(_) | GeoError::DatabaseOperation(_) => "Database",
            GeoError::TaskNotFound { .. } => "TaskNotFound",
            GeoError::ArticleNotFound { .. } => "ArticleNotFound",
            GeoError::ExecutionLogNotFound { .. } => "ExecutionLogNotFound",
            GeoError::IndexTargetNotFound { .. } => "IndexTargetNotFound",
            GeoError::AccountUnavailable { .. } => "AccountUnavailable",
            GeoError::SessionDecode { .. } => "SessionDecode",
            GeoError::UnsupportedPlatform { .. } => "UnsupportedPlatform",
            GeoError::HandlerNotRegistered { .. } => "HandlerNotRegistered",
            GeoError::InvalidCron { .. } => "InvalidCron",
            GeoError::TaskQuarantined { .. } => "TaskQuarantined",
            GeoError::ConcurrencyBusy { .. } => "ConcurrencyBusy",
            GeoError::ExecutionTimeout { .. } => "Timeout",
            GeoError::Automation(_) => "Automation",
            GeoError::Serialization(_) => "Serialization",
            GeoError::Configuration(_) => "Configuration",
            GeoError::Network(_) => "Network",
            GeoError::Internal(_) => "Internal",
        }
    }

    /// 是否属于可重试的瞬时故障
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GeoError::Automation(_)
                | GeoError::ExecutionTimeout { .. }
                | GeoError::Network(_)
                | GeoError::Internal(_)
        )
    }
}

/// 统一的Result类型
pub type GeoResult<T> = std::result::Result<T, GeoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_is_stable() {
        assert_eq!(GeoError::ExecutionTimeout { seconds: 30 }.kind(), "Timeout");
        assert_eq!(GeoError::Automation("元素未找到".into()).kind(), "Automation");
        assert_eq!(
            GeoError::SessionDecode {
                account_id: 1,
                message: "bad".into()
            }
            .kind(),
            "SessionDecode"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(GeoError::Automation("导航超时".into()).is_transient());
        assert!(GeoError::ExecutionTimeout { seconds: 1 }.is_transient());
        assert!(!GeoError::ArticleNotFound { id: 1 }.is_transient());
        assert!(!GeoError::ConcurrencyBusy { waited_ms: 10 }.is_transient());
    }
}
