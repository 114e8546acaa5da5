use std::any::Any;
use std::fmt;

use geo_core::{IndexStatus, PublishStatus};

use crate::retry_policy::RetryDecision;

/// 前置条件不满足时跳过派发的原因，不修改任何状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    NotDispatchable(PublishStatus),
    ContentNotReady,
    UnsupportedPlatform(String),
    NoActiveAccount(String),
    SessionInvalid(i64),
    /// 另一个派发已抢先认领
    ClaimLost,
    StoreUnavailable(String),
}

impl SkipReason {
    /// 目标本身暂时无法派发（平台、账号或正文原因），需要记录本次尝试，
    /// 让扫描先处理其它目标
    pub fn should_record_attempt(&self) -> bool {
        matches!(
            self,
            SkipReason::ContentNotReady
                | SkipReason::UnsupportedPlatform(_)
                | SkipReason::NoActiveAccount(_)
                | SkipReason::SessionInvalid(_)
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => write!(f, "目标不存在"),
            SkipReason::NotDispatchable(status) => write!(f, "当前状态 {status} 不可派发"),
            SkipReason::ContentNotReady => write!(f, "正文尚未生成完成"),
            SkipReason::UnsupportedPlatform(platform) => write!(f, "平台 {platform} 未注册执行器"),
            SkipReason::NoActiveAccount(platform) => write!(f, "平台 {platform} 没有可用账号"),
            SkipReason::SessionInvalid(account_id) => {
                write!(f, "账号 {account_id} 的会话数据无效")
            }
            SkipReason::ClaimLost => write!(f, "已被其它派发认领"),
            SkipReason::StoreUnavailable(message) => write!(f, "读取存储失败: {message}"),
        }
    }
}

/// 单篇文章派发的结果
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Published {
        platform_url: Option<String>,
    },
    Failed {
        decision: RetryDecision,
        error_type: String,
        error_msg: String,
    },
    Skipped(SkipReason),
    /// 等待并发槽位超时，未做任何修改
    Busy,
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Published { .. } => "published",
            DispatchOutcome::Failed {
                decision: RetryDecision::Quarantine,
                ..
            } => "quarantined",
            DispatchOutcome::Failed { .. } => "failed",
            DispatchOutcome::Skipped(_) => "skipped",
            DispatchOutcome::Busy => "busy",
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, DispatchOutcome::Published { .. })
    }
}

/// 单个收录检测目标的派发结果
#[derive(Debug, Clone, PartialEq)]
pub enum IndexCheckDispatchOutcome {
    Checked(IndexStatus),
    Failed { error_type: String, error_msg: String },
    Skipped(SkipReason),
    Busy,
}

impl IndexCheckDispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            IndexCheckDispatchOutcome::Checked(_) => "checked",
            IndexCheckDispatchOutcome::Failed { .. } => "failed",
            IndexCheckDispatchOutcome::Skipped(_) => "skipped",
            IndexCheckDispatchOutcome::Busy => "busy",
        }
    }
}

/// 一轮批量派发的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub quarantined: usize,
    pub skipped: usize,
    pub busy: usize,
}

impl BatchSummary {
    pub fn from_publish(outcomes: &[DispatchOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                DispatchOutcome::Published { .. } => summary.succeeded += 1,
                DispatchOutcome::Failed {
                    decision: RetryDecision::Quarantine,
                    ..
                } => {
                    summary.failed += 1;
                    summary.quarantined += 1;
                }
                DispatchOutcome::Failed { .. } => summary.failed += 1,
                DispatchOutcome::Skipped(_) => summary.skipped += 1,
                DispatchOutcome::Busy => summary.busy += 1,
            }
        }
        summary
    }

    pub fn from_index_checks(outcomes: &[IndexCheckDispatchOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                IndexCheckDispatchOutcome::Checked(_) => summary.succeeded += 1,
                IndexCheckDispatchOutcome::Failed { .. } => summary.failed += 1,
                IndexCheckDispatchOutcome::Skipped(_) => summary.skipped += 1,
                IndexCheckDispatchOutcome::Busy => summary.busy += 1,
            }
        }
        summary
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "共 {} 个: 成功 {}, 失败 {} (隔离 {}), 跳过 {}, 繁忙 {}",
            self.total, self.succeeded, self.failed, self.quarantined, self.skipped, self.busy
        )
    }
}

/// 从 panic 负载中取出可读的消息
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知panic".to_string()
    }
}
