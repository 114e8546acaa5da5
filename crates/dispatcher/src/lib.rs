//! # 发布调度核心
//!
//! - [`retry_policy`] - 固定退避表的重试决策
//! - [`concurrency`] - 发布与收录检测共用的全局并发槽位
//! - [`pacing`] - 自动化动作前的随机等待
//! - [`publish_dispatcher`] / [`index_check_dispatcher`] - 单个目标的派发流程
//! - [`jobs`] / [`recovery_service`] - 各定时任务的执行体
//! - [`scheduler`] - cron 调度、热更新、立即执行与任务隔离

pub mod concurrency;
pub mod cron_utils;
pub mod index_check_dispatcher;
pub mod jobs;
pub mod outcome;
pub mod pacing;
pub mod publish_dispatcher;
pub mod recovery_service;
pub mod retry_policy;
pub mod scheduler;

pub use concurrency::{ConcurrencyLimiter, ScopedSlot};
pub use cron_utils::CronScheduler;
pub use index_check_dispatcher::IndexCheckDispatcher;
pub use jobs::{ExecutionLogCleanupJob, IndexCheckJob, JobHandler, PublishScanJob};
pub use outcome::{BatchSummary, DispatchOutcome, IndexCheckDispatchOutcome, SkipReason};
pub use pacing::HumanPacing;
pub use publish_dispatcher::PublishDispatcher;
pub use recovery_service::{RecoveryReport, StaleExecutionRecovery};
pub use retry_policy::{RetryDecision, RetryPolicy};
pub use scheduler::{JobSnapshot, TaskScheduler};
