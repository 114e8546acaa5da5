//! # 存储接口
//!
//! 调度核心依赖的持久化接口。存储层是文章状态、重试次数和执行记录的
//! 唯一可信来源，派发器在动作之前重新读取，在动作之后原子写回。
//!
//! - [`TaskStore`] - 定时任务配置
//! - [`ArticleStore`] - 待发布文章状态
//! - [`ExecutionLogStore`] - 执行记录（追加 + 一次性结束）
//! - [`AccountProvider`] - 平台账号
//! - [`IndexCheckStore`] - 收录检测目标

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    ExecutionFinish, ExecutionLogEntry, IndexCheckTarget, IndexStatus, NewExecutionLog,
    PlatformAccount, PublishFailure, PublishStatus, PublishableArticle, ScheduledTaskConfig,
    TaskScheduleUpdate,
};
use crate::GeoResult;

/// 定时任务配置存储
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 获取全部任务配置
    async fn list(&self) -> GeoResult<Vec<ScheduledTaskConfig>>;

    /// 根据 `task_key` 获取任务配置
    async fn get(&self, task_key: &str) -> GeoResult<Option<ScheduledTaskConfig>>;

    /// 不存在时写入，返回是否新建
    async fn create_if_absent(&self, task: &ScheduledTaskConfig) -> GeoResult<bool>;

    /// 更新 cron / 启用状态等可变字段，`task_key` 不可变
    async fn update_schedule(
        &self,
        task_key: &str,
        update: &TaskScheduleUpdate,
    ) -> GeoResult<ScheduledTaskConfig>;

    /// 运行成功，清零连续失败次数
    async fn record_success(&self, task_key: &str) -> GeoResult<()>;

    /// 运行失败，返回累加后的连续失败次数
    async fn record_failure(&self, task_key: &str) -> GeoResult<i32>;

    /// 隔离任务
    async fn quarantine(&self, task_key: &str, reason: &str, at: DateTime<Utc>) -> GeoResult<()>;

    /// 人工解除隔离并清零连续失败次数
    async fn clear_quarantine(&self, task_key: &str) -> GeoResult<()>;
}

/// 文章状态存储
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn get(&self, id: i64) -> GeoResult<Option<PublishableArticle>>;

    /// 资格扫描：`scheduled` 且重试时间为空或到期，或 `failed` 且重试时间到期；
    /// 正文不是占位文本，且平台在 `platforms` 之中。
    ///
    /// 从未尝试过的文章优先，其余按最近一次尝试时间升序，再按创建时间升序，
    /// 反复被跳过的文章因此不会一直占据批次的前列。
    async fn list_eligible(
        &self,
        now: DateTime<Utc>,
        platforms: &[String],
        limit: i64,
    ) -> GeoResult<Vec<PublishableArticle>>;

    /// 记录一次因前置条件被跳过的尝试，只更新 `last_attempt_at`，不改变发布状态
    async fn record_attempt(&self, id: i64, at: DateTime<Utc>) -> GeoResult<()>;

    /// 比较并交换：仅当状态和重试次数仍与读取时一致才切换为 `publishing`，
    /// 同时记录本次尝试时间
    ///
    /// 返回 `false` 表示已被其它派发抢先处理。
    async fn try_claim(
        &self,
        id: i64,
        expected_status: PublishStatus,
        expected_retry_count: i32,
        now: DateTime<Utc>,
    ) -> GeoResult<bool>;

    async fn mark_published(
        &self,
        id: i64,
        platform_url: Option<&str>,
        at: DateTime<Utc>,
    ) -> GeoResult<()>;

    async fn mark_failed(&self, id: i64, failure: &PublishFailure) -> GeoResult<()>;

    /// 在 `updated_before` 之前进入 `publishing` 且至今未结束的文章
    async fn list_stuck_publishing(
        &self,
        updated_before: DateTime<Utc>,
    ) -> GeoResult<Vec<PublishableArticle>>;
}

/// 执行记录存储
#[async_trait]
pub trait ExecutionLogStore: Send + Sync {
    /// 写入一条 `running` 记录
    async fn start(&self, entry: &NewExecutionLog) -> GeoResult<ExecutionLogEntry>;

    /// 刷新心跳时间
    async fn heartbeat(&self, id: i64, at: DateTime<Utc>) -> GeoResult<()>;

    /// 结束记录；只有仍处于 `running` 的记录会被更新，返回是否生效
    async fn finish(&self, id: i64, finish: &ExecutionFinish) -> GeoResult<bool>;

    async fn get(&self, id: i64) -> GeoResult<Option<ExecutionLogEntry>>;

    /// 某任务的最近记录，按开始时间倒序
    async fn list_by_task(&self, task_key: &str, limit: i64)
        -> GeoResult<Vec<ExecutionLogEntry>>;

    /// 某目标（文章 / 检测目标）的记录，按开始时间倒序
    async fn list_by_target(
        &self,
        task_key: &str,
        target_id: i64,
        limit: i64,
    ) -> GeoResult<Vec<ExecutionLogEntry>>;

    /// 最近存活信号早于 `seen_before` 的 `running` 记录
    async fn list_stale_running(
        &self,
        seen_before: DateTime<Utc>,
    ) -> GeoResult<Vec<ExecutionLogEntry>>;

    async fn count_running(&self) -> GeoResult<i64>;

    /// 删除 `before` 之前结束的记录，返回删除数量
    async fn cleanup_before(&self, before: DateTime<Utc>) -> GeoResult<u64>;
}

/// 平台账号提供者
#[async_trait]
pub trait AccountProvider: Send + Sync {
    /// 获取平台的一个可用账号（最久未使用的优先）
    async fn active_account(&self, platform: &str) -> GeoResult<Option<PlatformAccount>>;

    /// 会话数据无法解析时标记账号失效
    async fn mark_invalid(&self, account_id: i64, reason: &str) -> GeoResult<()>;

    /// 记录账号最近一次被使用的时间
    async fn touch(&self, account_id: i64, at: DateTime<Utc>) -> GeoResult<()>;
}

/// 收录检测目标存储
#[async_trait]
pub trait IndexCheckStore: Send + Sync {
    async fn get(&self, id: i64) -> GeoResult<Option<IndexCheckTarget>>;

    /// 上次检测早于 `before` 或从未检测、且平台在 `platforms` 之中的目标
    ///
    /// 从未尝试过的目标优先，其余按最近一次尝试时间升序。
    async fn list_due(
        &self,
        before: DateTime<Utc>,
        platforms: &[String],
        limit: i64,
    ) -> GeoResult<Vec<IndexCheckTarget>>;

    /// 记录一次检测尝试，不修改检测结果
    async fn record_attempt(&self, id: i64, at: DateTime<Utc>) -> GeoResult<()>;

    async fn record_result(
        &self,
        id: i64,
        status: IndexStatus,
        answer_excerpt: Option<&str>,
        checked_at: DateTime<Utc>,
    ) -> GeoResult<()>;
}
