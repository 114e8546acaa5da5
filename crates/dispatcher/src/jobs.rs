//! 定时任务的执行体
//!
//! 每个 `task_key` 对应一个 [`JobHandler`]，由 [`crate::scheduler::TaskScheduler`]
//! 按 cron 或手动触发调用。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::future::join_all;
use tracing::{debug, info};

use geo_core::{
    ArticleStore, ExecutionLogStore, GeoResult, IndexCheckStore, TASK_AUTO_PUBLISH,
    TASK_INDEX_CHECK, TASK_LOG_CLEANUP,
};

use crate::index_check_dispatcher::IndexCheckDispatcher;
use crate::outcome::BatchSummary;
use crate::publish_dispatcher::PublishDispatcher;

/// 一次任务运行的执行体
///
/// 返回 `Err` 或 panic 视为任务运行失败，计入连续失败次数；
/// 单个目标派发失败不影响任务本身的成败。
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn task_key(&self) -> &str;

    /// 执行一次，返回写入执行记录的摘要
    async fn run(&self) -> GeoResult<String>;
}

/// 自动发布：扫描可派发文章并逐篇派发
pub struct PublishScanJob {
    articles: Arc<dyn ArticleStore>,
    dispatcher: Arc<PublishDispatcher>,
    batch_size: i64,
}

impl PublishScanJob {
    pub fn new(
        articles: Arc<dyn ArticleStore>,
        dispatcher: Arc<PublishDispatcher>,
        batch_size: i64,
    ) -> Self {
        Self {
            articles,
            dispatcher,
            batch_size,
        }
    }
}

#[async_trait]
impl JobHandler for PublishScanJob {
    fn task_key(&self) -> &str {
        TASK_AUTO_PUBLISH
    }

    async fn run(&self) -> GeoResult<String> {
        let platforms = self.dispatcher.platforms();
        let eligible = self
            .articles
            .list_eligible(Utc::now(), &platforms, self.batch_size)
            .await?;
        if eligible.is_empty() {
            debug!("没有待发布的文章");
            return Ok("没有待发布的文章".to_string());
        }

        info!("本轮扫描到 {} 篇待发布文章", eligible.len());
        let outcomes = join_all(
            eligible
                .iter()
                .map(|article| self.dispatcher.dispatch(article.id)),
        )
        .await;

        let summary = BatchSummary::from_publish(&outcomes);
        info!("自动发布完成: {}", summary);
        Ok(summary.to_string())
    }
}

/// 收录检测：对到期目标逐个检测
pub struct IndexCheckJob {
    targets: Arc<dyn IndexCheckStore>,
    dispatcher: Arc<IndexCheckDispatcher>,
    batch_size: i64,
    recheck_interval: Duration,
}

impl IndexCheckJob {
    pub fn new(
        targets: Arc<dyn IndexCheckStore>,
        dispatcher: Arc<IndexCheckDispatcher>,
        batch_size: i64,
        recheck_interval: Duration,
    ) -> Self {
        Self {
            targets,
            dispatcher,
            batch_size,
            recheck_interval,
        }
    }
}

#[async_trait]
impl JobHandler for IndexCheckJob {
    fn task_key(&self) -> &str {
        TASK_INDEX_CHECK
    }

    async fn run(&self) -> GeoResult<String> {
        let platforms = self.dispatcher.platforms();
        let due = self
            .targets
            .list_due(
                Utc::now() - self.recheck_interval,
                &platforms,
                self.batch_size,
            )
            .await?;
        if due.is_empty() {
            debug!("没有需要检测的收录目标");
            return Ok("没有需要检测的收录目标".to_string());
        }

        let outcomes = join_all(due.iter().map(|target| self.dispatcher.dispatch(target.id))).await;

        let summary = BatchSummary::from_index_checks(&outcomes);
        info!("收录检测完成: {}", summary);
        Ok(summary.to_string())
    }
}

/// 清理过期的执行记录
pub struct ExecutionLogCleanupJob {
    execution_logs: Arc<dyn ExecutionLogStore>,
    retention: Duration,
}

impl ExecutionLogCleanupJob {
    pub fn new(execution_logs: Arc<dyn ExecutionLogStore>, retention: Duration) -> Self {
        Self {
            execution_logs,
            retention,
        }
    }
}

#[async_trait]
impl JobHandler for ExecutionLogCleanupJob {
    fn task_key(&self) -> &str {
        TASK_LOG_CLEANUP
    }

    async fn run(&self) -> GeoResult<String> {
        let before = Utc::now() - self.retention;
        let removed = self.execution_logs.cleanup_before(before).await?;
        info!("清理了 {} 条 {} 之前的执行记录", removed, before.format("%Y-%m-%d"));
        Ok(format!("清理执行记录 {removed} 条"))
    }
}
