use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use geo_core::{
    ArticleStore, ExecutionFinish, ExecutionLogEntry, ExecutionLogStore, GeoResult,
    NotificationEvent, Notifier, PublishStatus, PublishableArticle, StructuredLogger,
    TASK_AUTO_PUBLISH, TASK_STALE_SWEEP,
};

use crate::jobs::JobHandler;
use crate::retry_policy::{RetryDecision, RetryPolicy};

/// 恢复报告
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// 因失去心跳被结束的执行记录
    pub abandoned_executions: Vec<i64>,
    /// 从 `publishing` 释放回重试流程的文章
    pub released_articles: Vec<i64>,
    /// 释放时重试预算已耗尽而被隔离的文章
    pub quarantined_articles: Vec<i64>,
    /// 平台已发布、仅状态写回丢失而被补记为 `published` 的文章
    pub completed_publishes: Vec<i64>,
    pub recovery_duration_ms: u64,
    pub errors: Vec<String>,
}

impl RecoveryReport {
    pub fn summary(&self) -> String {
        format!(
            "结束失联记录 {} 条, 释放文章 {} 篇 (隔离 {}), 补记发布 {} 篇, 错误 {} 个",
            self.abandoned_executions.len(),
            self.released_articles.len(),
            self.quarantined_articles.len(),
            self.completed_publishes.len(),
            self.errors.len()
        )
    }
}

/// 自愈扫描
///
/// 进程崩溃或任务被强制中断后，执行记录会停留在 `running`，文章会停留在
/// `publishing`。扫描把超过阈值没有心跳的记录按失败结束，并把卡住的文章
/// 按重试策略写回 `failed`，使其重新进入调度或进入人工处理。平台已经接受
/// 发布、只是状态没有写回的文章直接补记为 `published`，不会被重复发布。
pub struct StaleExecutionRecovery {
    execution_logs: Arc<dyn ExecutionLogStore>,
    articles: Arc<dyn ArticleStore>,
    notifier: Arc<dyn Notifier>,
    retry_policy: RetryPolicy,
    stale_threshold: Duration,
}

impl StaleExecutionRecovery {
    pub fn new(
        execution_logs: Arc<dyn ExecutionLogStore>,
        articles: Arc<dyn ArticleStore>,
        notifier: Arc<dyn Notifier>,
        retry_policy: RetryPolicy,
        stale_threshold: Duration,
    ) -> Self {
        Self {
            execution_logs,
            articles,
            notifier,
            retry_policy,
            stale_threshold,
        }
    }

    pub async fn sweep(&self) -> GeoResult<RecoveryReport> {
        let started = Instant::now();
        let now = Utc::now();
        let cutoff = now - self.stale_threshold;
        let mut report = RecoveryReport::default();

        let stale = self.execution_logs.list_stale_running(cutoff).await?;
        for entry in stale {
            if let Err(e) = self.abandon_execution(&entry, &mut report).await {
                error!("结束失联执行记录 {} 失败: {}", entry.id, e);
                report.errors.push(format!("execution {}: {e}", entry.id));
            }
        }

        let stuck = self.articles.list_stuck_publishing(cutoff).await?;
        for article in stuck {
            let latest = self.latest_execution(article.id).await?;
            if latest
                .as_ref()
                .is_some_and(|entry| entry.is_running() && entry.last_seen() > cutoff)
            {
                continue;
            }

            let result = match latest.filter(ExecutionLogEntry::is_unrecorded_publish) {
                Some(entry) => self.complete_publish(&article, &entry, &mut report).await,
                None => {
                    self.release_article(&article, "发布过程中断，未留下执行结果", &mut report)
                        .await
                }
            };
            if let Err(e) = result {
                error!("处理卡住的文章 {} 失败: {}", article.id, e);
                report.errors.push(format!("article {}: {e}", article.id));
            }
        }

        report.recovery_duration_ms = started.elapsed().as_millis() as u64;
        if !report.abandoned_executions.is_empty()
            || !report.released_articles.is_empty()
            || !report.completed_publishes.is_empty()
        {
            info!("自愈扫描完成: {}", report.summary());
        }
        Ok(report)
    }

    async fn abandon_execution(
        &self,
        entry: &ExecutionLogEntry,
        report: &mut RecoveryReport,
    ) -> GeoResult<()> {
        StructuredLogger::log_stale_execution(entry.id, &entry.task_key, entry.last_seen());

        let message = format!(
            "执行记录超过 {} 分钟没有心跳",
            self.stale_threshold.num_minutes()
        );
        let finished = self
            .execution_logs
            .finish(entry.id, &ExecutionFinish::failure("Abandoned", &message))
            .await?;
        if !finished {
            return Ok(());
        }
        report.abandoned_executions.push(entry.id);

        if entry.task_key != TASK_AUTO_PUBLISH {
            return Ok(());
        }
        let Some(article_id) = entry.target_id else {
            return Ok(());
        };

        if let Some(article) = self.articles.get(article_id).await? {
            if article.publish_status == PublishStatus::Publishing {
                self.release_article(&article, &message, report).await?;
            }
        }
        Ok(())
    }

    /// 文章最近一条发布执行记录
    async fn latest_execution(&self, article_id: i64) -> GeoResult<Option<ExecutionLogEntry>> {
        let mut recent = self
            .execution_logs
            .list_by_target(TASK_AUTO_PUBLISH, article_id, 1)
            .await?;
        Ok(recent.pop())
    }

    async fn complete_publish(
        &self,
        article: &PublishableArticle,
        entry: &ExecutionLogEntry,
        report: &mut RecoveryReport,
    ) -> GeoResult<()> {
        let platform_url = entry.result_summary.as_deref();
        let published_at = entry.finished_at.unwrap_or_else(Utc::now);
        self.articles
            .mark_published(article.id, platform_url, published_at)
            .await?;
        report.completed_publishes.push(article.id);

        info!(
            "文章 {} 已在平台发布但状态未写回，按执行记录 {} 补记为已发布",
            article.id, entry.id
        );
        self.notifier
            .notify(NotificationEvent::ArticlePublished {
                article_id: article.id,
                platform: article.platform.clone(),
                platform_url: platform_url.map(str::to_string),
            })
            .await;
        Ok(())
    }

    async fn release_article(
        &self,
        article: &PublishableArticle,
        reason: &str,
        report: &mut RecoveryReport,
    ) -> GeoResult<()> {
        let (decision, failure) = self.retry_policy.failure_for(article, reason, Utc::now());
        self.articles.mark_failed(article.id, &failure).await?;
        report.released_articles.push(article.id);

        match decision {
            RetryDecision::Delay(_) => {
                warn!(
                    "文章 {} 卡在发布中，已释放并安排第 {} 次重试",
                    article.id, failure.retry_count
                );
            }
            RetryDecision::Quarantine => {
                StructuredLogger::log_article_quarantined(article.id, failure.retry_count, reason);
                report.quarantined_articles.push(article.id);
                self.notifier
                    .notify(NotificationEvent::ArticleQuarantined {
                        article_id: article.id,
                        platform: article.platform.clone(),
                        retry_count: failure.retry_count,
                        error_msg: reason.to_string(),
                    })
                    .await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobHandler for StaleExecutionRecovery {
    fn task_key(&self) -> &str {
        TASK_STALE_SWEEP
    }

    async fn run(&self) -> GeoResult<String> {
        let report = self.sweep().await?;
        Ok(report.summary())
    }
}
