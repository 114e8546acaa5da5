use std::panic::{resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tracing::{error, info, instrument, warn};

use geo_core::{
    AccountProvider, ArticleStore, BrowserPool, ExecutionFinish, ExecutionLogEntry,
    ExecutionLogStore, GeoError, GeoResult, NewExecutionLog, NotificationEvent, Notifier,
    PlatformAccount, PublishResult, PublishableArticle, Publisher, PublisherRegistry,
    SessionState, StructuredLogger, PUBLISHED_WRITE_BACK_ERROR, TASK_AUTO_PUBLISH,
};

use crate::concurrency::ConcurrencyLimiter;
use crate::outcome::{panic_message, DispatchOutcome, SkipReason};
use crate::pacing::HumanPacing;
use crate::retry_policy::{RetryDecision, RetryPolicy};

/// 平台发布成功后写回文章状态的尝试次数
const WRITE_BACK_ATTEMPTS: u32 = 3;
const WRITE_BACK_BACKOFF: Duration = Duration::from_millis(200);

/// 通过前置检查、可以进入执行阶段的派发
struct PreparedDispatch {
    article: PublishableArticle,
    account: PlatformAccount,
    session: SessionState,
    publisher: Arc<dyn Publisher>,
}

/// 单篇文章的发布派发器
///
/// 派发流程：
/// 1. 依次检查文章存在、状态可派发、正文就绪、平台已注册、账号可用且会话可解析
/// 2. 在限定时间内获取并发槽位，取不到返回 [`DispatchOutcome::Busy`]
/// 3. 以比较并交换的方式把文章认领为 `publishing`
/// 4. 写入 `running` 执行记录
/// 5. 获取浏览器上下文，随机等待，调用平台发布器（整体受超时约束）
/// 6. 根据结果写回文章状态，并结束执行记录
///
/// 第 4 步之后的任何错误、超时或 panic 都会被转换为失败结果参与重试计数，
/// 执行记录在所有路径上都恰好结束一次。平台已经接受发布时不再进入重试：
/// 状态写回多次失败后，执行记录以 [`PUBLISHED_WRITE_BACK_ERROR`] 结束并保存
/// 文章链接，由自愈扫描补记为 `published`。
pub struct PublishDispatcher {
    articles: Arc<dyn ArticleStore>,
    accounts: Arc<dyn AccountProvider>,
    execution_logs: Arc<dyn ExecutionLogStore>,
    publishers: Arc<PublisherRegistry>,
    browser_pool: Arc<dyn BrowserPool>,
    notifier: Arc<dyn Notifier>,
    limiter: ConcurrencyLimiter,
    retry_policy: RetryPolicy,
    pacing: HumanPacing,
    timeout: Duration,
    instance_id: String,
}

impl PublishDispatcher {
    pub fn new(
        articles: Arc<dyn ArticleStore>,
        accounts: Arc<dyn AccountProvider>,
        execution_logs: Arc<dyn ExecutionLogStore>,
        publishers: Arc<PublisherRegistry>,
        browser_pool: Arc<dyn BrowserPool>,
        notifier: Arc<dyn Notifier>,
        limiter: ConcurrencyLimiter,
    ) -> Self {
        Self {
            articles,
            accounts,
            execution_logs,
            publishers,
            browser_pool,
            notifier,
            limiter,
            retry_policy: RetryPolicy::default(),
            pacing: HumanPacing::disabled(),
            timeout: Duration::from_secs(300),
            instance_id: "local".to_string(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_pacing(mut self, pacing: HumanPacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// 已注册发布器的平台，资格扫描只选取这些平台的文章
    pub fn platforms(&self) -> Vec<String> {
        self.publishers.platforms()
    }

    /// 派发一篇文章，任何错误都不会向外传播
    #[instrument(skip(self), fields(task_key = TASK_AUTO_PUBLISH))]
    pub async fn dispatch(&self, article_id: i64) -> DispatchOutcome {
        let started = std::time::Instant::now();
        let outcome = self.run(article_id).await;

        metrics::counter!(
            "geo_dispatch_total",
            "task" => TASK_AUTO_PUBLISH,
            "outcome" => outcome.label()
        )
        .increment(1);
        metrics::histogram!("geo_dispatch_duration_seconds", "task" => TASK_AUTO_PUBLISH)
            .record(started.elapsed().as_secs_f64());

        if let DispatchOutcome::Skipped(reason) = &outcome {
            StructuredLogger::log_dispatch_skipped(TASK_AUTO_PUBLISH, article_id, &reason.to_string());
        }

        outcome
    }

    async fn run(&self, article_id: i64) -> DispatchOutcome {
        let prepared = match self.prepare(article_id).await {
            Ok(prepared) => prepared,
            Err(reason) => {
                if reason.should_record_attempt() {
                    if let Err(e) = self.articles.record_attempt(article_id, Utc::now()).await {
                        warn!("记录文章 {} 的跳过时间失败: {}", article_id, e);
                    }
                }
                return DispatchOutcome::Skipped(reason);
            }
        };

        let _slot = match self.limiter.try_acquire().await {
            Ok(slot) => slot,
            Err(GeoError::ConcurrencyBusy { waited_ms }) => {
                info!("文章 {} 等待并发槽位 {}ms 未果，下一轮再试", article_id, waited_ms);
                return DispatchOutcome::Busy;
            }
            Err(e) => {
                warn!("文章 {} 获取并发槽位失败: {}", article_id, e);
                return DispatchOutcome::Busy;
            }
        };

        let article = &prepared.article;
        let claimed = self
            .articles
            .try_claim(article.id, article.publish_status, article.retry_count, Utc::now())
            .await;
        match claimed {
            Ok(true) => {}
            Ok(false) => return DispatchOutcome::Skipped(SkipReason::ClaimLost),
            Err(e) => return DispatchOutcome::Skipped(SkipReason::StoreUnavailable(e.to_string())),
        }

        StructuredLogger::log_dispatch_start(
            TASK_AUTO_PUBLISH,
            article.id,
            &article.platform,
            article.retry_count,
        );

        let new_entry = NewExecutionLog::new(TASK_AUTO_PUBLISH, Some(article.id), &self.instance_id)
            .with_retry_count(article.retry_count);
        let entry = match self.execution_logs.start(&new_entry).await {
            Ok(entry) => entry,
            Err(e) => {
                error!("文章 {} 写入执行记录失败: {}", article.id, e);
                return self
                    .record_failure(article, "Database", &format!("写入执行记录失败: {e}"))
                    .await;
            }
        };

        let result = AssertUnwindSafe(self.attempt(&prepared, entry.id))
            .catch_unwind()
            .await;

        let (outcome, finish) = match result {
            Ok(Ok(publish_result)) if publish_result.success => {
                self.record_success(&prepared, publish_result).await
            }
            Ok(Ok(publish_result)) => {
                let message = publish_result
                    .error_msg
                    .unwrap_or_else(|| "发布器返回失败".to_string());
                let outcome = self.record_failure(article, "PublishFailed", &message).await;
                (outcome, ExecutionFinish::failure("PublishFailed", message))
            }
            Ok(Err(e)) => {
                let outcome = self.record_failure(article, e.kind(), &e.to_string()).await;
                (outcome, ExecutionFinish::failure(e.kind(), e.to_string()))
            }
            Err(payload) => {
                let message = panic_message(payload);
                error!("文章 {} 发布过程中发生panic: {}", article.id, message);
                let outcome = self.record_failure(article, "Panic", &message).await;
                (outcome, ExecutionFinish::failure("Panic", message))
            }
        };

        self.finalize(&entry, finish).await;
        outcome
    }

    /// 前置检查，不占用槽位也不修改文章状态
    async fn prepare(&self, article_id: i64) -> Result<PreparedDispatch, SkipReason> {
        let article = self
            .articles
            .get(article_id)
            .await
            .map_err(|e| SkipReason::StoreUnavailable(e.to_string()))?
            .ok_or(SkipReason::NotFound)?;

        if !article.status_dispatchable(Utc::now()) {
            return Err(SkipReason::NotDispatchable(article.publish_status));
        }

        if !article.content_ready() {
            return Err(SkipReason::ContentNotReady);
        }

        let publisher = self
            .publishers
            .get(&article.platform)
            .ok_or_else(|| SkipReason::UnsupportedPlatform(article.platform.clone()))?;

        let account = self
            .accounts
            .active_account(&article.platform)
            .await
            .map_err(|e| SkipReason::StoreUnavailable(e.to_string()))?
            .ok_or_else(|| SkipReason::NoActiveAccount(article.platform.clone()))?;

        let session = match account.decode_session() {
            Ok(session) => session,
            Err(e) => {
                self.invalidate_account(&account, &e.to_string()).await;
                return Err(SkipReason::SessionInvalid(account.id));
            }
        };

        Ok(PreparedDispatch {
            article,
            account,
            session,
            publisher,
        })
    }

    async fn invalidate_account(&self, account: &PlatformAccount, reason: &str) {
        warn!(
            "账号 {}({}) 会话数据无法解析，标记为失效: {}",
            account.account_name, account.platform, reason
        );
        if let Err(e) = self.accounts.mark_invalid(account.id, reason).await {
            error!("标记账号 {} 失效时出错: {}", account.id, e);
        }
        self.notifier
            .notify(NotificationEvent::AccountInvalidated {
                account_id: account.id,
                platform: account.platform.clone(),
                reason: reason.to_string(),
            })
            .await;
    }

    /// 获取浏览器上下文、随机等待后调用发布器，整体受超时约束
    async fn attempt(&self, prepared: &PreparedDispatch, entry_id: i64) -> GeoResult<PublishResult> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let timeout_error = || GeoError::ExecutionTimeout {
            seconds: self.timeout.as_secs(),
        };

        let context = tokio::time::timeout_at(
            deadline,
            self.browser_pool.acquire(&prepared.article.platform),
        )
        .await
        .map_err(|_| timeout_error())??;

        if let Err(e) = self.accounts.touch(prepared.account.id, Utc::now()).await {
            warn!("更新账号 {} 使用时间失败: {}", prepared.account.id, e);
        }

        if tokio::time::timeout_at(deadline, self.pacing.pause()).await.is_err() {
            return Err(timeout_error());
        }

        if let Err(e) = self.execution_logs.heartbeat(entry_id, Utc::now()).await {
            warn!("刷新执行记录 {} 心跳失败: {}", entry_id, e);
        }

        let publish = prepared.publisher.publish(
            &context,
            &prepared.article,
            &prepared.account,
            &prepared.session,
        );
        match tokio::time::timeout_at(deadline, AssertUnwindSafe(publish).catch_unwind()).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => {
                warn!(
                    "文章 {} 发布器panic，销毁浏览器上下文 {}",
                    prepared.article.id, context.id
                );
                self.browser_pool.discard(&context).await;
                resume_unwind(payload)
            }
            Err(_) => {
                warn!(
                    "文章 {} 发布超时（{}秒），销毁浏览器上下文 {}",
                    prepared.article.id,
                    self.timeout.as_secs(),
                    context.id
                );
                self.browser_pool.discard(&context).await;
                Err(timeout_error())
            }
        }
    }

    async fn record_success(
        &self,
        prepared: &PreparedDispatch,
        result: PublishResult,
    ) -> (DispatchOutcome, ExecutionFinish) {
        let article = &prepared.article;
        if let Err(e) = self
            .write_back_published(article.id, result.platform_url.as_deref())
            .await
        {
            error!("文章 {} 已发布但写回状态失败，等待自愈扫描补记: {}", article.id, e);
            let finish = ExecutionFinish::failure(
                PUBLISHED_WRITE_BACK_ERROR,
                format!("发布成功但写回状态失败: {e}"),
            );
            let finish = match &result.platform_url {
                Some(url) => finish.with_summary(url.clone()),
                None => finish,
            };
            return (
                DispatchOutcome::Published {
                    platform_url: result.platform_url,
                },
                finish,
            );
        }

        self.notifier
            .notify(NotificationEvent::ArticlePublished {
                article_id: article.id,
                platform: article.platform.clone(),
                platform_url: result.platform_url.clone(),
            })
            .await;

        let summary = match &result.platform_url {
            Some(url) => format!("发布成功: {url}"),
            None => "发布成功".to_string(),
        };
        (
            DispatchOutcome::Published {
                platform_url: result.platform_url,
            },
            ExecutionFinish::success(summary),
        )
    }

    async fn write_back_published(&self, id: i64, platform_url: Option<&str>) -> GeoResult<()> {
        let mut attempt = 1;
        loop {
            match self.articles.mark_published(id, platform_url, Utc::now()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < WRITE_BACK_ATTEMPTS => {
                    warn!("文章 {} 第 {} 次写回发布状态失败: {}", id, attempt, e);
                    tokio::time::sleep(WRITE_BACK_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 按重试策略写回失败状态
    async fn record_failure(
        &self,
        article: &PublishableArticle,
        error_type: &str,
        error_msg: &str,
    ) -> DispatchOutcome {
        let (decision, failure) = self.retry_policy.failure_for(article, error_msg, Utc::now());

        if let Err(e) = self.articles.mark_failed(article.id, &failure).await {
            error!("文章 {} 写回失败状态出错: {}", article.id, e);
        }

        match (decision, failure.next_retry_at) {
            (RetryDecision::Delay(_), Some(next_retry_at)) => {
                StructuredLogger::log_retry_scheduled(article.id, failure.retry_count, next_retry_at);
            }
            _ => {
                StructuredLogger::log_article_quarantined(article.id, failure.retry_count, error_msg);
                self.notifier
                    .notify(NotificationEvent::ArticleQuarantined {
                        article_id: article.id,
                        platform: article.platform.clone(),
                        retry_count: failure.retry_count,
                        error_msg: error_msg.to_string(),
                    })
                    .await;
            }
        }

        DispatchOutcome::Failed {
            decision,
            error_type: error_type.to_string(),
            error_msg: error_msg.to_string(),
        }
    }

    async fn finalize(&self, entry: &ExecutionLogEntry, finish: ExecutionFinish) {
        match self.execution_logs.finish(entry.id, &finish).await {
            Ok(true) => {}
            Ok(false) => warn!("执行记录 {} 已被提前结束", entry.id),
            Err(e) => error!("结束执行记录 {} 失败: {}", entry.id, e),
        }

        StructuredLogger::log_dispatch_complete(
            TASK_AUTO_PUBLISH,
            entry.target_id.unwrap_or_default(),
            finish.error_type.is_none(),
            (finish.finished_at - entry.started_at).num_milliseconds(),
            finish.error_type.as_deref(),
            finish.error_msg.as_deref(),
        );
    }
}
