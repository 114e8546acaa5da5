use std::panic::{resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tracing::{error, instrument, warn};

use geo_core::{
    BrowserPool, ExecutionFinish, ExecutionLogStore, GeoError, GeoResult, IndexCheckOutcome,
    IndexCheckStore, IndexCheckTarget, IndexChecker, IndexCheckerRegistry, NewExecutionLog,
    StructuredLogger, TASK_INDEX_CHECK,
};

use crate::concurrency::ConcurrencyLimiter;
use crate::outcome::{panic_message, IndexCheckDispatchOutcome, SkipReason};
use crate::pacing::HumanPacing;

/// 收录检测派发器
///
/// 与发布派发器共用并发槽位。检测属于尽力而为的监控，失败只记录日志，
/// 目标保持原状等待下一轮检测，不做退避重试。
pub struct IndexCheckDispatcher {
    targets: Arc<dyn IndexCheckStore>,
    execution_logs: Arc<dyn ExecutionLogStore>,
    checkers: Arc<IndexCheckerRegistry>,
    browser_pool: Arc<dyn BrowserPool>,
    limiter: ConcurrencyLimiter,
    pacing: HumanPacing,
    timeout: Duration,
    instance_id: String,
}

impl IndexCheckDispatcher {
    pub fn new(
        targets: Arc<dyn IndexCheckStore>,
        execution_logs: Arc<dyn ExecutionLogStore>,
        checkers: Arc<IndexCheckerRegistry>,
        browser_pool: Arc<dyn BrowserPool>,
        limiter: ConcurrencyLimiter,
    ) -> Self {
        Self {
            targets,
            execution_logs,
            checkers,
            browser_pool,
            limiter,
            pacing: HumanPacing::disabled(),
            timeout: Duration::from_secs(180),
            instance_id: "local".to_string(),
        }
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

    /// 已注册检测器的平台
    pub fn platforms(&self) -> Vec<String> {
        self.checkers.platforms()
    }

    #[instrument(skip(self), fields(task_key = TASK_INDEX_CHECK))]
    pub async fn dispatch(&self, target_id: i64) -> IndexCheckDispatchOutcome {
        let started = std::time::Instant::now();
        let outcome = self.run(target_id).await;

        metrics::counter!(
            "geo_dispatch_total",
            "task" => TASK_INDEX_CHECK,
            "outcome" => outcome.label()
        )
        .increment(1);
        metrics::histogram!("geo_dispatch_duration_seconds", "task" => TASK_INDEX_CHECK)
            .record(started.elapsed().as_secs_f64());

        if let IndexCheckDispatchOutcome::Skipped(reason) = &outcome {
            StructuredLogger::log_dispatch_skipped(TASK_INDEX_CHECK, target_id, &reason.to_string());
        }

        outcome
    }

    async fn run(&self, target_id: i64) -> IndexCheckDispatchOutcome {
        let target = match self.targets.get(target_id).await {
            Ok(Some(target)) => target,
            Ok(None) => return IndexCheckDispatchOutcome::Skipped(SkipReason::NotFound),
            Err(e) => {
                return IndexCheckDispatchOutcome::Skipped(SkipReason::StoreUnavailable(
                    e.to_string(),
                ))
            }
        };

        let Some(checker) = self.checkers.get(&target.platform) else {
            self.record_attempt(target.id).await;
            return IndexCheckDispatchOutcome::Skipped(SkipReason::UnsupportedPlatform(
                target.platform.clone(),
            ));
        };

        let _slot = match self.limiter.try_acquire().await {
            Ok(slot) => slot,
            Err(e) => {
                warn!("收录检测目标 {} 未获取到并发槽位: {}", target.id, e);
                return IndexCheckDispatchOutcome::Busy;
            }
        };

        // 检测失败时目标保持原状，只靠尝试时间让它排到后面
        self.record_attempt(target.id).await;

        StructuredLogger::log_dispatch_start(TASK_INDEX_CHECK, target.id, &target.platform, 0);

        let new_entry = NewExecutionLog::new(TASK_INDEX_CHECK, Some(target.id), &self.instance_id);
        let entry = match self.execution_logs.start(&new_entry).await {
            Ok(entry) => entry,
            Err(e) => {
                error!("收录检测目标 {} 写入执行记录失败: {}", target.id, e);
                return IndexCheckDispatchOutcome::Failed {
                    error_type: e.kind().to_string(),
                    error_msg: e.to_string(),
                };
            }
        };

        let result = AssertUnwindSafe(self.attempt(&target, checker, entry.id))
            .catch_unwind()
            .await;

        let (outcome, finish) = match result {
            Ok(Ok(check)) => self.record_result(&target, check).await,
            Ok(Err(e)) => (
                IndexCheckDispatchOutcome::Failed {
                    error_type: e.kind().to_string(),
                    error_msg: e.to_string(),
                },
                ExecutionFinish::failure(e.kind(), e.to_string()),
            ),
            Err(payload) => {
                let message = panic_message(payload);
                error!("收录检测目标 {} 执行过程中发生panic: {}", target.id, message);
                (
                    IndexCheckDispatchOutcome::Failed {
                        error_type: "Panic".to_string(),
                        error_msg: message.clone(),
                    },
                    ExecutionFinish::failure("Panic", message),
                )
            }
        };

        match self.execution_logs.finish(entry.id, &finish).await {
            Ok(true) => {}
            Ok(false) => warn!("执行记录 {} 已被提前结束", entry.id),
            Err(e) => error!("结束执行记录 {} 失败: {}", entry.id, e),
        }
        StructuredLogger::log_dispatch_complete(
            TASK_INDEX_CHECK,
            target.id,
            finish.error_type.is_none(),
            (finish.finished_at - entry.started_at).num_milliseconds(),
            finish.error_type.as_deref(),
            finish.error_msg.as_deref(),
        );

        outcome
    }

    async fn attempt(
        &self,
        target: &IndexCheckTarget,
        checker: Arc<dyn IndexChecker>,
        entry_id: i64,
    ) -> GeoResult<IndexCheckOutcome> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let timeout_error = || GeoError::ExecutionTimeout {
            seconds: self.timeout.as_secs(),
        };

        let context = tokio::time::timeout_at(deadline, self.browser_pool.acquire(&target.platform))
            .await
            .map_err(|_| timeout_error())??;

        if tokio::time::timeout_at(deadline, self.pacing.pause()).await.is_err() {
            return Err(timeout_error());
        }

        if let Err(e) = self.execution_logs.heartbeat(entry_id, Utc::now()).await {
            warn!("刷新执行记录 {} 心跳失败: {}", entry_id, e);
        }

        let check = AssertUnwindSafe(checker.check(&context, target)).catch_unwind();
        match tokio::time::timeout_at(deadline, check).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => {
                warn!(
                    "收录检测目标 {} 检测器panic，销毁浏览器上下文 {}",
                    target.id, context.id
                );
                self.browser_pool.discard(&context).await;
                resume_unwind(payload)
            }
            Err(_) => {
                warn!(
                    "收录检测目标 {} 超时（{}秒），销毁浏览器上下文 {}",
                    target.id,
                    self.timeout.as_secs(),
                    context.id
                );
                self.browser_pool.discard(&context).await;
                Err(timeout_error())
            }
        }
    }

    async fn record_attempt(&self, target_id: i64) {
        if let Err(e) = self.targets.record_attempt(target_id, Utc::now()).await {
            warn!("记录收录检测目标 {} 的尝试时间失败: {}", target_id, e);
        }
    }

    async fn record_result(
        &self,
        target: &IndexCheckTarget,
        check: IndexCheckOutcome,
    ) -> (IndexCheckDispatchOutcome, ExecutionFinish) {
        let status = check.index_status();
        if let Err(e) = self
            .targets
            .record_result(target.id, status, check.answer_excerpt.as_deref(), Utc::now())
            .await
        {
            error!("收录检测目标 {} 写回结果失败: {}", target.id, e);
            return (
                IndexCheckDispatchOutcome::Failed {
                    error_type: e.kind().to_string(),
                    error_msg: e.to_string(),
                },
                ExecutionFinish::failure(e.kind(), e.to_string()),
            );
        }

        let summary = format!(
            "{} @ {}: {}",
            target.keyword,
            target.platform,
            status.as_str()
        );
        (
            IndexCheckDispatchOutcome::Checked(status),
            ExecutionFinish::success(summary),
        )
    }
}
