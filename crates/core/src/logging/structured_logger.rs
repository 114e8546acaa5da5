use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// 调度事件的结构化日志
pub struct StructuredLogger;

impl StructuredLogger {
    /// 定时任务注册到调度器
    pub fn log_job_scheduled(task_key: &str, cron_expression: &str, next_fire: Option<DateTime<Utc>>) {
        info!(
            event = "job_scheduled",
            task.key = task_key,
            task.cron = cron_expression,
            task.next_fire = ?next_fire,
            "定时任务已注册"
        );
    }

    pub fn log_job_unscheduled(task_key: &str, reason: &str) {
        info!(
            event = "job_unscheduled",
            task.key = task_key,
            reason = reason,
            "定时任务已移出调度"
        );
    }

    /// 任务触发（cron 或立即执行）
    pub fn log_job_fired(task_key: &str, manual: bool) {
        debug!(
            event = "job_fired",
            task.key = task_key,
            task.manual = manual,
            "定时任务触发"
        );
    }

    pub fn log_job_skipped(task_key: &str, reason: &str) {
        warn!(
            event = "job_skipped",
            task.key = task_key,
            reason = reason,
            "本次触发被跳过"
        );
    }

    pub fn log_job_complete(
        task_key: &str,
        success: bool,
        duration_ms: i64,
        summary: Option<&str>,
        error_message: Option<&str>,
    ) {
        if success {
            info!(
                event = "job_complete",
                task.key = task_key,
                task.duration_ms = duration_ms,
                task.summary = summary.unwrap_or(""),
                "定时任务运行完成"
            );
        } else {
            error!(
                event = "job_failed",
                task.key = task_key,
                task.duration_ms = duration_ms,
                task.error = error_message.unwrap_or("未知错误"),
                "定时任务运行失败"
            );
        }
    }

    pub fn log_job_quarantined(task_key: &str, consecutive_failures: i32, reason: &str) {
        error!(
            event = "job_quarantined",
            task.key = task_key,
            task.consecutive_failures = consecutive_failures,
            reason = reason,
            "定时任务连续失败，已隔离"
        );
    }

    /// 单篇文章 / 单个检测目标的派发开始
    pub fn log_dispatch_start(task_key: &str, target_id: i64, platform: &str, retry_count: i32) {
        info!(
            event = "dispatch_start",
            task.key = task_key,
            target.id = target_id,
            target.platform = platform,
            target.retry_count = retry_count,
            "开始派发"
        );
    }

    pub fn log_dispatch_skipped(task_key: &str, target_id: i64, reason: &str) {
        debug!(
            event = "dispatch_skipped",
            task.key = task_key,
            target.id = target_id,
            reason = reason,
            "跳过派发"
        );
    }

    pub fn log_dispatch_complete(
        task_key: &str,
        target_id: i64,
        success: bool,
        duration_ms: i64,
        error_type: Option<&str>,
        error_message: Option<&str>,
    ) {
        if success {
            info!(
                event = "dispatch_complete",
                task.key = task_key,
                target.id = target_id,
                dispatch.duration_ms = duration_ms,
                "派发成功"
            );
        } else {
            warn!(
                event = "dispatch_failed",
                task.key = task_key,
                target.id = target_id,
                dispatch.duration_ms = duration_ms,
                dispatch.error_type = error_type.unwrap_or("Unknown"),
                dispatch.error = error_message.unwrap_or("未知错误"),
                "派发失败"
            );
        }
    }

    pub fn log_retry_scheduled(article_id: i64, retry_count: i32, next_retry_at: DateTime<Utc>) {
        info!(
            event = "retry_scheduled",
            article.id = article_id,
            article.retry_count = retry_count,
            article.next_retry_at = %next_retry_at,
            "已安排重试"
        );
    }

    pub fn log_article_quarantined(article_id: i64, retry_count: i32, error_message: &str) {
        error!(
            event = "article_quarantined",
            article.id = article_id,
            article.retry_count = retry_count,
            article.error = error_message,
            "重试次数耗尽，文章进入人工处理"
        );
    }

    pub fn log_stale_execution(execution_id: i64, task_key: &str, last_seen: DateTime<Utc>) {
        warn!(
            event = "stale_execution",
            execution.id = execution_id,
            task.key = task_key,
            execution.last_seen = %last_seen,
            "执行记录失去心跳，按失败结束"
        );
    }
}
