use async_trait::async_trait;
use geo_core::{NotificationEvent, Notifier};
use tracing::{info, warn};

/// 把通知事件写成结构化日志
///
/// 外部告警渠道可以订阅 `event` 字段为 `notification` 的日志。
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl TracingNotifier {
    pub fn new() -> Self {
        Self
    }

    fn event_name(event: &NotificationEvent) -> &'static str {
        match event {
            NotificationEvent::ArticlePublished { .. } => "article_published",
            NotificationEvent::ArticleQuarantined { .. } => "article_quarantined",
            NotificationEvent::AccountInvalidated { .. } => "account_invalidated",
            NotificationEvent::TaskQuarantined { .. } => "task_quarantined",
        }
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: NotificationEvent) {
        let name = Self::event_name(&event);
        metrics::counter!("geo_notifications_total", "event" => name).increment(1);

        match &event {
            NotificationEvent::ArticlePublished {
                article_id,
                platform,
                platform_url,
            } => {
                info!(
                    event = "notification",
                    kind = name,
                    article_id = *article_id,
                    platform = %platform,
                    platform_url = platform_url.as_deref().unwrap_or(""),
                    "文章发布成功"
                );
            }
            NotificationEvent::ArticleQuarantined {
                article_id,
                platform,
                retry_count,
                error_msg,
            } => {
                warn!(
                    event = "notification",
                    kind = name,
                    article_id = *article_id,
                    platform = %platform,
                    retry_count = *retry_count,
                    error = %error_msg,
                    "文章重试次数耗尽，需要人工处理"
                );
            }
            NotificationEvent::AccountInvalidated {
                account_id,
                platform,
                reason,
            } => {
                warn!(
                    event = "notification",
                    kind = name,
                    account_id = *account_id,
                    platform = %platform,
                    reason = %reason,
                    "平台账号登录态失效"
                );
            }
            NotificationEvent::TaskQuarantined { task_key, reason } => {
                warn!(
                    event = "notification",
                    kind = name,
                    task_key = %task_key,
                    reason = %reason,
                    "定时任务连续失败已隔离"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_event_has_a_name() {
        let notifier = TracingNotifier::new();
        let events = vec![
            NotificationEvent::ArticlePublished {
                article_id: 1,
                platform: "zhihu".to_string(),
                platform_url: None,
            },
            NotificationEvent::TaskQuarantined {
                task_key: "auto_publish".to_string(),
                reason: "连续失败".to_string(),
            },
        ];
        for event in events {
            assert!(!TracingNotifier::event_name(&event).is_empty());
            notifier.notify(event).await;
        }
    }
}
