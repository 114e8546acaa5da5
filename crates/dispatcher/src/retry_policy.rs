use std::time::Duration;

use chrono::{DateTime, Utc};

use geo_core::{PublishFailure, PublishableArticle, SchedulerConfig};

/// 重试决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 等待指定时长后再次尝试
    Delay(Duration),
    /// 重试预算耗尽，进入人工处理
    Quarantine,
}

/// 固定退避表的重试策略
///
/// `attempt_count` 取失败发生前文章已累计的 `retry_count`：
/// 第一次失败（`retry_count = 0`）对应退避表第一项，
/// `attempt_count` 达到退避表长度时返回 [`RetryDecision::Quarantine`]。
/// 同样的输入总是得到同样的结果，没有随机抖动。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(5 * 60),
            Duration::from_secs(30 * 60),
            Duration::from_secs(120 * 60),
        ])
    }
}

impl RetryPolicy {
    pub fn new(backoff: Vec<Duration>) -> Self {
        Self { backoff }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.retry_backoff())
    }

    pub fn decide(&self, attempt_count: i32) -> RetryDecision {
        usize::try_from(attempt_count)
            .ok()
            .and_then(|index| self.backoff.get(index))
            .map_or(RetryDecision::Quarantine, |delay| RetryDecision::Delay(*delay))
    }

    /// 自动重试的次数上限
    pub fn max_retries(&self) -> usize {
        self.backoff.len()
    }

    pub fn backoff(&self) -> &[Duration] {
        &self.backoff
    }

    /// 根据文章当前的重试次数计算失败后需要写回的状态
    pub fn failure_for(
        &self,
        article: &PublishableArticle,
        error_msg: &str,
        now: DateTime<Utc>,
    ) -> (RetryDecision, PublishFailure) {
        let decision = self.decide(article.retry_count);
        let next_retry_at = match decision {
            RetryDecision::Delay(delay) => {
                Some(now + chrono::Duration::milliseconds(delay.as_millis() as i64))
            }
            RetryDecision::Quarantine => None,
        };

        let failure = PublishFailure {
            retry_count: article.retry_count + 1,
            next_retry_at,
            error_msg: error_msg.to_string(),
        };

        (decision, failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    #[test]
    fn test_decide_reads_table_verbatim() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(0), RetryDecision::Delay(minutes(5)));
        assert_eq!(policy.decide(1), RetryDecision::Delay(minutes(30)));
        assert_eq!(policy.decide(2), RetryDecision::Delay(minutes(120)));
        assert_eq!(policy.decide(3), RetryDecision::Quarantine);
        assert_eq!(policy.decide(100), RetryDecision::Quarantine);
    }

    #[test]
    fn test_negative_attempt_is_quarantined() {
        assert_eq!(RetryPolicy::default().decide(-1), RetryDecision::Quarantine);
    }

    #[test]
    fn test_empty_table_always_quarantines() {
        let policy = RetryPolicy::new(vec![]);
        assert_eq!(policy.decide(0), RetryDecision::Quarantine);
        assert_eq!(policy.max_retries(), 0);
    }

    #[test]
    fn test_from_config() {
        let mut config = SchedulerConfig::default();
        config.retry_backoff_minutes = vec![1, 2];
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.backoff(), &[minutes(1), minutes(2)]);
    }

    #[test]
    fn test_failure_for_first_failure() {
        let policy = RetryPolicy::default();
        let article = PublishableArticle::new("标题", "正文", "zhihu");
        let now = Utc::now();

        let (decision, failure) = policy.failure_for(&article, "元素未找到", now);

        assert_eq!(decision, RetryDecision::Delay(minutes(5)));
        assert_eq!(failure.retry_count, 1);
        assert_eq!(failure.next_retry_at, Some(now + chrono::Duration::minutes(5)));
        assert_eq!(failure.error_msg, "元素未找到");
    }

    #[test]
    fn test_failure_for_exhausted_budget() {
        let policy = RetryPolicy::default();
        let mut article = PublishableArticle::new("标题", "正文", "zhihu");
        article.retry_count = 3;

        let (decision, failure) = policy.failure_for(&article, "发布失败", Utc::now());

        assert_eq!(decision, RetryDecision::Quarantine);
        assert_eq!(failure.retry_count, 4);
        assert!(failure.next_retry_at.is_none());
    }
}
