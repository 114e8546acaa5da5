//! Test data builders for creating test entities
//!
//! 默认值对应一条可以直接派发的数据，测试只需覆盖关心的字段。

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use geo_core::{
    AccountStatus, IndexCheckTarget, IndexStatus, PlatformAccount, PublishStatus,
    PublishableArticle, ScheduledTaskConfig,
};

/// Builder for creating test PublishableArticle entities
pub struct ArticleBuilder {
    article: PublishableArticle,
}

impl ArticleBuilder {
    pub fn new() -> Self {
        Self {
            article: PublishableArticle::new("测试文章", "这是一篇测试文章的正文", "zhihu"),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.article.id = id;
        self
    }

    pub fn with_platform(mut self, platform: &str) -> Self {
        self.article.platform = platform.to_string();
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.article.content = content.to_string();
        self
    }

    pub fn with_status(mut self, status: PublishStatus) -> Self {
        self.article.publish_status = status;
        self
    }

    pub fn with_retry_count(mut self, retry_count: i32) -> Self {
        self.article.retry_count = retry_count;
        self
    }

    pub fn with_next_retry_at(mut self, next_retry_at: Option<DateTime<Utc>>) -> Self {
        self.article.next_retry_at = next_retry_at;
        self
    }

    /// 失败且重试时间已到期
    pub fn failed_due(self, retry_count: i32) -> Self {
        self.with_status(PublishStatus::Failed)
            .with_retry_count(retry_count)
            .with_next_retry_at(Some(Utc::now() - Duration::seconds(1)))
    }

    pub fn created_ago(mut self, ago: Duration) -> Self {
        self.article.created_at = Utc::now() - ago;
        self
    }

    pub fn updated_ago(mut self, ago: Duration) -> Self {
        self.article.updated_at = Utc::now() - ago;
        self
    }

    pub fn build(self) -> PublishableArticle {
        self.article
    }
}

impl Default for ArticleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test PlatformAccount entities
pub struct AccountBuilder {
    account: PlatformAccount,
}

impl AccountBuilder {
    pub fn new() -> Self {
        Self {
            account: PlatformAccount {
                id: 1,
                platform: "zhihu".to_string(),
                account_name: "测试账号".to_string(),
                status: AccountStatus::Active,
                session_payload: Self::valid_session(),
                invalid_reason: None,
                last_used_at: None,
                updated_at: Utc::now(),
            },
        }
    }

    /// 可以正常解析的会话数据
    pub fn valid_session() -> String {
        json!({
            "cookies": [{"name": "session", "value": "test", "domain": ".example.com"}],
            "origins": []
        })
        .to_string()
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.account.id = id;
        self
    }

    pub fn with_platform(mut self, platform: &str) -> Self {
        self.account.platform = platform.to_string();
        self
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.account.status = status;
        self
    }

    pub fn with_session_payload(mut self, payload: &str) -> Self {
        self.account.session_payload = payload.to_string();
        self
    }

    pub fn with_last_used_at(mut self, at: DateTime<Utc>) -> Self {
        self.account.last_used_at = Some(at);
        self
    }

    pub fn build(self) -> PlatformAccount {
        self.account
    }
}

impl Default for AccountBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test IndexCheckTarget entities
pub struct IndexTargetBuilder {
    target: IndexCheckTarget,
}

impl IndexTargetBuilder {
    pub fn new() -> Self {
        Self {
            target: IndexCheckTarget::new(1, "GEO优化", "什么是GEO优化？", "deepseek"),
        }
    }

    pub fn with_keyword(mut self, keyword: &str) -> Self {
        self.target.keyword = keyword.to_string();
        self
    }

    pub fn with_platform(mut self, platform: &str) -> Self {
        self.target.platform = platform.to_string();
        self
    }

    pub fn with_status(mut self, status: IndexStatus) -> Self {
        self.target.index_status = status;
        self
    }

    pub fn checked_ago(mut self, ago: Duration) -> Self {
        self.target.last_check_time = Some(Utc::now() - ago);
        self
    }

    pub fn build(self) -> IndexCheckTarget {
        self.target
    }
}

impl Default for IndexTargetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test ScheduledTaskConfig entities
pub struct ScheduledTaskBuilder {
    task: ScheduledTaskConfig,
}

impl ScheduledTaskBuilder {
    pub fn new(task_key: &str) -> Self {
        Self {
            task: ScheduledTaskConfig::new(task_key, task_key, "*/5 * * * *"),
        }
    }

    pub fn with_cron(mut self, cron_expression: &str) -> Self {
        self.task.cron_expression = cron_expression.to_string();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.task.is_active = false;
        self
    }

    pub fn quarantined(mut self, reason: &str) -> Self {
        self.task.is_quarantined = true;
        self.task.quarantine_reason = Some(reason.to_string());
        self.task.quarantine_at = Some(Utc::now());
        self
    }

    pub fn with_consecutive_failures(mut self, failures: i32) -> Self {
        self.task.consecutive_failures = failures;
        self
    }

    pub fn build(self) -> ScheduledTaskConfig {
        self.task
    }
}
