use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 内容生成尚未完成时写入的占位正文
pub const CONTENT_PLACEHOLDER: &str = "正在生成中...";

/// 文章发布状态
///
/// ```text
/// Generating → Scheduled → Publishing → Published
///                  ↑            ↓
///                  └──────── Failed（next_retry_at 为空时为终态）
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Generating,
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl PublishStatus {
    pub const ALL: [PublishStatus; 5] = [
        PublishStatus::Generating,
        PublishStatus::Scheduled,
        PublishStatus::Publishing,
        PublishStatus::Published,
        PublishStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Generating => "generating",
            PublishStatus::Scheduled => "scheduled",
            PublishStatus::Publishing => "publishing",
            PublishStatus::Published => "published",
            PublishStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generating" => Ok(PublishStatus::Generating),
            "scheduled" => Ok(PublishStatus::Scheduled),
            "publishing" => Ok(PublishStatus::Publishing),
            "published" => Ok(PublishStatus::Published),
            "failed" => Ok(PublishStatus::Failed),
            _ => Err(format!("Invalid publish status: {s}")),
        }
    }
}

/// 待发布文章
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishableArticle {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub platform: String,
    pub publish_status: PublishStatus,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_msg: Option<String>,
    pub platform_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// 最近一次被派发尝试（认领或因前置条件跳过）的时间，决定扫描顺序
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublishableArticle {
    pub fn new(title: &str, content: &str, platform: &str) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title: title.to_string(),
            content: content.to_string(),
            platform: platform.to_string(),
            publish_status: PublishStatus::Scheduled,
            retry_count: 0,
            next_retry_at: None,
            error_msg: None,
            platform_url: None,
            published_at: None,
            last_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 正文已生成完毕（不是空文本也不是占位文本）
    pub fn content_ready(&self) -> bool {
        let content = self.content.trim();
        !content.is_empty() && content != CONTENT_PLACEHOLDER
    }

    /// 按状态和重试时间判断是否可以派发
    ///
    /// `scheduled` 要求 `next_retry_at` 为空或已到期；`failed` 必须带有已到期的
    /// `next_retry_at`，隔离后的文章 `next_retry_at` 为空，因此不会再被选中。
    pub fn status_dispatchable(&self, now: DateTime<Utc>) -> bool {
        match self.publish_status {
            PublishStatus::Scheduled => self.next_retry_at.map_or(true, |at| at <= now),
            PublishStatus::Failed => self.next_retry_at.is_some_and(|at| at <= now),
            _ => false,
        }
    }

    /// 完整的派发资格：状态满足且正文已就绪
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status_dispatchable(now) && self.content_ready()
    }

    /// 是否为需要人工介入的终态失败
    pub fn is_quarantined(&self) -> bool {
        self.publish_status == PublishStatus::Failed && self.next_retry_at.is_none()
    }
}

/// 发布失败后写回的状态
#[derive(Debug, Clone, PartialEq)]
pub struct PublishFailure {
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_msg: String,
}
