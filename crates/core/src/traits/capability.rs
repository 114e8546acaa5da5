use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    IndexCheckOutcome, IndexCheckTarget, PlatformAccount, PublishableArticle, SessionState,
};
use crate::GeoResult;

/// 浏览器上下文句柄
///
/// 由 [`BrowserPool`] 统一提供并在多次派发之间复用，
/// 超时后通过 `discard` 强制销毁。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserContext {
    pub id: String,
    pub platform: String,
    pub created_at: DateTime<Utc>,
}

/// 浏览器资源池
#[async_trait]
pub trait BrowserPool: Send + Sync {
    /// 获取（或创建）平台对应的浏览器上下文
    async fn acquire(&self, platform: &str) -> GeoResult<BrowserContext>;

    /// 销毁上下文，下次 `acquire` 会重新创建
    async fn discard(&self, context: &BrowserContext);
}

/// 发布器返回的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishResult {
    pub success: bool,
    pub platform_url: Option<String>,
    pub error_msg: Option<String>,
}

impl PublishResult {
    pub fn published(platform_url: impl Into<String>) -> Self {
        Self {
            success: true,
            platform_url: Some(platform_url.into()),
            error_msg: None,
        }
    }

    pub fn failed(error_msg: impl Into<String>) -> Self {
        Self {
            success: false,
            platform_url: None,
            error_msg: Some(error_msg.into()),
        }
    }
}

/// 平台发布器
#[async_trait]
pub trait Publisher: Send + Sync {
    /// 平台标识，如 "zhihu"、"toutiao"
    fn platform(&self) -> &str;

    async fn publish(
        &self,
        context: &BrowserContext,
        article: &PublishableArticle,
        account: &PlatformAccount,
        session: &SessionState,
    ) -> GeoResult<PublishResult>;
}

/// AI平台收录检测器
#[async_trait]
pub trait IndexChecker: Send + Sync {
    fn platform(&self) -> &str;

    async fn check(
        &self,
        context: &BrowserContext,
        target: &IndexCheckTarget,
    ) -> GeoResult<IndexCheckOutcome>;
}

/// 通知事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    ArticlePublished {
        article_id: i64,
        platform: String,
        platform_url: Option<String>,
    },
    ArticleQuarantined {
        article_id: i64,
        platform: String,
        retry_count: i32,
        error_msg: String,
    },
    AccountInvalidated {
        account_id: i64,
        platform: String,
        reason: String,
    },
    TaskQuarantined {
        task_key: String,
        reason: String,
    },
}

/// 通知出口
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent);
}

/// 按平台标识索引的能力表，启动时组装完成
pub struct PlatformRegistry<T: ?Sized> {
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> PlatformRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, platform: impl Into<String>, capability: Arc<T>) -> &mut Self {
        self.entries.insert(platform.into(), capability);
        self
    }

    pub fn get(&self, platform: &str) -> Option<Arc<T>> {
        self.entries.get(platform).cloned()
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.entries.contains_key(platform)
    }

    pub fn platforms(&self) -> Vec<String> {
        let mut platforms: Vec<String> = self.entries.keys().cloned().collect();
        platforms.sort();
        platforms
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> Default for PlatformRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type PublisherRegistry = PlatformRegistry<dyn Publisher>;
pub type IndexCheckerRegistry = PlatformRegistry<dyn IndexChecker>;

impl PublisherRegistry {
    pub fn with_publishers(publishers: Vec<Arc<dyn Publisher>>) -> Self {
        let mut registry = Self::new();
        for publisher in publishers {
            let platform = publisher.platform().to_string();
            registry.register(platform, publisher);
        }
        registry
    }
}

impl IndexCheckerRegistry {
    pub fn with_checkers(checkers: Vec<Arc<dyn IndexChecker>>) -> Self {
        let mut registry = Self::new();
        for checker in checkers {
            let platform = checker.platform().to_string();
            registry.register(platform, checker);
        }
        registry
    }
}
