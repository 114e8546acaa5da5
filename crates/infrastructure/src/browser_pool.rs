//! 浏览器上下文池
//!
//! 每个平台保留一个可复用的上下文。上下文的实际生命周期由自动化服务管理，
//! 这里只负责分配标识，并在超时后丢弃，使下次派发拿到全新的上下文。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use geo_core::{BrowserContext, BrowserPool, GeoResult};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Default)]
pub struct SharedBrowserPool {
    contexts: Mutex<HashMap<String, BrowserContext>>,
}

impl SharedBrowserPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前保留的上下文数量
    pub async fn size(&self) -> usize {
        self.contexts.lock().await.len()
    }
}

#[async_trait]
impl BrowserPool for SharedBrowserPool {
    async fn acquire(&self, platform: &str) -> GeoResult<BrowserContext> {
        let mut contexts = self.contexts.lock().await;
        if let Some(context) = contexts.get(platform) {
            debug!("复用浏览器上下文: {} ({})", context.id, platform);
            return Ok(context.clone());
        }

        let context = BrowserContext {
            id: Uuid::new_v4().to_string(),
            platform: platform.to_string(),
            created_at: Utc::now(),
        };
        info!("创建浏览器上下文: {} ({})", context.id, platform);
        contexts.insert(platform.to_string(), context.clone());
        Ok(context)
    }

    async fn discard(&self, context: &BrowserContext) {
        let mut contexts = self.contexts.lock().await;
        // 只移除同一个上下文，避免误删已被重建的新上下文
        if contexts
            .get(&context.platform)
            .is_some_and(|current| current.id == context.id)
        {
            contexts.remove(&context.platform);
            info!("丢弃浏览器上下文: {} ({})", context.id, context.platform);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_context_is_reused_per_platform() {
        let pool = SharedBrowserPool::new();
        let first = pool.acquire("zhihu").await.unwrap();
        let again = pool.acquire("zhihu").await.unwrap();
        let other = pool.acquire("toutiao").await.unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        assert_eq!(pool.size().await, 2);
    }

    #[tokio::test]
    async fn test_discarded_context_is_recreated() {
        let pool = SharedBrowserPool::new();
        let first = pool.acquire("zhihu").await.unwrap();
        pool.discard(&first).await;
        let second = pool.acquire("zhihu").await.unwrap();

        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_stale_discard_keeps_new_context() {
        let pool = SharedBrowserPool::new();
        let old = pool.acquire("zhihu").await.unwrap();
        pool.discard(&old).await;
        let fresh = pool.acquire("zhihu").await.unwrap();

        pool.discard(&old).await;
        assert_eq!(pool.acquire("zhihu").await.unwrap().id, fresh.id);
    }
}
