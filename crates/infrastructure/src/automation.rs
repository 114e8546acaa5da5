//! 浏览器自动化服务的 HTTP 桥接
//!
//! 具体的页面操作由独立的自动化服务完成，调度核心通过 JSON 接口转发：
//!
//! - `POST {base_url}/publish` - 发布一篇文章，返回 [`PublishResult`]
//! - `POST {base_url}/index-check` - 向AI平台提问并返回 [`IndexCheckOutcome`]
//!
//! 每个请求都带上浏览器上下文标识，服务端据此复用登录态和页面。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geo_core::config::models::AutomationConfig;
use geo_core::{
    BrowserContext, GeoError, GeoResult, IndexCheckOutcome, IndexCheckTarget, IndexChecker,
    IndexCheckerRegistry, PlatformAccount, PublishResult, PublishableArticle, Publisher,
    PublisherRegistry, SessionState,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

pub struct AutomationClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl AutomationClient {
    pub fn new(config: &AutomationConfig) -> GeoResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| GeoError::Configuration(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> GeoResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let endpoint = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&endpoint).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GeoError::Automation(format!("自动化服务请求超时: {endpoint}"))
            } else {
                GeoError::Network(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(GeoError::Automation(format!(
                "自动化服务返回错误 (status {}): {}",
                status.as_u16(),
                message
            )));
        }

        resp.json::<R>()
            .await
            .map_err(|e| GeoError::Automation(format!("自动化服务响应无法解析: {e}")))
    }
}

#[derive(Serialize)]
struct ArticlePayload<'a> {
    id: i64,
    title: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct AccountPayload<'a> {
    id: i64,
    account_name: &'a str,
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    platform: &'a str,
    context_id: &'a str,
    article: ArticlePayload<'a>,
    account: AccountPayload<'a>,
    session: &'a SessionState,
}

#[derive(Serialize)]
struct IndexCheckRequest<'a> {
    platform: &'a str,
    context_id: &'a str,
    keyword: &'a str,
    question: &'a str,
}

/// 通过自动化服务发布到指定平台
pub struct HttpPublisher {
    platform: String,
    client: Arc<AutomationClient>,
}

impl HttpPublisher {
    pub fn new(platform: impl Into<String>, client: Arc<AutomationClient>) -> Self {
        Self {
            platform: platform.into(),
            client,
        }
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    fn platform(&self) -> &str {
        &self.platform
    }

    #[instrument(skip_all, fields(platform = %self.platform, article_id = article.id))]
    async fn publish(
        &self,
        context: &BrowserContext,
        article: &PublishableArticle,
        account: &PlatformAccount,
        session: &SessionState,
    ) -> GeoResult<PublishResult> {
        let request = PublishRequest {
            platform: &self.platform,
            context_id: &context.id,
            article: ArticlePayload {
                id: article.id,
                title: &article.title,
                content: &article.content,
            },
            account: AccountPayload {
                id: account.id,
                account_name: &account.account_name,
            },
            session,
        };
        let result: PublishResult = self.client.post("/publish", &request).await?;
        debug!("自动化服务发布结果: success={}", result.success);
        Ok(result)
    }
}

/// 通过自动化服务检测关键词收录
pub struct HttpIndexChecker {
    platform: String,
    client: Arc<AutomationClient>,
}

impl HttpIndexChecker {
    pub fn new(platform: impl Into<String>, client: Arc<AutomationClient>) -> Self {
        Self {
            platform: platform.into(),
            client,
        }
    }
}

#[async_trait]
impl IndexChecker for HttpIndexChecker {
    fn platform(&self) -> &str {
        &self.platform
    }

    #[instrument(skip_all, fields(platform = %self.platform, target_id = target.id))]
    async fn check(
        &self,
        context: &BrowserContext,
        target: &IndexCheckTarget,
    ) -> GeoResult<IndexCheckOutcome> {
        let request = IndexCheckRequest {
            platform: &self.platform,
            context_id: &context.id,
            keyword: &target.keyword,
            question: &target.question,
        };
        self.client.post("/index-check", &request).await
    }
}

/// 按配置的平台列表组装发布器
pub fn publisher_registry(client: Arc<AutomationClient>, platforms: &[String]) -> PublisherRegistry {
    let mut registry = PublisherRegistry::new();
    for platform in platforms {
        registry.register(
            platform.clone(),
            Arc::new(HttpPublisher::new(platform.clone(), client.clone())),
        );
    }
    registry
}

/// 按配置的平台列表组装收录检测器
pub fn index_checker_registry(
    client: Arc<AutomationClient>,
    platforms: &[String],
) -> IndexCheckerRegistry {
    let mut registry = IndexCheckerRegistry::new();
    for platform in platforms {
        registry.register(
            platform.clone(),
            Arc::new(HttpIndexChecker::new(platform.clone(), client.clone())),
        );
    }
    registry
}
