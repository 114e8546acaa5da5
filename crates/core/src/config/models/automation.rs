use serde::{Deserialize, Serialize};

/// 浏览器自动化服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub request_timeout_seconds: u64,
    /// 启用发布的平台
    pub publish_platforms: Vec<String>,
    /// 启用收录检测的AI平台
    pub index_platforms: Vec<String>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3100".to_string(),
            token: None,
            request_timeout_seconds: 600,
            publish_platforms: vec!["zhihu".to_string(), "toutiao".to_string()],
            index_platforms: vec!["deepseek".to_string(), "doubao".to_string()],
        }
    }
}

impl AutomationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(anyhow::anyhow!("自动化服务地址格式无效: {}", self.base_url));
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }

        if self
            .publish_platforms
            .iter()
            .chain(self.index_platforms.iter())
            .any(|p| p.trim().is_empty())
        {
            return Err(anyhow::anyhow!("平台标识不能为空"));
        }

        Ok(())
    }
}
