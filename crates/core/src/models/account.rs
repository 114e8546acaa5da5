use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GeoError, GeoResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Invalid,
    Disabled,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Invalid => "invalid",
            AccountStatus::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "invalid" => Some(AccountStatus::Invalid),
            "disabled" => Some(AccountStatus::Disabled),
            _ => None,
        }
    }
}

/// 平台账号
///
/// `session_payload` 是登录态的不透明数据（cookies / storage），
/// 核心只负责解析校验，不关心其内部含义。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformAccount {
    pub id: i64,
    pub platform: String,
    pub account_name: String,
    pub status: AccountStatus,
    pub session_payload: String,
    pub invalid_reason: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PlatformAccount {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// 解析会话数据，失败时返回 `SessionDecode`
    pub fn decode_session(&self) -> GeoResult<SessionState> {
        let state: SessionState =
            serde_json::from_str(&self.session_payload).map_err(|e| GeoError::SessionDecode {
                account_id: self.id,
                message: e.to_string(),
            })?;

        if state.cookies.is_empty() && state.origins.is_empty() {
            return Err(GeoError::SessionDecode {
                account_id: self.id,
                message: "会话数据为空".to_string(),
            });
        }
        Ok(state)
    }
}

/// 浏览器登录态（storage state 格式）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    #[serde(default)]
    pub cookies: Vec<serde_json::Value>,
    #[serde(default)]
    pub origins: Vec<serde_json::Value>,
}
