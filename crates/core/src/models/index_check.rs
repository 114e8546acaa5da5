use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Unchecked,
    Indexed,
    NotIndexed,
    Error,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Unchecked => "unchecked",
            IndexStatus::Indexed => "indexed",
            IndexStatus::NotIndexed => "not_indexed",
            IndexStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unchecked" => Some(IndexStatus::Unchecked),
            "indexed" => Some(IndexStatus::Indexed),
            "not_indexed" => Some(IndexStatus::NotIndexed),
            "error" => Some(IndexStatus::Error),
            _ => None,
        }
    }
}

/// 收录检测目标：(关键词, 问题变体, 平台) 三元组
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexCheckTarget {
    pub id: i64,
    pub keyword_id: i64,
    pub keyword: String,
    pub question: String,
    pub platform: String,
    pub article_id: Option<i64>,
    pub index_status: IndexStatus,
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_answer_excerpt: Option<String>,
    /// 最近一次尝试检测的时间，检测失败时 `last_check_time` 不变，只更新这里
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl IndexCheckTarget {
    pub fn new(keyword_id: i64, keyword: &str, question: &str, platform: &str) -> Self {
        Self {
            id: 0,
            keyword_id,
            keyword: keyword.to_string(),
            question: question.to_string(),
            platform: platform.to_string(),
            article_id: None,
            index_status: IndexStatus::Unchecked,
            last_check_time: None,
            last_answer_excerpt: None,
            last_attempt_at: None,
        }
    }

    /// 上次检测早于 `before`（或从未检测）时需要重新检测
    pub fn is_due(&self, before: DateTime<Utc>) -> bool {
        self.last_check_time.map_or(true, |t| t <= before)
    }
}

/// 检测器返回的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexCheckOutcome {
    /// AI回答中出现了关键词
    pub keyword_found: bool,
    /// AI回答引用了我们发布的内容
    pub citation_found: bool,
    pub answer_excerpt: Option<String>,
}

impl IndexCheckOutcome {
    pub fn index_status(&self) -> IndexStatus {
        if self.citation_found || self.keyword_found {
            IndexStatus::Indexed
        } else {
            IndexStatus::NotIndexed
        }
    }
}
