use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 平台已接受发布、但文章状态未能写回时执行记录使用的 `error_type`
///
/// 这类记录的 `result_summary` 保存平台返回的文章链接，自愈扫描据此把文章
/// 补记为 `published`，不会再次进入发布流程。
pub const PUBLISHED_WRITE_BACK_ERROR: &str = "PublishedWriteBack";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failure,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "success" => Ok(ExecutionStatus::Success),
            "failure" => Ok(ExecutionStatus::Failure),
            _ => Err(format!("Invalid execution status: {s}")),
        }
    }
}

/// 执行记录
///
/// 每次派发（或每次任务运行）对应一条记录，创建时为 `Running`，
/// 之后恰好被 `finish` 一次。`target_id` 为空表示任务级别的运行记录。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionLogEntry {
    pub id: i64,
    pub task_key: String,
    pub target_id: Option<i64>,
    pub instance_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub result_summary: Option<String>,
    pub error_type: Option<String>,
    pub error_msg: Option<String>,
    pub retry_count: i32,
}

impl ExecutionLogEntry {
    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    /// 平台已发布但文章状态写回失败的记录
    pub fn is_unrecorded_publish(&self) -> bool {
        self.error_type.as_deref() == Some(PUBLISHED_WRITE_BACK_ERROR)
    }

    /// 最近一次存活信号（心跳或开始时间）
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.heartbeat_at.max(self.started_at)
    }
}

/// 新建执行记录所需的字段
#[derive(Debug, Clone)]
pub struct NewExecutionLog {
    pub task_key: String,
    pub target_id: Option<i64>,
    pub instance_id: String,
    pub retry_count: i32,
    pub started_at: DateTime<Utc>,
}

impl NewExecutionLog {
    pub fn new(task_key: &str, target_id: Option<i64>, instance_id: &str) -> Self {
        Self {
            task_key: task_key.to_string(),
            target_id,
            instance_id: instance_id.to_string(),
            retry_count: 0,
            started_at: Utc::now(),
        }
    }

    pub fn with_retry_count(mut self, retry_count: i32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

/// 执行记录的最终结果
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionFinish {
    pub status: ExecutionStatus,
    pub finished_at: DateTime<Utc>,
    pub result_summary: Option<String>,
    pub error_type: Option<String>,
    pub error_msg: Option<String>,
}

impl ExecutionFinish {
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Success,
            finished_at: Utc::now(),
            result_summary: Some(summary.into()),
            error_type: None,
            error_msg: None,
        }
    }

    pub fn failure(error_type: impl Into<String>, error_msg: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failure,
            finished_at: Utc::now(),
            result_summary: None,
            error_type: Some(error_type.into()),
            error_msg: Some(error_msg.into()),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.result_summary = Some(summary.into());
        self
    }
}
