use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 自动发布任务的标识
pub const TASK_AUTO_PUBLISH: &str = "auto_publish";
/// 收录检测任务的标识
pub const TASK_INDEX_CHECK: &str = "index_check";
/// 卡死执行记录清理任务的标识
pub const TASK_STALE_SWEEP: &str = "stale_execution_sweep";
/// 执行记录过期清理任务的标识
pub const TASK_LOG_CLEANUP: &str = "execution_log_cleanup";

/// 定时任务配置
///
/// 每个具名的周期任务对应一行记录。`task_key` 创建后不可修改，
/// 调度器按 `task_key` 把任务绑定到对应的处理器上。
///
/// # 字段说明
///
/// - `task_key`: 任务的稳定标识
/// - `cron_expression`: 5/6/7段 cron 表达式
/// - `is_active`: 是否启用（暂停时为 false）
/// - `consecutive_failures`: 连续失败次数，成功一次即清零
/// - `is_quarantined`: 是否被隔离，隔离后需人工解除才会再次调度
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledTaskConfig {
    pub id: i64,
    pub task_key: String,
    pub name: String,
    pub cron_expression: String,
    pub is_active: bool,
    pub description: Option<String>,
    pub consecutive_failures: i32,
    pub is_quarantined: bool,
    pub quarantine_reason: Option<String>,
    pub quarantine_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTaskConfig {
    pub fn new(task_key: &str, name: &str, cron_expression: &str) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            task_key: task_key.to_string(),
            name: name.to_string(),
            cron_expression: cron_expression.to_string(),
            is_active: true,
            description: None,
            consecutive_failures: 0,
            is_quarantined: false,
            quarantine_reason: None,
            quarantine_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// 调度器是否应当为该任务注册周期触发
    pub fn is_schedulable(&self) -> bool {
        self.is_active && !self.is_quarantined
    }

    /// 当前配置对应的任务状态
    pub fn job_state(&self) -> JobState {
        if self.is_quarantined {
            JobState::Quarantined
        } else if self.is_active {
            JobState::Active
        } else {
            JobState::Paused
        }
    }

    /// 启动时写入的默认任务
    pub fn defaults() -> Vec<ScheduledTaskConfig> {
        vec![
            ScheduledTaskConfig::new(TASK_AUTO_PUBLISH, "自动发布", "*/5 * * * *")
                .with_description("扫描待发布文章并通过浏览器自动化发布"),
            ScheduledTaskConfig::new(TASK_INDEX_CHECK, "收录检测", "0 */2 * * *")
                .with_description("检测关键词在各AI平台的收录情况"),
            ScheduledTaskConfig::new(TASK_STALE_SWEEP, "卡死任务清理", "*/10 * * * *")
                .with_description("将长时间无心跳的执行记录标记为失败"),
            ScheduledTaskConfig::new(TASK_LOG_CLEANUP, "执行记录清理", "30 3 * * *")
                .with_description("删除过期的执行记录"),
        ]
    }
}

/// 调度器中单个任务的状态
///
/// ```text
/// Registered → Active ⇄ Paused
///                ↓
///           Quarantined（人工解除前不再调度）
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Registered,
    Active,
    Paused,
    Quarantined,
}

/// 运维侧对定时任务的修改请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskScheduleUpdate {
    pub cron_expression: Option<String>,
    pub is_active: Option<bool>,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl TaskScheduleUpdate {
    pub fn is_empty(&self) -> bool {
        self.cron_expression.is_none()
            && self.is_active.is_none()
            && self.name.is_none()
            && self.description.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_follows_flags() {
        let mut task = ScheduledTaskConfig::new("k", "n", "* * * * *");
        assert_eq!(task.job_state(), JobState::Active);
        task.is_active = false;
        assert_eq!(task.job_state(), JobState::Paused);
        assert!(!task.is_schedulable());
        task.is_active = true;
        task.is_quarantined = true;
        assert_eq!(task.job_state(), JobState::Quarantined);
        assert!(!task.is_schedulable());
    }

    #[test]
    fn test_default_task_keys_are_unique() {
        let defaults = ScheduledTaskConfig::defaults();
        let mut keys: Vec<_> = defaults.iter().map(|t| t.task_key.as_str()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), defaults.len());
    }
}
