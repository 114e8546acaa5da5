use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 调度与派发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 发布与收录检测共享的浏览器并发上限
    pub max_concurrent_jobs: usize,
    /// 等待并发槽位的最长时间，超时即放弃本次派发
    pub slot_wait_seconds: u64,
    /// 单次发布的整体超时
    pub dispatch_timeout_seconds: u64,
    /// 单次收录检测的整体超时
    pub index_check_timeout_seconds: u64,
    /// 退避表（分钟），第 n 次失败使用第 n 项，用尽后隔离
    pub retry_backoff_minutes: Vec<u64>,
    /// 执行记录无心跳超过该时长视为卡死
    pub stale_execution_minutes: u64,
    /// 定时任务连续失败达到该次数后隔离
    pub task_quarantine_threshold: i32,
    /// 每次扫描最多派发的文章数
    pub publish_batch_size: i64,
    /// 每次扫描最多检测的目标数
    pub index_check_batch_size: i64,
    /// 同一目标两次检测的最小间隔（小时）
    pub index_recheck_hours: i64,
    /// 执行记录保留天数
    pub execution_log_retention_days: i64,
    /// 关闭时等待运行中任务的最长时间
    pub shutdown_grace_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            slot_wait_seconds: 30,
            dispatch_timeout_seconds: 300,
            index_check_timeout_seconds: 180,
            retry_backoff_minutes: vec![5, 30, 120],
            stale_execution_minutes: 30,
            task_quarantine_threshold: 5,
            publish_batch_size: 20,
            index_check_batch_size: 50,
            index_recheck_hours: 24,
            execution_log_retention_days: 30,
            shutdown_grace_seconds: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(anyhow::anyhow!("最大并发数必须大于0"));
        }

        if self.dispatch_timeout_seconds == 0 || self.index_check_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("派发超时时间必须大于0"));
        }

        if self.retry_backoff_minutes.is_empty() {
            return Err(anyhow::anyhow!("退避表不能为空"));
        }

        if self
            .retry_backoff_minutes
            .windows(2)
            .any(|pair| pair[0] > pair[1])
        {
            return Err(anyhow::anyhow!(
                "退避表必须升序: {:?}",
                self.retry_backoff_minutes
            ));
        }

        let longest_attempt = self
            .dispatch_timeout_seconds
            .max(self.index_check_timeout_seconds)
            + self.slot_wait_seconds;
        if self.stale_execution_minutes * 60 <= longest_attempt {
            return Err(anyhow::anyhow!(
                "卡死判定时间({}分钟)必须大于单次派发的最长耗时({}秒)",
                self.stale_execution_minutes,
                longest_attempt
            ));
        }

        if self.task_quarantine_threshold <= 0 {
            return Err(anyhow::anyhow!("任务隔离阈值必须大于0"));
        }

        if self.publish_batch_size <= 0 || self.index_check_batch_size <= 0 {
            return Err(anyhow::anyhow!("批量大小必须大于0"));
        }

        if self.index_recheck_hours <= 0 {
            return Err(anyhow::anyhow!("收录复查间隔必须大于0"));
        }

        if self.execution_log_retention_days <= 0 {
            return Err(anyhow::anyhow!("执行记录保留天数必须大于0"));
        }

        Ok(())
    }

    pub fn slot_wait(&self) -> Duration {
        Duration::from_secs(self.slot_wait_seconds)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_seconds)
    }

    pub fn index_check_timeout(&self) -> Duration {
        Duration::from_secs(self.index_check_timeout_seconds)
    }

    pub fn retry_backoff(&self) -> Vec<Duration> {
        self.retry_backoff_minutes
            .iter()
            .map(|minutes| Duration::from_secs(minutes * 60))
            .collect()
    }

    pub fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.stale_execution_minutes as i64)
    }
}

/// 模拟人工操作节奏的随机延迟
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub enabled: bool,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_ms: 2_000,
            max_delay_ms: 8_000,
        }
    }
}

impl PacingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(anyhow::anyhow!(
                "最小延迟({}ms)不能大于最大延迟({}ms)",
                self.min_delay_ms,
                self.max_delay_ms
            ));
        }
        Ok(())
    }
}
