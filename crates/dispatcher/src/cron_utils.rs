use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use geo_core::{GeoError, GeoResult};

/// CRON表达式解析和调度工具
///
/// 同时接受 5 段（分 时 日 月 周）、6 段（带秒）和 7 段（带年）表达式，
/// 5 段表达式会补上秒字段 `0`。
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    pub fn new(cron_expr: &str) -> GeoResult<Self> {
        let expression = Self::normalize(cron_expr);
        let schedule = Schedule::from_str(&expression).map_err(|e| GeoError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expression,
            schedule,
        })
    }

    /// 把 5 段 crontab 表达式补齐为带秒字段的形式
    pub fn normalize(cron_expr: &str) -> String {
        let fields: Vec<&str> = cron_expr.split_whitespace().collect();
        if fields.len() == 5 {
            format!("0 {}", fields.join(" "))
        } else {
            fields.join(" ")
        }
    }

    pub fn validate_cron_expression(cron_expr: &str) -> GeoResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    /// 规范化后的表达式
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取下一次执行时间（严格晚于 `from`）
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }
}
