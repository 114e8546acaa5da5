use std::time::Duration;

use rand::Rng;
use tracing::debug;

use geo_core::PacingConfig;

/// 自动化动作之前的随机等待，模拟人工操作节奏
#[derive(Debug, Clone)]
pub struct HumanPacing {
    enabled: bool,
    min_delay: Duration,
    max_delay: Duration,
}

impl HumanPacing {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            enabled: true,
            min_delay: min_delay.min(max_delay),
            max_delay: max_delay.max(min_delay),
        }
    }

    pub fn from_config(config: &PacingConfig) -> Self {
        Self {
            enabled: config.enabled,
            ..Self::new(
                Duration::from_millis(config.min_delay_ms),
                Duration::from_millis(config.max_delay_ms),
            )
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 在 `[min_delay, max_delay]` 之间随机取一个时长
    pub fn next_delay(&self) -> Duration {
        if !self.enabled || self.max_delay.is_zero() {
            return Duration::ZERO;
        }
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        debug!("模拟人工操作，等待 {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
}
