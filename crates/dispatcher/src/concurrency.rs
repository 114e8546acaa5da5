use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use geo_core::{GeoError, GeoResult};

/// 全局并发槽位
///
/// 发布与收录检测两类任务共用同一个限流器，限制同时运行的浏览器自动化作业数量。
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    max_wait: Duration,
}

/// 已占用的槽位，离开作用域时自动归还
#[derive(Debug)]
pub struct ScopedSlot {
    _permit: OwnedSemaphorePermit,
    waited: Duration,
}

impl ScopedSlot {
    /// 获取槽位时的等待时长
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize, max_wait: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            max_wait,
        }
    }

    /// 等待直到有空闲槽位
    pub async fn acquire(&self) -> GeoResult<ScopedSlot> {
        let started = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GeoError::Internal("并发限流器已关闭".to_string()))?;

        Ok(ScopedSlot {
            _permit: permit,
            waited: started.elapsed(),
        })
    }

    /// 在配置的最长等待时间内获取槽位，超时返回 [`GeoError::ConcurrencyBusy`]
    pub async fn try_acquire(&self) -> GeoResult<ScopedSlot> {
        match tokio::time::timeout(self.max_wait, self.acquire()).await {
            Ok(slot) => {
                let slot = slot?;
                metrics::histogram!("geo_slot_wait_seconds").record(slot.waited.as_secs_f64());
                Ok(slot)
            }
            Err(_) => {
                debug!(
                    "等待并发槽位超时: {}ms，可用槽位 {}/{}",
                    self.max_wait.as_millis(),
                    self.available(),
                    self.capacity
                );
                metrics::counter!("geo_slot_busy_total").increment(1);
                Err(GeoError::ConcurrencyBusy {
                    waited_ms: self.max_wait.as_millis() as u64,
                })
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// 停止发放新槽位，等待中的调用会返回错误
    pub fn close(&self) {
        self.semaphore.close();
    }
}
