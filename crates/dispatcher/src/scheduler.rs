use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use geo_core::{
    ExecutionFinish, ExecutionLogStore, GeoError, GeoResult, JobState, NewExecutionLog,
    NotificationEvent, Notifier, ScheduledTaskConfig, StructuredLogger, TaskScheduleUpdate,
    TaskStore,
};

use crate::cron_utils::CronScheduler;
use crate::jobs::JobHandler;
use crate::outcome::panic_message;

/// 任务的运行时状态，跨重新加载保留
#[derive(Default)]
struct JobRuntime {
    running: AtomicBool,
    next_fire: Mutex<Option<DateTime<Utc>>>,
    last_started: Mutex<Option<DateTime<Utc>>>,
}

impl JobRuntime {
    fn set_next_fire(&self, next: Option<DateTime<Utc>>) {
        if let Ok(mut guard) = self.next_fire.lock() {
            *guard = next;
        }
    }

    fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.next_fire.lock().ok().and_then(|guard| *guard)
    }

    fn last_started(&self) -> Option<DateTime<Utc>> {
        self.last_started.lock().ok().and_then(|guard| *guard)
    }
}

/// 已注册到 cron 的任务
struct CronLoop {
    cron_expression: String,
    handle: JoinHandle<()>,
}

/// 一次运行结束时复位运行标记并更新在途计数
struct RunGuard {
    runtime: Arc<JobRuntime>,
    inner: Arc<SchedulerInner>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runtime.running.store(false, Ordering::SeqCst);
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// 任务的对外快照
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    #[serde(flatten)]
    pub config: ScheduledTaskConfig,
    pub state: JobState,
    pub scheduled: bool,
    pub running: bool,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub last_started_at: Option<DateTime<Utc>>,
}

struct SchedulerInner {
    tasks: Arc<dyn TaskStore>,
    execution_logs: Arc<dyn ExecutionLogStore>,
    notifier: Arc<dyn Notifier>,
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    runtimes: RwLock<HashMap<String, Arc<JobRuntime>>>,
    loops: Mutex<HashMap<String, CronLoop>>,
    quarantine_threshold: i32,
    instance_id: String,
    stopped: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// 定时任务调度器
///
/// 每个处于启用且未隔离状态的任务对应一个 cron 循环，循环在到点时把一次运行
/// 交给独立的异步任务执行。调度器可以被多次构造（测试中常见），不依赖全局状态。
///
/// - 热更新：修改 cron 或启用状态后只重建该任务的循环
/// - 立即执行：单独启动一次运行，不改变 cron 循环的下次触发时间
/// - 防重叠：上一次运行尚未结束时，新的触发被跳过
/// - 任务隔离：连续失败达到阈值后移出调度并通知，需人工解除
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

impl TaskScheduler {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        execution_logs: Arc<dyn ExecutionLogStore>,
        notifier: Arc<dyn Notifier>,
        quarantine_threshold: i32,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                tasks,
                execution_logs,
                notifier,
                handlers: RwLock::new(HashMap::new()),
                runtimes: RwLock::new(HashMap::new()),
                loops: Mutex::new(HashMap::new()),
                quarantine_threshold,
                instance_id: instance_id.into(),
                stopped: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// 绑定 `task_key` 对应的执行体
    pub fn register_handler(&self, handler: Arc<dyn JobHandler>) -> GeoResult<()> {
        let task_key = handler.task_key().to_string();
        let mut handlers = self
            .inner
            .handlers
            .write()
            .map_err(|_| GeoError::Internal("任务注册表锁已损坏".to_string()))?;
        handlers.insert(task_key.clone(), handler);
        drop(handlers);

        let mut runtimes = self
            .inner
            .runtimes
            .write()
            .map_err(|_| GeoError::Internal("任务注册表锁已损坏".to_string()))?;
        runtimes.entry(task_key).or_default();
        Ok(())
    }

    /// 写入缺失的任务配置，已存在的保持不变
    pub async fn seed_tasks(&self, defaults: Vec<ScheduledTaskConfig>) -> GeoResult<usize> {
        let mut created = 0;
        for task in defaults {
            if self.inner.tasks.create_if_absent(&task).await? {
                info!("写入默认定时任务: {} ({})", task.task_key, task.cron_expression);
                created += 1;
            }
        }
        Ok(created)
    }

    /// 加载全部任务配置，为启用且未隔离的任务启动 cron 循环
    pub async fn start(&self) -> GeoResult<usize> {
        self.inner.stopped.store(false, Ordering::SeqCst);
        let tasks = self.inner.tasks.list().await?;
        let mut scheduled = 0;

        for task in tasks {
            if self.handler(&task.task_key).is_none() {
                warn!("定时任务 {} 没有对应的执行体，跳过", task.task_key);
                continue;
            }
            if !task.is_schedulable() {
                debug!("定时任务 {} 当前状态为 {:?}，不启动", task.task_key, task.job_state());
                continue;
            }
            match self.schedule(&task) {
                Ok(()) => scheduled += 1,
                Err(e) => error!("定时任务 {} 注册失败: {}", task.task_key, e),
            }
        }

        info!("调度器已启动，共注册 {} 个定时任务", scheduled);
        Ok(scheduled)
    }

    /// 重新读取任务配置并重建（或移除）它的 cron 循环，其它任务不受影响
    pub async fn reload_task(&self, task_key: &str) -> GeoResult<JobState> {
        let task = self.load_task(task_key).await?;
        self.unschedule(task_key, "配置重新加载");

        if task.is_schedulable() && !self.is_stopped() {
            if self.handler(task_key).is_none() {
                return Err(GeoError::HandlerNotRegistered {
                    task_key: task_key.to_string(),
                });
            }
            self.schedule(&task)?;
        }

        Ok(task.job_state())
    }

    /// 修改任务的 cron / 启用状态并立即生效
    pub async fn update_task(
        &self,
        task_key: &str,
        update: &TaskScheduleUpdate,
    ) -> GeoResult<ScheduledTaskConfig> {
        if let Some(cron_expression) = &update.cron_expression {
            CronScheduler::validate_cron_expression(cron_expression)?;
        }

        let updated = self.inner.tasks.update_schedule(task_key, update).await?;
        info!(
            "定时任务 {} 配置已更新: cron={}, active={}",
            task_key, updated.cron_expression, updated.is_active
        );
        self.reload_task(task_key).await?;
        Ok(updated)
    }

    pub async fn pause(&self, task_key: &str) -> GeoResult<ScheduledTaskConfig> {
        self.update_task(
            task_key,
            &TaskScheduleUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn resume(&self, task_key: &str) -> GeoResult<ScheduledTaskConfig> {
        self.update_task(
            task_key,
            &TaskScheduleUpdate {
                is_active: Some(true),
                ..Default::default()
            },
        )
        .await
    }

    /// 人工解除隔离，清零连续失败次数并重新注册
    pub async fn clear_quarantine(&self, task_key: &str) -> GeoResult<JobState> {
        self.load_task(task_key).await?;
        self.inner.tasks.clear_quarantine(task_key).await?;
        info!("定时任务 {} 已解除隔离", task_key);
        self.reload_task(task_key).await
    }

    /// 立即执行一次，不影响 cron 循环的下次触发时间
    ///
    /// 暂停中的任务也可以手动执行；隔离中的任务需要先解除隔离。
    /// 返回 `false` 表示上一次运行尚未结束，本次被跳过。
    pub async fn trigger_now(&self, task_key: &str) -> GeoResult<bool> {
        let task = self.load_task(task_key).await?;
        if task.is_quarantined {
            return Err(GeoError::TaskQuarantined {
                task_key: task_key.to_string(),
                reason: task.quarantine_reason.unwrap_or_default(),
            });
        }
        if self.handler(task_key).is_none() {
            return Err(GeoError::HandlerNotRegistered {
                task_key: task_key.to_string(),
            });
        }
        if self.is_stopped() {
            return Err(GeoError::Internal("调度器已停止".to_string()));
        }

        Ok(Self::fire(&self.inner, task_key, true))
    }

    pub fn next_fire_time(&self, task_key: &str) -> Option<DateTime<Utc>> {
        if !self.is_scheduled(task_key) {
            return None;
        }
        self.runtime(task_key).and_then(|runtime| runtime.next_fire())
    }

    pub fn is_scheduled(&self, task_key: &str) -> bool {
        self.inner
            .loops
            .lock()
            .map(|loops| loops.contains_key(task_key))
            .unwrap_or(false)
    }

    pub fn is_running(&self, task_key: &str) -> bool {
        self.runtime(task_key)
            .is_some_and(|runtime| runtime.running.load(Ordering::SeqCst))
    }

    pub fn scheduled_tasks(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .loops
            .lock()
            .map(|loops| loops.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// 当前 cron 循环使用的表达式（规范化之前）
    pub fn scheduled_cron(&self, task_key: &str) -> Option<String> {
        self.inner.loops.lock().ok().and_then(|loops| {
            loops
                .get(task_key)
                .map(|cron_loop| cron_loop.cron_expression.clone())
        })
    }

    /// 正在执行的运行数量
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub async fn job_state(&self, task_key: &str) -> GeoResult<JobState> {
        Ok(self.load_task(task_key).await?.job_state())
    }

    pub async fn job(&self, task_key: &str) -> GeoResult<JobSnapshot> {
        let task = self.load_task(task_key).await?;
        Ok(self.snapshot(task))
    }

    pub async fn jobs(&self) -> GeoResult<Vec<JobSnapshot>> {
        let mut tasks = self.inner.tasks.list().await?;
        tasks.sort_by(|a, b| a.task_key.cmp(&b.task_key));
        Ok(tasks.into_iter().map(|task| self.snapshot(task)).collect())
    }

    /// 停止全部 cron 循环，并在限定时间内等待在途运行结束
    ///
    /// 返回在途运行是否全部结束。
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let keys = self.scheduled_tasks();
        for key in &keys {
            self.unschedule(key, "调度器停止");
        }

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let idle = self.inner.idle.notified();
            let remaining = self.in_flight();
            if remaining == 0 {
                info!("调度器已停止");
                return true;
            }
            debug!("等待 {} 个在途运行结束", remaining);
            if tokio::time::timeout_at(deadline, idle).await.is_err() {
                warn!("等待超时，仍有 {} 个运行未结束", self.in_flight());
                return false;
            }
        }
    }

    fn snapshot(&self, task: ScheduledTaskConfig) -> JobSnapshot {
        let runtime = self.runtime(&task.task_key);
        let scheduled = self.is_scheduled(&task.task_key);
        let state = match task.job_state() {
            JobState::Active if !scheduled => JobState::Registered,
            state => state,
        };
        JobSnapshot {
            state,
            scheduled,
            running: self.is_running(&task.task_key),
            next_fire_time: self.next_fire_time(&task.task_key),
            last_started_at: runtime.and_then(|runtime| runtime.last_started()),
            config: task,
        }
    }

    fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    async fn load_task(&self, task_key: &str) -> GeoResult<ScheduledTaskConfig> {
        self.inner
            .tasks
            .get(task_key)
            .await?
            .ok_or_else(|| GeoError::TaskNotFound {
                task_key: task_key.to_string(),
            })
    }

    fn handler(&self, task_key: &str) -> Option<Arc<dyn JobHandler>> {
        Self::handler_of(&self.inner, task_key)
    }

    fn handler_of(inner: &SchedulerInner, task_key: &str) -> Option<Arc<dyn JobHandler>> {
        inner
            .handlers
            .read()
            .ok()
            .and_then(|handlers| handlers.get(task_key).cloned())
    }

    fn runtime(&self, task_key: &str) -> Option<Arc<JobRuntime>> {
        Self::runtime_of(&self.inner, task_key)
    }

    fn runtime_of(inner: &SchedulerInner, task_key: &str) -> Option<Arc<JobRuntime>> {
        inner
            .runtimes
            .read()
            .ok()
            .and_then(|runtimes| runtimes.get(task_key).cloned())
    }

    /// 启动任务的 cron 循环；下次触发时间在返回前已经确定
    fn schedule(&self, task: &ScheduledTaskConfig) -> GeoResult<()> {
        let cron = CronScheduler::new(&task.cron_expression)?;
        let runtime = self
            .runtime(&task.task_key)
            .ok_or_else(|| GeoError::TaskNotFound {
                task_key: task.task_key.clone(),
            })?;

        let first_fire = cron.next_execution_time(Utc::now());
        runtime.set_next_fire(first_fire);

        let inner = Arc::clone(&self.inner);
        let task_key = task.task_key.clone();
        let handle = tokio::spawn(Self::cron_loop(inner, task_key, cron, runtime, first_fire));

        let mut loops = self
            .inner
            .loops
            .lock()
            .map_err(|_| GeoError::Internal("调度循环表锁已损坏".to_string()))?;
        if let Some(previous) = loops.insert(
            task.task_key.clone(),
            CronLoop {
                cron_expression: task.cron_expression.clone(),
                handle,
            },
        ) {
            previous.handle.abort();
        }
        drop(loops);

        StructuredLogger::log_job_scheduled(&task.task_key, &task.cron_expression, first_fire);
        Ok(())
    }

    fn unschedule(&self, task_key: &str, reason: &str) {
        Self::unschedule_in(&self.inner, task_key, reason);
    }

    fn unschedule_in(inner: &SchedulerInner, task_key: &str, reason: &str) {
        let removed = inner
            .loops
            .lock()
            .ok()
            .and_then(|mut loops| loops.remove(task_key));
        if let Some(cron_loop) = removed {
            cron_loop.handle.abort();
            if let Some(runtime) = Self::runtime_of(inner, task_key) {
                runtime.set_next_fire(None);
            }
            StructuredLogger::log_job_unscheduled(task_key, reason);
        }
    }

    async fn cron_loop(
        inner: Arc<SchedulerInner>,
        task_key: String,
        cron: CronScheduler,
        runtime: Arc<JobRuntime>,
        first_fire: Option<DateTime<Utc>>,
    ) {
        let mut next = first_fire;
        while let Some(fire_at) = next {
            let wait = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            if inner.stopped.load(Ordering::SeqCst) {
                break;
            }
            Self::fire(&inner, &task_key, false);

            next = cron.next_execution_time(Utc::now().max(fire_at));
            runtime.set_next_fire(next);
        }
        debug!("定时任务 {} 的调度循环结束", task_key);
    }

    /// 启动一次运行；上一次仍在进行时跳过并返回 `false`
    fn fire(inner: &Arc<SchedulerInner>, task_key: &str, manual: bool) -> bool {
        let (Some(handler), Some(runtime)) = (
            Self::handler_of(inner, task_key),
            Self::runtime_of(inner, task_key),
        ) else {
            warn!("定时任务 {} 未注册执行体，忽略触发", task_key);
            return false;
        };

        if runtime.running.swap(true, Ordering::SeqCst) {
            StructuredLogger::log_job_skipped(task_key, "上一次运行尚未结束");
            metrics::counter!("geo_job_skipped_total", "task" => task_key.to_string()).increment(1);
            return false;
        }
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last_started) = runtime.last_started.lock() {
            *last_started = Some(Utc::now());
        }

        StructuredLogger::log_job_fired(task_key, manual);
        let guard = RunGuard {
            runtime,
            inner: Arc::clone(inner),
        };
        let inner = Arc::clone(inner);
        let task_key = task_key.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            Self::execute(&inner, &task_key, handler).await;
        });
        true
    }

    /// 执行一次运行并记录结果；执行体的错误和 panic 都在这里被吸收
    async fn execute(inner: &Arc<SchedulerInner>, task_key: &str, handler: Arc<dyn JobHandler>) {
        let entry = match inner
            .execution_logs
            .start(&NewExecutionLog::new(task_key, None, &inner.instance_id))
            .await
        {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("定时任务 {} 写入执行记录失败: {}", task_key, e);
                None
            }
        };

        let started = std::time::Instant::now();
        let result = AssertUnwindSafe(handler.run()).catch_unwind().await;
        let duration_ms = started.elapsed().as_millis() as i64;

        let finish = match result {
            Ok(Ok(summary)) => {
                StructuredLogger::log_job_complete(task_key, true, duration_ms, Some(&summary), None);
                if let Err(e) = inner.tasks.record_success(task_key).await {
                    warn!("更新定时任务 {} 的运行状态失败: {}", task_key, e);
                }
                ExecutionFinish::success(summary)
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                StructuredLogger::log_job_complete(task_key, false, duration_ms, None, Some(&message));
                Self::record_job_failure(inner, task_key, &message).await;
                ExecutionFinish::failure(e.kind(), message)
            }
            Err(payload) => {
                let message = panic_message(payload);
                StructuredLogger::log_job_complete(task_key, false, duration_ms, None, Some(&message));
                Self::record_job_failure(inner, task_key, &message).await;
                ExecutionFinish::failure("Panic", message)
            }
        };

        metrics::counter!(
            "geo_job_runs_total",
            "task" => task_key.to_string(),
            "status" => finish.status.as_str()
        )
        .increment(1);

        if let Some(entry) = entry {
            match inner.execution_logs.finish(entry.id, &finish).await {
                Ok(true) => {}
                Ok(false) => warn!("执行记录 {} 已被提前结束", entry.id),
                Err(e) => error!("结束执行记录 {} 失败: {}", entry.id, e),
            }
        }
    }

    /// 累加连续失败次数，达到阈值时隔离任务
    async fn record_job_failure(inner: &Arc<SchedulerInner>, task_key: &str, message: &str) {
        let failures = match inner.tasks.record_failure(task_key).await {
            Ok(failures) => failures,
            Err(e) => {
                error!("记录定时任务 {} 失败次数出错: {}", task_key, e);
                return;
            }
        };

        if failures < inner.quarantine_threshold {
            warn!(
                "定时任务 {} 连续失败 {}/{} 次",
                task_key, failures, inner.quarantine_threshold
            );
            return;
        }

        let reason = format!("连续失败 {failures} 次，最近一次: {message}");
        if let Err(e) = inner.tasks.quarantine(task_key, &reason, Utc::now()).await {
            error!("隔离定时任务 {} 失败: {}", task_key, e);
            return;
        }
        Self::unschedule_in(inner, task_key, "任务已隔离");
        StructuredLogger::log_job_quarantined(task_key, failures, &reason);
        inner
            .notifier
            .notify(NotificationEvent::TaskQuarantined {
                task_key: task_key.to_string(),
                reason,
            })
            .await;
    }
}
