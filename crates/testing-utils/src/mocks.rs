//! 存储接口与外部能力的内存实现
//!
//! 行为与 SQLite 实现保持一致（比较并交换认领、执行记录只结束一次等），
//! 便于在不依赖数据库的情况下测试调度核心。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use geo_core::{
    AccountProvider, AccountStatus, ArticleStore, BrowserContext, BrowserPool, ExecutionFinish,
    ExecutionLogEntry, ExecutionLogStore, ExecutionStatus, GeoError, GeoResult, IndexCheckOutcome,
    IndexCheckStore, IndexCheckTarget, IndexChecker, IndexStatus, NewExecutionLog,
    NotificationEvent, Notifier, PlatformAccount, PublishFailure, PublishResult, PublishStatus,
    PublishableArticle, Publisher, ScheduledTaskConfig, SessionState, TaskScheduleUpdate,
    TaskStore,
};

/// Mock implementation of TaskStore for testing
#[derive(Debug, Clone, Default)]
pub struct MockTaskStore {
    tasks: Arc<Mutex<HashMap<String, ScheduledTaskConfig>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<ScheduledTaskConfig>) -> Self {
        let store = Self::new();
        for task in tasks {
            store.insert(task);
        }
        store
    }

    pub fn insert(&self, mut task: ScheduledTaskConfig) -> ScheduledTaskConfig {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        task.id = *next_id;
        self.tasks
            .lock()
            .unwrap()
            .insert(task.task_key.clone(), task.clone());
        task
    }

    pub fn snapshot(&self, task_key: &str) -> Option<ScheduledTaskConfig> {
        self.tasks.lock().unwrap().get(task_key).cloned()
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    fn modify<F>(&self, task_key: &str, f: F) -> GeoResult<ScheduledTaskConfig>
    where
        F: FnOnce(&mut ScheduledTaskConfig),
    {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(task_key)
            .ok_or_else(|| GeoError::TaskNotFound {
                task_key: task_key.to_string(),
            })?;
        f(task);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }
}

#[async_trait]
impl TaskStore for MockTaskStore {
    async fn list(&self) -> GeoResult<Vec<ScheduledTaskConfig>> {
        let mut tasks: Vec<ScheduledTaskConfig> =
            self.tasks.lock().unwrap().values().cloned().collect();
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    async fn get(&self, task_key: &str) -> GeoResult<Option<ScheduledTaskConfig>> {
        Ok(self.snapshot(task_key))
    }

    async fn create_if_absent(&self, task: &ScheduledTaskConfig) -> GeoResult<bool> {
        if self.tasks.lock().unwrap().contains_key(&task.task_key) {
            return Ok(false);
        }
        self.insert(task.clone());
        Ok(true)
    }

    async fn update_schedule(
        &self,
        task_key: &str,
        update: &TaskScheduleUpdate,
    ) -> GeoResult<ScheduledTaskConfig> {
        self.modify(task_key, |task| {
            if let Some(cron_expression) = &update.cron_expression {
                task.cron_expression = cron_expression.clone();
            }
            if let Some(is_active) = update.is_active {
                task.is_active = is_active;
            }
            if let Some(name) = &update.name {
                task.name = name.clone();
            }
            if let Some(description) = &update.description {
                task.description = Some(description.clone());
            }
        })
    }

    async fn record_success(&self, task_key: &str) -> GeoResult<()> {
        self.modify(task_key, |task| task.consecutive_failures = 0)
            .map(|_| ())
    }

    async fn record_failure(&self, task_key: &str) -> GeoResult<i32> {
        self.modify(task_key, |task| task.consecutive_failures += 1)
            .map(|task| task.consecutive_failures)
    }

    async fn quarantine(&self, task_key: &str, reason: &str, at: DateTime<Utc>) -> GeoResult<()> {
        self.modify(task_key, |task| {
            task.is_quarantined = true;
            task.quarantine_reason = Some(reason.to_string());
            task.quarantine_at = Some(at);
        })
        .map(|_| ())
    }

    async fn clear_quarantine(&self, task_key: &str) -> GeoResult<()> {
        self.modify(task_key, |task| {
            task.is_quarantined = false;
            task.quarantine_reason = None;
            task.quarantine_at = None;
            task.consecutive_failures = 0;
        })
        .map(|_| ())
    }
}

/// Mock implementation of ArticleStore for testing
#[derive(Debug, Clone, Default)]
pub struct MockArticleStore {
    articles: Arc<Mutex<HashMap<i64, PublishableArticle>>>,
    next_id: Arc<Mutex<i64>>,
    mark_published_failures: Arc<Mutex<usize>>,
}

impl MockArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入文章，`id` 为 0 时自动分配
    pub fn insert(&self, mut article: PublishableArticle) -> i64 {
        let mut next_id = self.next_id.lock().unwrap();
        if article.id == 0 {
            *next_id += 1;
            article.id = *next_id;
        } else {
            *next_id = (*next_id).max(article.id);
        }
        let id = article.id;
        self.articles.lock().unwrap().insert(id, article);
        id
    }

    pub fn snapshot(&self, id: i64) -> Option<PublishableArticle> {
        self.articles.lock().unwrap().get(&id).cloned()
    }

    /// 之后的 `times` 次 `mark_published` 返回数据库错误
    pub fn fail_mark_published(&self, times: usize) {
        *self.mark_published_failures.lock().unwrap() = times;
    }

    pub fn count_by_status(&self, status: PublishStatus) -> usize {
        self.articles
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.publish_status == status)
            .count()
    }

    fn modify<F>(&self, id: i64, f: F) -> GeoResult<()>
    where
        F: FnOnce(&mut PublishableArticle),
    {
        let mut articles = self.articles.lock().unwrap();
        let article = articles
            .get_mut(&id)
            .ok_or(GeoError::ArticleNotFound { id })?;
        f(article);
        Ok(())
    }
}

#[async_trait]
impl ArticleStore for MockArticleStore {
    async fn get(&self, id: i64) -> GeoResult<Option<PublishableArticle>> {
        Ok(self.snapshot(id))
    }

    async fn list_eligible(
        &self,
        now: DateTime<Utc>,
        platforms: &[String],
        limit: i64,
    ) -> GeoResult<Vec<PublishableArticle>> {
        let mut eligible: Vec<PublishableArticle> = self
            .articles
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.is_eligible(now) && platforms.contains(&a.platform))
            .cloned()
            .collect();
        eligible.sort_by(|a, b| {
            a.last_attempt_at
                .cmp(&b.last_attempt_at)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        eligible.truncate(limit.max(0) as usize);
        Ok(eligible)
    }

    async fn record_attempt(&self, id: i64, at: DateTime<Utc>) -> GeoResult<()> {
        self.modify(id, |article| article.last_attempt_at = Some(at))
    }

    async fn try_claim(
        &self,
        id: i64,
        expected_status: PublishStatus,
        expected_retry_count: i32,
        now: DateTime<Utc>,
    ) -> GeoResult<bool> {
        let mut articles = self.articles.lock().unwrap();
        match articles.get_mut(&id) {
            Some(article)
                if article.publish_status == expected_status
                    && article.retry_count == expected_retry_count =>
            {
                article.publish_status = PublishStatus::Publishing;
                article.last_attempt_at = Some(now);
                article.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_published(
        &self,
        id: i64,
        platform_url: Option<&str>,
        at: DateTime<Utc>,
    ) -> GeoResult<()> {
        {
            let mut failures = self.mark_published_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(GeoError::DatabaseOperation(format!(
                    "更新文章 ({id}) 时发生数据库错误: database is locked"
                )));
            }
        }
        self.modify(id, |article| {
            article.publish_status = PublishStatus::Published;
            article.platform_url = platform_url.map(str::to_string);
            article.published_at = Some(at);
            article.next_retry_at = None;
            article.error_msg = None;
            article.updated_at = at;
        })
    }

    async fn mark_failed(&self, id: i64, failure: &PublishFailure) -> GeoResult<()> {
        self.modify(id, |article| {
            article.publish_status = PublishStatus::Failed;
            article.retry_count = failure.retry_count;
            article.next_retry_at = failure.next_retry_at;
            article.error_msg = Some(failure.error_msg.clone());
            article.updated_at = Utc::now();
        })
    }

    async fn list_stuck_publishing(
        &self,
        updated_before: DateTime<Utc>,
    ) -> GeoResult<Vec<PublishableArticle>> {
        let mut stuck: Vec<PublishableArticle> = self
            .articles
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.publish_status == PublishStatus::Publishing && a.updated_at < updated_before)
            .cloned()
            .collect();
        stuck.sort_by_key(|a| a.id);
        Ok(stuck)
    }
}

/// Mock implementation of ExecutionLogStore for testing
#[derive(Debug, Clone, Default)]
pub struct MockExecutionLogStore {
    entries: Arc<Mutex<HashMap<i64, ExecutionLogEntry>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockExecutionLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<ExecutionLogEntry> {
        let mut entries: Vec<ExecutionLogEntry> =
            self.entries.lock().unwrap().values().cloned().collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    pub fn for_target(&self, task_key: &str, target_id: i64) -> Vec<ExecutionLogEntry> {
        self.all()
            .into_iter()
            .filter(|e| e.task_key == task_key && e.target_id == Some(target_id))
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.is_running())
            .count()
    }

    /// 直接写入一条记录（用于构造崩溃遗留的数据）
    pub fn insert(&self, mut entry: ExecutionLogEntry) -> i64 {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        entry.id = *next_id;
        let id = entry.id;
        self.entries.lock().unwrap().insert(id, entry);
        id
    }

    fn sorted_desc(mut entries: Vec<ExecutionLogEntry>, limit: i64) -> Vec<ExecutionLogEntry> {
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        entries.truncate(limit.max(0) as usize);
        entries
    }
}

#[async_trait]
impl ExecutionLogStore for MockExecutionLogStore {
    async fn start(&self, entry: &NewExecutionLog) -> GeoResult<ExecutionLogEntry> {
        let record = ExecutionLogEntry {
            id: 0,
            task_key: entry.task_key.clone(),
            target_id: entry.target_id,
            instance_id: entry.instance_id.clone(),
            status: ExecutionStatus::Running,
            started_at: entry.started_at,
            heartbeat_at: entry.started_at,
            finished_at: None,
            duration_ms: None,
            result_summary: None,
            error_type: None,
            error_msg: None,
            retry_count: entry.retry_count,
        };
        let id = self.insert(record.clone());
        Ok(ExecutionLogEntry { id, ..record })
    }

    async fn heartbeat(&self, id: i64, at: DateTime<Utc>) -> GeoResult<()> {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&id) {
            if entry.is_running() {
                entry.heartbeat_at = at;
            }
        }
        Ok(())
    }

    async fn finish(&self, id: i64, finish: &ExecutionFinish) -> GeoResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&id) {
            Some(entry) if entry.is_running() => {
                entry.status = finish.status;
                entry.finished_at = Some(finish.finished_at);
                entry.duration_ms = Some((finish.finished_at - entry.started_at).num_milliseconds());
                entry.result_summary = finish.result_summary.clone();
                entry.error_type = finish.error_type.clone();
                entry.error_msg = finish.error_msg.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, id: i64) -> GeoResult<Option<ExecutionLogEntry>> {
        Ok(self.entries.lock().unwrap().get(&id).cloned())
    }

    async fn list_by_task(
        &self,
        task_key: &str,
        limit: i64,
    ) -> GeoResult<Vec<ExecutionLogEntry>> {
        let entries = self
            .all()
            .into_iter()
            .filter(|e| e.task_key == task_key)
            .collect();
        Ok(Self::sorted_desc(entries, limit))
    }

    async fn list_by_target(
        &self,
        task_key: &str,
        target_id: i64,
        limit: i64,
    ) -> GeoResult<Vec<ExecutionLogEntry>> {
        Ok(Self::sorted_desc(self.for_target(task_key, target_id), limit))
    }

    async fn list_stale_running(
        &self,
        seen_before: DateTime<Utc>,
    ) -> GeoResult<Vec<ExecutionLogEntry>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|e| e.is_running() && e.last_seen() < seen_before)
            .collect())
    }

    async fn count_running(&self) -> GeoResult<i64> {
        Ok(self.running_count() as i64)
    }

    async fn cleanup_before(&self, before: DateTime<Utc>) -> GeoResult<u64> {
        let mut entries = self.entries.lock().unwrap();
        let before_len = entries.len();
        entries.retain(|_, e| e.finished_at.map_or(true, |finished| finished >= before));
        Ok((before_len - entries.len()) as u64)
    }
}

/// Mock implementation of AccountProvider for testing
#[derive(Debug, Clone, Default)]
pub struct MockAccountProvider {
    accounts: Arc<Mutex<HashMap<i64, PlatformAccount>>>,
}

impl MockAccountProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<PlatformAccount>) -> Self {
        let provider = Self::new();
        for account in accounts {
            provider.insert(account);
        }
        provider
    }

    pub fn insert(&self, account: PlatformAccount) {
        self.accounts.lock().unwrap().insert(account.id, account);
    }

    pub fn snapshot(&self, id: i64) -> Option<PlatformAccount> {
        self.accounts.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl AccountProvider for MockAccountProvider {
    async fn active_account(&self, platform: &str) -> GeoResult<Option<PlatformAccount>> {
        let accounts = self.accounts.lock().unwrap();
        let mut candidates: Vec<&PlatformAccount> = accounts
            .values()
            .filter(|a| a.platform == platform && a.is_active())
            .collect();
        candidates.sort_by(|a, b| a.last_used_at.cmp(&b.last_used_at).then(a.id.cmp(&b.id)));
        Ok(candidates.first().map(|a| (*a).clone()))
    }

    async fn mark_invalid(&self, account_id: i64, reason: &str) -> GeoResult<()> {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(&account_id) {
            account.status = AccountStatus::Invalid;
            account.invalid_reason = Some(reason.to_string());
            account.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn touch(&self, account_id: i64, at: DateTime<Utc>) -> GeoResult<()> {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(&account_id) {
            account.last_used_at = Some(at);
        }
        Ok(())
    }
}

/// Mock implementation of IndexCheckStore for testing
#[derive(Debug, Clone, Default)]
pub struct MockIndexCheckStore {
    targets: Arc<Mutex<HashMap<i64, IndexCheckTarget>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockIndexCheckStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, mut target: IndexCheckTarget) -> i64 {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        target.id = *next_id;
        let id = target.id;
        self.targets.lock().unwrap().insert(id, target);
        id
    }

    pub fn snapshot(&self, id: i64) -> Option<IndexCheckTarget> {
        self.targets.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl IndexCheckStore for MockIndexCheckStore {
    async fn get(&self, id: i64) -> GeoResult<Option<IndexCheckTarget>> {
        Ok(self.snapshot(id))
    }

    async fn list_due(
        &self,
        before: DateTime<Utc>,
        platforms: &[String],
        limit: i64,
    ) -> GeoResult<Vec<IndexCheckTarget>> {
        let mut due: Vec<IndexCheckTarget> = self
            .targets
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.is_due(before) && platforms.contains(&t.platform))
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.last_attempt_at
                .cmp(&b.last_attempt_at)
                .then(a.last_check_time.cmp(&b.last_check_time))
                .then(a.id.cmp(&b.id))
        });
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn record_attempt(&self, id: i64, at: DateTime<Utc>) -> GeoResult<()> {
        let mut targets = self.targets.lock().unwrap();
        let target = targets
            .get_mut(&id)
            .ok_or(GeoError::IndexTargetNotFound { id })?;
        target.last_attempt_at = Some(at);
        Ok(())
    }

    async fn record_result(
        &self,
        id: i64,
        status: IndexStatus,
        answer_excerpt: Option<&str>,
        checked_at: DateTime<Utc>,
    ) -> GeoResult<()> {
        let mut targets = self.targets.lock().unwrap();
        let target = targets
            .get_mut(&id)
            .ok_or(GeoError::IndexTargetNotFound { id })?;
        target.index_status = status;
        target.last_answer_excerpt = answer_excerpt.map(str::to_string);
        target.last_check_time = Some(checked_at);
        Ok(())
    }
}

/// 记录上下文创建与销毁次数的浏览器池
#[derive(Debug, Default)]
pub struct MockBrowserPool {
    contexts: Mutex<HashMap<String, BrowserContext>>,
    created: AtomicUsize,
    discarded: AtomicUsize,
    fail_acquire: Mutex<Option<String>>,
}

impl MockBrowserPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的 `acquire` 都返回自动化错误
    pub fn fail_with(&self, message: &str) {
        *self.fail_acquire.lock().unwrap() = Some(message.to_string());
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserPool for MockBrowserPool {
    async fn acquire(&self, platform: &str) -> GeoResult<BrowserContext> {
        if let Some(message) = self.fail_acquire.lock().unwrap().clone() {
            return Err(GeoError::Automation(message));
        }
        let mut contexts = self.contexts.lock().unwrap();
        let context = contexts.entry(platform.to_string()).or_insert_with(|| {
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            BrowserContext {
                id: format!("ctx-{platform}-{n}"),
                platform: platform.to_string(),
                created_at: Utc::now(),
            }
        });
        Ok(context.clone())
    }

    async fn discard(&self, context: &BrowserContext) {
        let mut contexts = self.contexts.lock().unwrap();
        if contexts
            .get(&context.platform)
            .is_some_and(|current| current.id == context.id)
        {
            contexts.remove(&context.platform);
        }
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

/// 收集全部通知事件
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// 发布器的脚本动作
#[derive(Debug, Clone)]
pub enum PublishBehavior {
    Succeed(String),
    Fail(String),
    Error(String),
    Panic(String),
    /// 永不返回，用于测试超时
    Hang,
}

/// 按脚本依次返回结果的发布器，脚本用完后使用默认动作
#[derive(Debug)]
pub struct ScriptedPublisher {
    platform: String,
    script: Mutex<VecDeque<PublishBehavior>>,
    default_behavior: PublishBehavior,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl ScriptedPublisher {
    pub fn new(platform: &str, default_behavior: PublishBehavior) -> Self {
        Self {
            platform: platform.to_string(),
            script: Mutex::new(VecDeque::new()),
            default_behavior,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(platform: &str) -> Self {
        Self::new(
            platform,
            PublishBehavior::Succeed(format!("https://{platform}.example.com/p/1")),
        )
    }

    pub fn failing(platform: &str, message: &str) -> Self {
        Self::new(platform, PublishBehavior::Fail(message.to_string()))
    }

    pub fn then(self, behavior: PublishBehavior) -> Self {
        self.script.lock().unwrap().push_back(behavior);
        self
    }

    /// 每次发布前等待的时长，用于观察并发
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 同时执行的发布数量峰值
    pub fn peak_concurrency(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    fn next_behavior(&self) -> PublishBehavior {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_behavior.clone())
    }
}

/// 离开作用域时减少活跃计数
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn publish(
        &self,
        _context: &BrowserContext,
        _article: &PublishableArticle,
        _account: &PlatformAccount,
        _session: &SessionState,
    ) -> GeoResult<PublishResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let behavior = self.next_behavior();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match behavior {
            PublishBehavior::Succeed(url) => Ok(PublishResult::published(url)),
            PublishBehavior::Fail(message) => Ok(PublishResult::failed(message)),
            PublishBehavior::Error(message) => Err(GeoError::Automation(message)),
            PublishBehavior::Panic(message) => panic!("{}", message),
            PublishBehavior::Hang => {
                std::future::pending().await
            }
        }
    }
}

/// 检测器的脚本动作
#[derive(Debug, Clone)]
pub enum CheckBehavior {
    Found(String),
    NotFound,
    Error(String),
    Panic(String),
    Hang,
}

#[derive(Debug)]
pub struct ScriptedIndexChecker {
    platform: String,
    behavior: CheckBehavior,
    calls: AtomicUsize,
}

impl ScriptedIndexChecker {
    pub fn new(platform: &str, behavior: CheckBehavior) -> Self {
        Self {
            platform: platform.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexChecker for ScriptedIndexChecker {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn check(
        &self,
        _context: &BrowserContext,
        target: &IndexCheckTarget,
    ) -> GeoResult<IndexCheckOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            CheckBehavior::Found(excerpt) => Ok(IndexCheckOutcome {
                keyword_found: true,
                citation_found: excerpt.contains(&target.keyword),
                answer_excerpt: Some(excerpt.clone()),
            }),
            CheckBehavior::NotFound => Ok(IndexCheckOutcome::default()),
            CheckBehavior::Error(message) => Err(GeoError::Automation(message.clone())),
            CheckBehavior::Panic(message) => panic!("{}", message),
            CheckBehavior::Hang => {
                std::future::pending().await
            }
        }
    }
}
