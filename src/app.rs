use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use geo_api::AppState;
use geo_core::{
    AccountProvider, AppConfig, ArticleStore, BrowserPool, ExecutionLogStore, IndexCheckStore,
    Notifier, ScheduledTaskConfig, TaskStore,
};
use geo_dispatcher::{
    ConcurrencyLimiter, ExecutionLogCleanupJob, HumanPacing, IndexCheckDispatcher, IndexCheckJob,
    PublishDispatcher, PublishScanJob, RetryPolicy, StaleExecutionRecovery, TaskScheduler,
};
use geo_infrastructure::{
    index_checker_registry, publisher_registry, AutomationClient, DatabaseManager,
    SharedBrowserPool, TracingNotifier,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 本实例的标识，写入执行记录用于区分多实例部署
pub fn instance_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("{}-{}", host, std::process::id())
}

/// 主应用程序
///
/// 负责组装存储、自动化桥接、派发器和调度器，并管理它们的启动与关闭。
pub struct Application {
    config: AppConfig,
    instance_id: String,
    database: DatabaseManager,
    scheduler: TaskScheduler,
    recovery: Arc<StaleExecutionRecovery>,
    execution_logs: Arc<dyn ExecutionLogStore>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig, instance_id: impl Into<String>) -> Result<Self> {
        let instance_id = instance_id.into();
        info!("初始化应用程序，实例: {}", instance_id);

        let database = DatabaseManager::new(&config.database)
            .await
            .context("创建数据库连接池失败")?;
        database.migrate().await.context("初始化数据库结构失败")?;

        let tasks: Arc<dyn TaskStore> = Arc::new(database.task_store());
        let articles: Arc<dyn ArticleStore> = Arc::new(database.article_store());
        let execution_logs: Arc<dyn ExecutionLogStore> =
            Arc::new(database.execution_log_store());
        let accounts: Arc<dyn AccountProvider> = Arc::new(database.account_provider());
        let targets: Arc<dyn IndexCheckStore> = Arc::new(database.index_check_store());

        let client = Arc::new(
            AutomationClient::new(&config.automation).context("创建自动化服务客户端失败")?,
        );
        let publishers = Arc::new(publisher_registry(
            client.clone(),
            &config.automation.publish_platforms,
        ));
        let checkers = Arc::new(index_checker_registry(
            client,
            &config.automation.index_platforms,
        ));

        let browser_pool: Arc<dyn BrowserPool> = Arc::new(SharedBrowserPool::new());
        let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier::new());
        let scheduler_config = &config.scheduler;
        // 发布与收录检测共用同一组槽位
        let limiter = ConcurrencyLimiter::new(
            scheduler_config.max_concurrent_jobs,
            scheduler_config.slot_wait(),
        );
        let pacing = HumanPacing::from_config(&config.pacing);
        let retry_policy = RetryPolicy::from_config(scheduler_config);

        let publish_dispatcher = Arc::new(
            PublishDispatcher::new(
                articles.clone(),
                accounts,
                execution_logs.clone(),
                publishers,
                browser_pool.clone(),
                notifier.clone(),
                limiter.clone(),
            )
            .with_retry_policy(retry_policy.clone())
            .with_pacing(pacing.clone())
            .with_timeout(scheduler_config.dispatch_timeout())
            .with_instance_id(instance_id.clone()),
        );
        let index_check_dispatcher = Arc::new(
            IndexCheckDispatcher::new(
                targets.clone(),
                execution_logs.clone(),
                checkers,
                browser_pool,
                limiter,
            )
            .with_pacing(pacing)
            .with_timeout(scheduler_config.index_check_timeout())
            .with_instance_id(instance_id.clone()),
        );

        let recovery = Arc::new(StaleExecutionRecovery::new(
            execution_logs.clone(),
            articles.clone(),
            notifier.clone(),
            retry_policy,
            scheduler_config.stale_threshold(),
        ));

        let scheduler = TaskScheduler::new(
            tasks,
            execution_logs.clone(),
            notifier,
            scheduler_config.task_quarantine_threshold,
            instance_id.clone(),
        );
        scheduler.register_handler(Arc::new(PublishScanJob::new(
            articles,
            publish_dispatcher,
            scheduler_config.publish_batch_size,
        )))?;
        scheduler.register_handler(Arc::new(IndexCheckJob::new(
            targets,
            index_check_dispatcher,
            scheduler_config.index_check_batch_size,
            chrono::Duration::hours(scheduler_config.index_recheck_hours),
        )))?;
        scheduler.register_handler(recovery.clone())?;
        scheduler.register_handler(Arc::new(ExecutionLogCleanupJob::new(
            execution_logs.clone(),
            chrono::Duration::days(scheduler_config.execution_log_retention_days),
        )))?;

        let seeded = scheduler
            .seed_tasks(ScheduledTaskConfig::defaults())
            .await
            .context("写入默认定时任务失败")?;
        if seeded > 0 {
            info!("写入 {} 个默认定时任务", seeded);
        }

        Ok(Self {
            config,
            instance_id,
            database,
            scheduler,
            recovery,
            execution_logs,
        })
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// 运行应用程序，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序");

        // 上次进程崩溃遗留的执行记录和文章，先于调度释放
        match self.recovery.sweep().await {
            Ok(report) => info!("启动恢复完成: {}", report.summary()),
            Err(e) => warn!("启动恢复失败，将由定时清理任务重试: {}", e),
        }

        self.scheduler.start().await.context("启动调度器失败")?;

        let api_handle = if self.config.api.enabled {
            let state = AppState {
                scheduler: self.scheduler.clone(),
                execution_logs: self.execution_logs.clone(),
            };
            let bind_address = self.config.api.bind_address.clone();
            let mut api_shutdown = shutdown_rx.resubscribe();
            Some(tokio::spawn(async move {
                let shutdown = async move {
                    let _ = api_shutdown.recv().await;
                };
                if let Err(e) = geo_api::serve(&bind_address, state, shutdown).await {
                    error!("API服务运行失败: {:#}", e);
                }
            }))
        } else {
            info!("API服务已禁用");
            None
        };

        let _ = shutdown_rx.recv().await;
        info!("收到关闭信号，停止调度器");

        let grace = Duration::from_secs(self.config.scheduler.shutdown_grace_seconds);
        if !self.scheduler.shutdown(grace).await {
            warn!(
                "等待在途运行超时（{}秒），剩余运行将由卡死任务清理接管",
                grace.as_secs()
            );
        }

        if let Some(handle) = api_handle {
            if let Err(e) = handle.await {
                error!("API服务任务异常结束: {}", e);
            }
        }

        self.database.close().await;
        info!("应用程序已停止");
        Ok(())
    }
}
