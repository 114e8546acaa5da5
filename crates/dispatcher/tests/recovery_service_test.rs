use std::sync::Arc;

use chrono::{Duration, Utc};

use geo_core::{
    ExecutionLogEntry, ExecutionStatus, NotificationEvent, PublishStatus, Publisher,
    PublisherRegistry, PUBLISHED_WRITE_BACK_ERROR, TASK_AUTO_PUBLISH, TASK_INDEX_CHECK,
    TASK_STALE_SWEEP,
};
use geo_dispatcher::{
    ConcurrencyLimiter, DispatchOutcome, JobHandler, PublishDispatcher, RetryPolicy, SkipReason,
    StaleExecutionRecovery,
};
use geo_testing_utils::{
    AccountBuilder, ArticleBuilder, MockAccountProvider, MockArticleStore, MockBrowserPool,
    MockExecutionLogStore, RecordingNotifier, ScriptedPublisher,
};

struct Fixture {
    articles: Arc<MockArticleStore>,
    logs: Arc<MockExecutionLogStore>,
    notifier: Arc<RecordingNotifier>,
    recovery: StaleExecutionRecovery,
}

fn fixture() -> Fixture {
    let articles = Arc::new(MockArticleStore::new());
    let logs = Arc::new(MockExecutionLogStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let recovery = StaleExecutionRecovery::new(
        logs.clone(),
        articles.clone(),
        notifier.clone(),
        RetryPolicy::default(),
        Duration::minutes(15),
    );
    Fixture {
        articles,
        logs,
        notifier,
        recovery,
    }
}

fn running_entry(task_key: &str, target_id: Option<i64>, last_seen_ago: Duration) -> ExecutionLogEntry {
    let started_at = Utc::now() - last_seen_ago - Duration::minutes(1);
    ExecutionLogEntry {
        id: 0,
        task_key: task_key.to_string(),
        target_id,
        instance_id: "crashed-instance".to_string(),
        status: ExecutionStatus::Running,
        started_at,
        heartbeat_at: Utc::now() - last_seen_ago,
        finished_at: None,
        duration_ms: None,
        result_summary: None,
        error_type: None,
        error_msg: None,
        retry_count: 0,
    }
}

#[tokio::test]
async fn test_stale_publish_entry_is_abandoned_and_article_released() {
    let fx = fixture();
    let article_id = fx.articles.insert(
        ArticleBuilder::new()
            .with_status(PublishStatus::Publishing)
            .updated_ago(Duration::minutes(40))
            .build(),
    );
    let entry_id = fx.logs.insert(running_entry(
        TASK_AUTO_PUBLISH,
        Some(article_id),
        Duration::minutes(30),
    ));

    let report = fx.recovery.sweep().await.unwrap();

    assert_eq!(report.abandoned_executions, vec![entry_id]);
    assert_eq!(report.released_articles, vec![article_id]);
    assert!(report.quarantined_articles.is_empty());
    assert!(report.errors.is_empty());

    let entry = fx.logs.all().into_iter().find(|e| e.id == entry_id).unwrap();
    assert_eq!(entry.status, ExecutionStatus::Failure);
    assert_eq!(entry.error_type.as_deref(), Some("Abandoned"));
    assert!(entry.finished_at.is_some());

    let article = fx.articles.snapshot(article_id).unwrap();
    assert_eq!(article.publish_status, PublishStatus::Failed);
    assert_eq!(article.retry_count, 1);
    assert!(article.next_retry_at.is_some());
}

#[tokio::test]
async fn test_stuck_article_without_entry_is_released() {
    let fx = fixture();
    let article_id = fx.articles.insert(
        ArticleBuilder::new()
            .with_status(PublishStatus::Publishing)
            .with_retry_count(1)
            .updated_ago(Duration::hours(2))
            .build(),
    );

    let report = fx.recovery.sweep().await.unwrap();

    assert!(report.abandoned_executions.is_empty());
    assert_eq!(report.released_articles, vec![article_id]);
    let article = fx.articles.snapshot(article_id).unwrap();
    assert_eq!(article.publish_status, PublishStatus::Failed);
    assert_eq!(article.retry_count, 2);
}

#[tokio::test]
async fn test_stuck_article_with_exhausted_budget_is_quarantined() {
    let fx = fixture();
    let article_id = fx.articles.insert(
        ArticleBuilder::new()
            .with_status(PublishStatus::Publishing)
            .with_retry_count(3)
            .updated_ago(Duration::hours(1))
            .build(),
    );

    let report = fx.recovery.sweep().await.unwrap();

    assert_eq!(report.quarantined_articles, vec![article_id]);
    let article = fx.articles.snapshot(article_id).unwrap();
    assert!(article.is_quarantined());
    assert!(fx.notifier.events().iter().any(|event| matches!(
        event,
        NotificationEvent::ArticleQuarantined { article_id: id, .. } if *id == article_id
    )));
}

#[tokio::test]
async fn test_live_execution_is_left_alone() {
    let fx = fixture();
    let article_id = fx.articles.insert(
        ArticleBuilder::new()
            .with_status(PublishStatus::Publishing)
            .updated_ago(Duration::minutes(20))
            .build(),
    );
    fx.logs.insert(running_entry(
        TASK_AUTO_PUBLISH,
        Some(article_id),
        Duration::seconds(10),
    ));

    let report = fx.recovery.sweep().await.unwrap();

    assert!(report.abandoned_executions.is_empty());
    assert!(report.released_articles.is_empty());
    assert_eq!(fx.logs.running_count(), 1);
    assert_eq!(
        fx.articles.snapshot(article_id).unwrap().publish_status,
        PublishStatus::Publishing
    );
}

#[tokio::test]
async fn test_recently_claimed_article_is_not_released() {
    let fx = fixture();
    let article_id = fx.articles.insert(
        ArticleBuilder::new()
            .with_status(PublishStatus::Publishing)
            .updated_ago(Duration::minutes(2))
            .build(),
    );

    let report = fx.recovery.sweep().await.unwrap();

    assert!(report.released_articles.is_empty());
    assert_eq!(
        fx.articles.snapshot(article_id).unwrap().publish_status,
        PublishStatus::Publishing
    );
}

#[tokio::test]
async fn test_job_level_entry_is_abandoned_without_article_changes() {
    let fx = fixture();
    let entry_id = fx
        .logs
        .insert(running_entry(TASK_INDEX_CHECK, None, Duration::hours(3)));

    let report = fx.recovery.sweep().await.unwrap();

    assert_eq!(report.abandoned_executions, vec![entry_id]);
    assert!(report.released_articles.is_empty());
    assert_eq!(fx.logs.running_count(), 0);
}

#[tokio::test]
async fn test_second_sweep_finds_nothing() {
    let fx = fixture();
    let article_id = fx.articles.insert(
        ArticleBuilder::new()
            .with_status(PublishStatus::Publishing)
            .updated_ago(Duration::hours(1))
            .build(),
    );
    fx.logs.insert(running_entry(
        TASK_AUTO_PUBLISH,
        Some(article_id),
        Duration::hours(1),
    ));

    let first = fx.recovery.sweep().await.unwrap();
    let second = fx.recovery.sweep().await.unwrap();

    assert_eq!(first.released_articles.len(), 1);
    assert!(second.abandoned_executions.is_empty());
    assert!(second.released_articles.is_empty());
    assert_eq!(fx.articles.snapshot(article_id).unwrap().retry_count, 1);
}

#[tokio::test]
async fn test_recovery_runs_as_job() {
    let fx = fixture();
    fx.logs
        .insert(running_entry(TASK_INDEX_CHECK, None, Duration::hours(1)));

    assert_eq!(fx.recovery.task_key(), TASK_STALE_SWEEP);
    let summary = fx.recovery.run().await.unwrap();

    assert!(summary.contains("结束失联记录 1 条"), "{summary}");
}

#[tokio::test]
async fn test_unrecorded_publish_is_completed_not_retried() {
    let fx = fixture();
    let article_id = fx.articles.insert(
        ArticleBuilder::new()
            .with_status(PublishStatus::Publishing)
            .updated_ago(Duration::hours(1))
            .build(),
    );
    let mut entry = running_entry(TASK_AUTO_PUBLISH, Some(article_id), Duration::hours(1));
    entry.status = ExecutionStatus::Failure;
    entry.finished_at = Some(Utc::now() - Duration::minutes(59));
    entry.error_type = Some(PUBLISHED_WRITE_BACK_ERROR.to_string());
    entry.result_summary = Some("https://zhihu.example.com/p/9".to_string());
    fx.logs.insert(entry);

    let report = fx.recovery.sweep().await.unwrap();

    assert_eq!(report.completed_publishes, vec![article_id]);
    assert!(report.released_articles.is_empty());
    let article = fx.articles.snapshot(article_id).unwrap();
    assert_eq!(article.publish_status, PublishStatus::Published);
    assert_eq!(article.retry_count, 0);
    assert_eq!(
        article.platform_url.as_deref(),
        Some("https://zhihu.example.com/p/9")
    );
    assert!(fx.notifier.events().iter().any(|event| matches!(
        event,
        NotificationEvent::ArticlePublished { article_id: id, .. } if *id == article_id
    )));
}

#[tokio::test]
async fn test_lost_write_back_never_publishes_twice() {
    let fx = fixture();
    let article_id = fx.articles.insert(ArticleBuilder::new().build());
    let publisher = Arc::new(ScriptedPublisher::succeeding("zhihu"));
    let dispatcher = PublishDispatcher::new(
        fx.articles.clone(),
        Arc::new(MockAccountProvider::with_accounts(vec![
            AccountBuilder::new().build()
        ])),
        fx.logs.clone(),
        Arc::new(PublisherRegistry::with_publishers(vec![
            publisher.clone() as Arc<dyn Publisher>
        ])),
        Arc::new(MockBrowserPool::new()),
        fx.notifier.clone(),
        ConcurrencyLimiter::new(1, std::time::Duration::from_secs(1)),
    );

    fx.articles.fail_mark_published(10);
    assert!(dispatcher.dispatch(article_id).await.is_published());
    fx.articles.fail_mark_published(0);

    // 超过自愈阈值后再扫描
    let mut stuck = fx.articles.snapshot(article_id).unwrap();
    assert_eq!(stuck.publish_status, PublishStatus::Publishing);
    stuck.updated_at = Utc::now() - Duration::minutes(30);
    fx.articles.insert(stuck);

    let report = fx.recovery.sweep().await.unwrap();
    assert_eq!(report.completed_publishes, vec![article_id]);

    let outcome = dispatcher.dispatch(article_id).await;
    assert_eq!(
        outcome,
        DispatchOutcome::Skipped(SkipReason::NotDispatchable(PublishStatus::Published))
    );
    assert_eq!(publisher.calls(), 1);
    assert_eq!(
        fx.articles.snapshot(article_id).unwrap().platform_url.as_deref(),
        Some("https://zhihu.example.com/p/1")
    );
}
