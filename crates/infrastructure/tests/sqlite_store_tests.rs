use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use geo_core::{
    AccountProvider, AccountStatus, ArticleStore, ExecutionFinish, ExecutionLogStore,
    ExecutionStatus, GeoError, IndexCheckStore, IndexStatus, NewExecutionLog, PublishFailure,
    PublishStatus, PublishableArticle, ScheduledTaskConfig, TaskScheduleUpdate, TaskStore,
    CONTENT_PLACEHOLDER, TASK_AUTO_PUBLISH, TASK_INDEX_CHECK,
};
use geo_infrastructure::DatabaseManager;
use geo_testing_utils::{AccountBuilder, ArticleBuilder, IndexTargetBuilder, ScheduledTaskBuilder};

async fn database() -> Result<DatabaseManager> {
    let db = DatabaseManager::in_memory().await?;
    db.migrate().await?;
    Ok(db)
}

fn platforms(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[tokio::test]
async fn test_task_seeding_is_idempotent() -> Result<()> {
    let db = database().await?;
    let store = db.task_store();

    for task in ScheduledTaskConfig::defaults() {
        assert!(store.create_if_absent(&task).await?);
    }
    for task in ScheduledTaskConfig::defaults() {
        assert!(!store.create_if_absent(&task).await?);
    }

    let tasks = store.list().await?;
    assert_eq!(tasks.len(), ScheduledTaskConfig::defaults().len());
    let publish = store.get(TASK_AUTO_PUBLISH).await?.unwrap();
    assert_eq!(publish.cron_expression, "*/5 * * * *");
    assert!(publish.is_active);
    assert!(!publish.is_quarantined);
    Ok(())
}

#[tokio::test]
async fn test_task_update_only_touches_given_fields() -> Result<()> {
    let db = database().await?;
    let store = db.task_store();
    store
        .create_if_absent(&ScheduledTaskBuilder::new(TASK_AUTO_PUBLISH).build())
        .await?;

    let updated = store
        .update_schedule(
            TASK_AUTO_PUBLISH,
            &TaskScheduleUpdate {
                cron_expression: Some("*/1 * * * *".to_string()),
                ..TaskScheduleUpdate::default()
            },
        )
        .await?;
    assert_eq!(updated.cron_expression, "*/1 * * * *");
    assert!(updated.is_active);

    let paused = store
        .update_schedule(
            TASK_AUTO_PUBLISH,
            &TaskScheduleUpdate {
                is_active: Some(false),
                ..TaskScheduleUpdate::default()
            },
        )
        .await?;
    assert!(!paused.is_active);
    assert_eq!(paused.cron_expression, "*/1 * * * *");

    let missing = store
        .update_schedule("unknown", &TaskScheduleUpdate::default())
        .await;
    assert!(matches!(missing, Err(GeoError::TaskNotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn test_task_failure_counting_and_quarantine() -> Result<()> {
    let db = database().await?;
    let store = db.task_store();
    store
        .create_if_absent(&ScheduledTaskBuilder::new(TASK_INDEX_CHECK).build())
        .await?;

    assert_eq!(store.record_failure(TASK_INDEX_CHECK).await?, 1);
    assert_eq!(store.record_failure(TASK_INDEX_CHECK).await?, 2);
    store.record_success(TASK_INDEX_CHECK).await?;
    assert_eq!(store.record_failure(TASK_INDEX_CHECK).await?, 1);

    store
        .quarantine(TASK_INDEX_CHECK, "连续失败 3 次", Utc::now())
        .await?;
    let quarantined = store.get(TASK_INDEX_CHECK).await?.unwrap();
    assert!(quarantined.is_quarantined);
    assert_eq!(quarantined.quarantine_reason.as_deref(), Some("连续失败 3 次"));
    assert!(quarantined.quarantine_at.is_some());

    store.clear_quarantine(TASK_INDEX_CHECK).await?;
    let cleared = store.get(TASK_INDEX_CHECK).await?.unwrap();
    assert!(!cleared.is_quarantined);
    assert!(cleared.quarantine_reason.is_none());
    assert_eq!(cleared.consecutive_failures, 0);

    assert!(matches!(
        store.record_failure("unknown").await,
        Err(GeoError::TaskNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_eligibility_scan_matches_article_rules() -> Result<()> {
    let db = database().await?;
    let store = db.article_store();
    let now = Utc::now();

    let fresh = store.insert(&ArticleBuilder::new().build()).await?;
    let due_failed = store.insert(&ArticleBuilder::new().failed_due(1).build()).await?;
    let due_scheduled = store
        .insert(
            &ArticleBuilder::new()
                .with_next_retry_at(Some(now - Duration::minutes(1)))
                .build(),
        )
        .await?;
    let waiting = store
        .insert(
            &ArticleBuilder::new()
                .with_next_retry_at(Some(now + Duration::minutes(30)))
                .build(),
        )
        .await?;
    let quarantined = store
        .insert(
            &ArticleBuilder::new()
                .with_status(PublishStatus::Failed)
                .with_retry_count(3)
                .with_next_retry_at(None)
                .build(),
        )
        .await?;
    let placeholder = store
        .insert(&ArticleBuilder::new().with_content(CONTENT_PLACEHOLDER).build())
        .await?;
    let blank = store
        .insert(&ArticleBuilder::new().with_content("  \n ").build())
        .await?;
    let publishing = store
        .insert(&ArticleBuilder::new().with_status(PublishStatus::Publishing).build())
        .await?;
    let published = store
        .insert(&ArticleBuilder::new().with_status(PublishStatus::Published).build())
        .await?;
    let generating = store
        .insert(&ArticleBuilder::new().with_status(PublishStatus::Generating).build())
        .await?;

    let eligible: Vec<i64> = store
        .list_eligible(now, &platforms(&["zhihu"]), 50)
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect();

    for id in [fresh, due_failed, due_scheduled] {
        assert!(eligible.contains(&id), "文章 {id} 应当可派发");
    }
    for id in [waiting, quarantined, placeholder, blank, publishing, published, generating] {
        assert!(!eligible.contains(&id), "文章 {id} 不应被选中");
    }
    Ok(())
}

#[tokio::test]
async fn test_eligibility_scan_orders_by_creation_and_limits() -> Result<()> {
    let db = database().await?;
    let store = db.article_store();

    let newest = store.insert(&ArticleBuilder::new().build()).await?;
    let oldest = store
        .insert(&ArticleBuilder::new().created_ago(Duration::hours(3)).build())
        .await?;
    let middle = store
        .insert(&ArticleBuilder::new().created_ago(Duration::hours(1)).build())
        .await?;

    let first_two: Vec<i64> = store
        .list_eligible(Utc::now(), &platforms(&["zhihu"]), 2)
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(first_two, vec![oldest, middle]);

    let all = store
        .list_eligible(Utc::now(), &platforms(&["zhihu"]), 10)
        .await?;
    assert_eq!(all.last().map(|a| a.id), Some(newest));
    Ok(())
}

#[tokio::test]
async fn test_eligibility_scan_filters_platforms_and_rotates_skipped() -> Result<()> {
    let db = database().await?;
    let store = db.article_store();

    let unconfigured = store
        .insert(
            &ArticleBuilder::new()
                .with_platform("unconfigured")
                .created_ago(Duration::hours(5))
                .build(),
        )
        .await?;
    let skipped = store
        .insert(&ArticleBuilder::new().created_ago(Duration::hours(4)).build())
        .await?;
    let waiting = store
        .insert(&ArticleBuilder::new().created_ago(Duration::hours(3)).build())
        .await?;
    let newest = store.insert(&ArticleBuilder::new().build()).await?;

    let ids = |articles: Vec<PublishableArticle>| -> Vec<i64> {
        articles.into_iter().map(|a| a.id).collect()
    };

    let first = ids(store.list_eligible(Utc::now(), &platforms(&["zhihu"]), 2).await?);
    assert_eq!(first, vec![skipped, waiting]);
    assert!(store
        .list_eligible(Utc::now(), &[], 10)
        .await?
        .is_empty());

    store.record_attempt(skipped, Utc::now()).await?;
    let article = store.get(skipped).await?.unwrap();
    assert_eq!(article.publish_status, PublishStatus::Scheduled);
    assert!(article.last_attempt_at.is_some());

    let second = ids(store.list_eligible(Utc::now(), &platforms(&["zhihu"]), 2).await?);
    assert_eq!(second, vec![waiting, newest]);

    let all = ids(
        store
            .list_eligible(Utc::now(), &platforms(&["zhihu", "unconfigured"]), 10)
            .await?,
    );
    assert_eq!(all, vec![unconfigured, waiting, newest, skipped]);
    Ok(())
}

#[tokio::test]
async fn test_claim_is_compare_and_set() -> Result<()> {
    let db = database().await?;
    let store = db.article_store();
    let id = store.insert(&ArticleBuilder::new().build()).await?;
    let now = Utc::now();

    assert!(!store.try_claim(id, PublishStatus::Scheduled, 1, now).await?);
    assert!(store.try_claim(id, PublishStatus::Scheduled, 0, now).await?);
    assert!(!store.try_claim(id, PublishStatus::Scheduled, 0, now).await?);
    assert!(!store.try_claim(id + 100, PublishStatus::Scheduled, 0, now).await?);

    let claimed = store.get(id).await?.unwrap();
    assert_eq!(claimed.publish_status, PublishStatus::Publishing);
    assert!(claimed.last_attempt_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_claims_have_single_winner() -> Result<()> {
    let db = database().await?;
    let store = Arc::new(db.article_store());
    let id = store.insert(&ArticleBuilder::new().build()).await?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .try_claim(id, PublishStatus::Scheduled, 0, Utc::now())
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await?? {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}

#[tokio::test]
async fn test_publish_result_write_back() -> Result<()> {
    let db = database().await?;
    let store = db.article_store();
    let published_id = store.insert(&ArticleBuilder::new().build()).await?;
    let failed_id = store.insert(&ArticleBuilder::new().build()).await?;
    let now = Utc::now();

    store
        .mark_published(published_id, Some("https://zhuanlan.zhihu.com/p/1"), now)
        .await?;
    let published = store.get(published_id).await?.unwrap();
    assert_eq!(published.publish_status, PublishStatus::Published);
    assert_eq!(
        published.platform_url.as_deref(),
        Some("https://zhuanlan.zhihu.com/p/1")
    );
    assert!(published.published_at.is_some());

    let retry_at = now + Duration::minutes(5);
    store
        .mark_failed(
            failed_id,
            &PublishFailure {
                retry_count: 1,
                next_retry_at: Some(retry_at),
                error_msg: "登录失效".to_string(),
            },
        )
        .await?;
    let failed = store.get(failed_id).await?.unwrap();
    assert_eq!(failed.publish_status, PublishStatus::Failed);
    assert_eq!(failed.retry_count, 1);
    assert_eq!(failed.next_retry_at.map(|t| t.timestamp()), Some(retry_at.timestamp()));
    assert_eq!(failed.error_msg.as_deref(), Some("登录失效"));

    assert!(matches!(
        store.mark_published(9_999, None, now).await,
        Err(GeoError::ArticleNotFound { id: 9_999 })
    ));
    Ok(())
}

#[tokio::test]
async fn test_stuck_publishing_articles_are_listed() -> Result<()> {
    let db = database().await?;
    let store = db.article_store();
    let stuck = store
        .insert(
            &ArticleBuilder::new()
                .with_status(PublishStatus::Publishing)
                .updated_ago(Duration::hours(1))
                .build(),
        )
        .await?;
    store
        .insert(&ArticleBuilder::new().with_status(PublishStatus::Publishing).build())
        .await?;
    store
        .insert(
            &ArticleBuilder::new()
                .updated_ago(Duration::hours(2))
                .build(),
        )
        .await?;

    let listed = store
        .list_stuck_publishing(Utc::now() - Duration::minutes(15))
        .await?;
    assert_eq!(listed.iter().map(|a| a.id).collect::<Vec<_>>(), vec![stuck]);
    Ok(())
}

#[tokio::test]
async fn test_execution_entry_finishes_exactly_once() -> Result<()> {
    let db = database().await?;
    let store = db.execution_log_store();

    let entry = store
        .start(&NewExecutionLog::new(TASK_AUTO_PUBLISH, Some(7), "node-a").with_retry_count(2))
        .await?;
    assert_eq!(entry.status, ExecutionStatus::Running);
    assert_eq!(entry.retry_count, 2);
    assert_eq!(store.count_running().await?, 1);

    let mut success = ExecutionFinish::success("发布成功");
    success.finished_at = entry.started_at + Duration::milliseconds(1_500);
    assert!(store.finish(entry.id, &success).await?);
    assert!(
        !store
            .finish(entry.id, &ExecutionFinish::failure("Abandoned", "失联"))
            .await?
    );

    let finished = store.get(entry.id).await?.unwrap();
    assert_eq!(finished.status, ExecutionStatus::Success);
    assert_eq!(finished.duration_ms, Some(1_500));
    assert_eq!(finished.result_summary.as_deref(), Some("发布成功"));
    assert!(finished.error_type.is_none());
    assert_eq!(store.count_running().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_stale_detection_uses_latest_liveness_signal() -> Result<()> {
    let db = database().await?;
    let store = db.execution_log_store();
    let long_ago = Utc::now() - Duration::hours(1);

    let mut silent = NewExecutionLog::new(TASK_AUTO_PUBLISH, Some(1), "node-a");
    silent.started_at = long_ago;
    let silent = store.start(&silent).await?;

    let mut beating = NewExecutionLog::new(TASK_AUTO_PUBLISH, Some(2), "node-a");
    beating.started_at = long_ago;
    let beating = store.start(&beating).await?;
    store.heartbeat(beating.id, Utc::now()).await?;

    store
        .start(&NewExecutionLog::new(TASK_INDEX_CHECK, None, "node-b"))
        .await?;

    let stale = store
        .list_stale_running(Utc::now() - Duration::minutes(15))
        .await?;
    assert_eq!(stale.iter().map(|e| e.id).collect::<Vec<_>>(), vec![silent.id]);
    Ok(())
}

#[tokio::test]
async fn test_execution_history_queries() -> Result<()> {
    let db = database().await?;
    let store = db.execution_log_store();

    for minutes_ago in [30, 20, 10] {
        let mut entry = NewExecutionLog::new(TASK_AUTO_PUBLISH, Some(5), "node-a");
        entry.started_at = Utc::now() - Duration::minutes(minutes_ago);
        store.start(&entry).await?;
    }
    store
        .start(&NewExecutionLog::new(TASK_AUTO_PUBLISH, Some(6), "node-a"))
        .await?;
    store
        .start(&NewExecutionLog::new(TASK_INDEX_CHECK, Some(5), "node-a"))
        .await?;

    let for_article = store.list_by_target(TASK_AUTO_PUBLISH, 5, 10).await?;
    assert_eq!(for_article.len(), 3);
    assert!(for_article
        .windows(2)
        .all(|pair| pair[0].started_at >= pair[1].started_at));

    let latest_two = store.list_by_task(TASK_AUTO_PUBLISH, 2).await?;
    assert_eq!(latest_two.len(), 2);
    assert_eq!(latest_two[0].target_id, Some(6));
    Ok(())
}

#[tokio::test]
async fn test_cleanup_keeps_running_and_recent_entries() -> Result<()> {
    let db = database().await?;
    let store = db.execution_log_store();

    let mut old = NewExecutionLog::new(TASK_AUTO_PUBLISH, Some(1), "node-a");
    old.started_at = Utc::now() - Duration::days(45);
    let old = store.start(&old).await?;
    let mut finish = ExecutionFinish::success("ok");
    finish.finished_at = old.started_at + Duration::seconds(10);
    store.finish(old.id, &finish).await?;

    let mut old_running = NewExecutionLog::new(TASK_AUTO_PUBLISH, Some(2), "node-a");
    old_running.started_at = Utc::now() - Duration::days(45);
    store.start(&old_running).await?;

    let recent = store
        .start(&NewExecutionLog::new(TASK_AUTO_PUBLISH, Some(3), "node-a"))
        .await?;
    store.finish(recent.id, &ExecutionFinish::success("ok")).await?;

    let removed = store.cleanup_before(Utc::now() - Duration::days(30)).await?;
    assert_eq!(removed, 1);
    assert!(store.get(old.id).await?.is_none());
    assert!(store.get(recent.id).await?.is_some());
    assert_eq!(store.count_running().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_accounts_rotate_least_recently_used() -> Result<()> {
    let db = database().await?;
    let provider = db.account_provider();

    let used = provider
        .insert(
            &AccountBuilder::new()
                .with_last_used_at(Utc::now() - Duration::minutes(5))
                .build(),
        )
        .await?;
    let never_used = provider.insert(&AccountBuilder::new().build()).await?;
    provider
        .insert(
            &AccountBuilder::new()
                .with_status(AccountStatus::Disabled)
                .build(),
        )
        .await?;
    provider
        .insert(&AccountBuilder::new().with_platform("toutiao").build())
        .await?;

    let picked = provider.active_account("zhihu").await?.unwrap();
    assert_eq!(picked.id, never_used);

    provider.touch(never_used, Utc::now()).await?;
    let picked = provider.active_account("zhihu").await?.unwrap();
    assert_eq!(picked.id, used);

    provider.mark_invalid(used, "会话数据无法解析").await?;
    provider.mark_invalid(never_used, "会话数据无法解析").await?;
    assert!(provider.active_account("zhihu").await?.is_none());

    let invalid = provider.get(used).await?.unwrap();
    assert_eq!(invalid.status, AccountStatus::Invalid);
    assert_eq!(invalid.invalid_reason.as_deref(), Some("会话数据无法解析"));
    Ok(())
}

#[tokio::test]
async fn test_index_targets_due_and_result_recording() -> Result<()> {
    let db = database().await?;
    let store = db.index_check_store();

    let recent = store
        .insert(&IndexTargetBuilder::new().checked_ago(Duration::hours(1)).build())
        .await?;
    let stale = store
        .insert(&IndexTargetBuilder::new().checked_ago(Duration::hours(30)).build())
        .await?;
    let never = store.insert(&IndexTargetBuilder::new().build()).await?;

    let due: Vec<i64> = store
        .list_due(Utc::now() - Duration::hours(24), &platforms(&["deepseek"]), 10)
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(due, vec![never, stale]);
    assert!(!due.contains(&recent));

    store
        .record_result(never, IndexStatus::Indexed, Some("GEO优化相关回答"), Utc::now())
        .await?;
    let checked = store.get(never).await?.unwrap();
    assert_eq!(checked.index_status, IndexStatus::Indexed);
    assert_eq!(checked.last_answer_excerpt.as_deref(), Some("GEO优化相关回答"));
    assert!(checked.last_check_time.is_some());

    assert!(matches!(
        store
            .record_result(9_999, IndexStatus::NotIndexed, None, Utc::now())
            .await,
        Err(GeoError::IndexTargetNotFound { id: 9_999 })
    ));
    Ok(())
}

#[tokio::test]
async fn test_due_targets_filter_platforms_and_rotate_attempts() -> Result<()> {
    let db = database().await?;
    let store = db.index_check_store();
    let before = Utc::now() - Duration::hours(24);

    store
        .insert(&IndexTargetBuilder::new().with_platform("unconfigured").build())
        .await?;
    let failing = store.insert(&IndexTargetBuilder::new().build()).await?;
    let stale = store
        .insert(&IndexTargetBuilder::new().checked_ago(Duration::hours(30)).build())
        .await?;

    let due: Vec<i64> = store
        .list_due(before, &platforms(&["deepseek"]), 1)
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(due, vec![failing]);

    store.record_attempt(failing, Utc::now()).await?;
    let target = store.get(failing).await?.unwrap();
    assert_eq!(target.index_status, IndexStatus::Unchecked);
    assert!(target.last_check_time.is_none());
    assert!(target.last_attempt_at.is_some());

    let due: Vec<i64> = store
        .list_due(before, &platforms(&["deepseek"]), 2)
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(due, vec![stale, failing]);
    Ok(())
}

#[tokio::test]
async fn test_migration_adds_attempt_column_to_existing_tables() -> Result<()> {
    let db = DatabaseManager::in_memory().await?;
    sqlx::query(
        "CREATE TABLE articles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            platform TEXT NOT NULL,
            publish_status TEXT NOT NULL DEFAULT 'generating',
            retry_count INTEGER NOT NULL DEFAULT 0,
            next_retry_at TEXT,
            error_msg TEXT,
            platform_url TEXT,
            published_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(db.pool())
    .await?;

    db.migrate().await?;
    db.migrate().await?;

    for table in ["articles", "index_check_targets"] {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = 'last_attempt_at'",
        )
        .bind(table)
        .fetch_one(db.pool())
        .await?;
        assert_eq!(count, 1, "{table}");
    }

    let store = db.article_store();
    let id = store.insert(&ArticleBuilder::new().build()).await?;
    store.record_attempt(id, Utc::now()).await?;
    assert!(store.get(id).await?.unwrap().last_attempt_at.is_some());
    Ok(())
}
