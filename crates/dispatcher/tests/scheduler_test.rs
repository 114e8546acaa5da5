#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use geo_core::{
        ExecutionLogStore, ExecutionStatus, GeoError, GeoResult, JobState, NotificationEvent,
        ScheduledTaskConfig, TaskScheduleUpdate, TaskStore,
    };
    use geo_dispatcher::{JobHandler, TaskScheduler};
    use geo_testing_utils::{
        MockExecutionLogStore, MockTaskStore, RecordingNotifier, ScheduledTaskBuilder, TestEnv,
    };

    const WAIT: Duration = Duration::from_secs(3);
    /// 一年只触发一次，测试期间不会自然触发
    const YEARLY: &str = "0 0 1 1 *";

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Panic,
    }

    struct TestJob {
        key: String,
        behavior: Mutex<Behavior>,
        delay: Duration,
        runs: AtomicUsize,
    }

    impl TestJob {
        fn new(key: &str, behavior: Behavior) -> Arc<Self> {
            Self::slow(key, behavior, Duration::ZERO)
        }

        fn slow(key: &str, behavior: Behavior, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                key: key.to_string(),
                behavior: Mutex::new(behavior),
                delay,
                runs: AtomicUsize::new(0),
            })
        }

        fn set_behavior(&self, behavior: Behavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobHandler for TestJob {
        fn task_key(&self) -> &str {
            &self.key
        }

        async fn run(&self) -> GeoResult<String> {
            let behavior = *self.behavior.lock().unwrap();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            match behavior {
                Behavior::Succeed => Ok("done".to_string()),
                Behavior::Fail => Err(GeoError::Automation("页面异常".to_string())),
                Behavior::Panic => panic!("job exploded"),
            }
        }
    }

    struct Fixture {
        tasks: Arc<MockTaskStore>,
        logs: Arc<MockExecutionLogStore>,
        notifier: Arc<RecordingNotifier>,
        scheduler: TaskScheduler,
    }

    fn fixture(tasks: Vec<ScheduledTaskConfig>) -> Fixture {
        let tasks = Arc::new(MockTaskStore::with_tasks(tasks));
        let logs = Arc::new(MockExecutionLogStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let scheduler =
            TaskScheduler::new(tasks.clone(), logs.clone(), notifier.clone(), 3, "test-node");
        Fixture {
            tasks,
            logs,
            notifier,
            scheduler,
        }
    }

    async fn wait_idle(scheduler: &TaskScheduler, key: &str) {
        assert!(TestEnv::wait_for(|| std::future::ready(!scheduler.is_running(key)), WAIT).await);
    }

    #[tokio::test]
    async fn test_start_registers_only_schedulable_tasks() {
        let fx = fixture(vec![
            ScheduledTaskBuilder::new("active").build(),
            ScheduledTaskBuilder::new("paused").inactive().build(),
            ScheduledTaskBuilder::new("quarantined").quarantined("坏了").build(),
            ScheduledTaskBuilder::new("orphan").build(),
        ]);
        for key in ["active", "paused", "quarantined"] {
            fx.scheduler
                .register_handler(TestJob::new(key, Behavior::Succeed))
                .unwrap();
        }

        let scheduled = fx.scheduler.start().await.unwrap();

        assert_eq!(scheduled, 1);
        assert_eq!(fx.scheduler.scheduled_tasks(), vec!["active".to_string()]);
        assert!(fx.scheduler.next_fire_time("active").is_some());
        assert!(fx.scheduler.next_fire_time("paused").is_none());
        assert_eq!(
            fx.scheduler.job_state("quarantined").await.unwrap(),
            JobState::Quarantined
        );
        fx.scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_seed_tasks_only_creates_missing() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("auto_publish")
            .with_cron("*/1 * * * *")
            .build()]);

        let created = fx
            .scheduler
            .seed_tasks(ScheduledTaskConfig::defaults())
            .await
            .unwrap();

        assert_eq!(created, ScheduledTaskConfig::defaults().len() - 1);
        assert_eq!(fx.tasks.count(), ScheduledTaskConfig::defaults().len());
        assert_eq!(
            fx.tasks.snapshot("auto_publish").unwrap().cron_expression,
            "*/1 * * * *"
        );
        assert_eq!(
            fx.scheduler
                .seed_tasks(ScheduledTaskConfig::defaults())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_hot_reload_applies_new_cron_immediately() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("publish")
            .with_cron("*/5 * * * *")
            .build()]);
        fx.scheduler
            .register_handler(TestJob::new("publish", Behavior::Succeed))
            .unwrap();
        fx.scheduler.start().await.unwrap();
        assert_eq!(fx.scheduler.scheduled_cron("publish").as_deref(), Some("*/5 * * * *"));

        let updated = fx
            .scheduler
            .update_task(
                "publish",
                &TaskScheduleUpdate {
                    cron_expression: Some("*/1 * * * *".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.cron_expression, "*/1 * * * *");
        assert_eq!(fx.scheduler.scheduled_cron("publish").as_deref(), Some("*/1 * * * *"));
        let next = fx.scheduler.next_fire_time("publish").unwrap();
        let until = next - Utc::now();
        assert!(until > chrono::Duration::zero());
        assert!(until <= chrono::Duration::seconds(60), "next fire in {until}");
        fx.scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_invalid_cron_update_is_rejected() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("publish").with_cron(YEARLY).build()]);
        fx.scheduler
            .register_handler(TestJob::new("publish", Behavior::Succeed))
            .unwrap();
        fx.scheduler.start().await.unwrap();

        let err = fx
            .scheduler
            .update_task(
                "publish",
                &TaskScheduleUpdate {
                    cron_expression: Some("every five minutes".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GeoError::InvalidCron { .. }));
        assert_eq!(fx.tasks.snapshot("publish").unwrap().cron_expression, YEARLY);
        assert_eq!(fx.scheduler.scheduled_cron("publish").as_deref(), Some(YEARLY));
        fx.scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_reload_only_touches_target_task() {
        let fx = fixture(vec![
            ScheduledTaskBuilder::new("a").with_cron(YEARLY).build(),
            ScheduledTaskBuilder::new("b").with_cron(YEARLY).build(),
        ]);
        for key in ["a", "b"] {
            fx.scheduler
                .register_handler(TestJob::new(key, Behavior::Succeed))
                .unwrap();
        }
        fx.scheduler.start().await.unwrap();
        let b_next = fx.scheduler.next_fire_time("b");

        fx.scheduler.pause("a").await.unwrap();

        assert_eq!(fx.scheduler.scheduled_tasks(), vec!["b".to_string()]);
        assert_eq!(fx.scheduler.next_fire_time("b"), b_next);
        fx.scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_trigger_runs_once_without_moving_next_fire() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("publish").with_cron(YEARLY).build()]);
        let job = TestJob::new("publish", Behavior::Succeed);
        fx.scheduler.register_handler(job.clone()).unwrap();
        fx.scheduler.start().await.unwrap();
        let before = fx.scheduler.next_fire_time("publish");

        assert!(fx.scheduler.trigger_now("publish").await.unwrap());
        assert!(TestEnv::wait_for(|| std::future::ready(job.runs() == 1), WAIT).await);
        wait_idle(&fx.scheduler, "publish").await;

        assert_eq!(fx.scheduler.next_fire_time("publish"), before);
        let entries = fx.logs.list_by_task("publish", 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, ExecutionStatus::Success);
        assert_eq!(entries[0].target_id, None);
        assert_eq!(entries[0].instance_id, "test-node");
        assert_eq!(entries[0].result_summary.as_deref(), Some("done"));
        fx.scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("slow").with_cron(YEARLY).build()]);
        let job = TestJob::slow("slow", Behavior::Succeed, Duration::from_millis(300));
        fx.scheduler.register_handler(job.clone()).unwrap();

        assert!(fx.scheduler.trigger_now("slow").await.unwrap());
        assert!(fx.scheduler.is_running("slow"));
        assert!(!fx.scheduler.trigger_now("slow").await.unwrap());

        wait_idle(&fx.scheduler, "slow").await;
        assert_eq!(job.runs(), 1);
        assert!(fx.scheduler.trigger_now("slow").await.unwrap());
        wait_idle(&fx.scheduler, "slow").await;
        assert_eq!(job.runs(), 2);
    }

    #[tokio::test]
    async fn test_cron_loop_fires_on_schedule() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("tick")
            .with_cron("* * * * * *")
            .build()]);
        let job = TestJob::new("tick", Behavior::Succeed);
        fx.scheduler.register_handler(job.clone()).unwrap();
        fx.scheduler.start().await.unwrap();

        assert!(TestEnv::wait_for(|| std::future::ready(job.runs() >= 2), WAIT).await);
        assert!(fx.scheduler.next_fire_time("tick").unwrap() > Utc::now() - chrono::Duration::seconds(1));
        assert!(fx.scheduler.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_consecutive_failures_quarantine_task() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("flaky").with_cron(YEARLY).build()]);
        let job = TestJob::new("flaky", Behavior::Fail);
        fx.scheduler.register_handler(job.clone()).unwrap();
        fx.scheduler.start().await.unwrap();

        for attempt in 1..=3 {
            assert!(fx.scheduler.trigger_now("flaky").await.unwrap());
            assert!(TestEnv::wait_for(|| std::future::ready(job.runs() == attempt), WAIT).await);
            wait_idle(&fx.scheduler, "flaky").await;
        }

        let task = fx.tasks.snapshot("flaky").unwrap();
        assert!(task.is_quarantined);
        assert_eq!(task.consecutive_failures, 3);
        assert!(task.quarantine_reason.unwrap().contains("页面异常"));
        assert!(!fx.scheduler.is_scheduled("flaky"));
        assert!(fx.notifier.events().iter().any(|event| matches!(
            event,
            NotificationEvent::TaskQuarantined { task_key, .. } if task_key == "flaky"
        )));

        let err = fx.scheduler.trigger_now("flaky").await.unwrap_err();
        assert!(matches!(err, GeoError::TaskQuarantined { .. }));

        let state = fx.scheduler.clear_quarantine("flaky").await.unwrap();
        assert_eq!(state, JobState::Active);
        assert!(fx.scheduler.is_scheduled("flaky"));
        assert_eq!(fx.tasks.snapshot("flaky").unwrap().consecutive_failures, 0);
        fx.scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("flaky").with_cron(YEARLY).build()]);
        let job = TestJob::new("flaky", Behavior::Fail);
        fx.scheduler.register_handler(job.clone()).unwrap();

        for attempt in 1..=2 {
            fx.scheduler.trigger_now("flaky").await.unwrap();
            assert!(TestEnv::wait_for(|| std::future::ready(job.runs() == attempt), WAIT).await);
            wait_idle(&fx.scheduler, "flaky").await;
        }
        assert_eq!(fx.tasks.snapshot("flaky").unwrap().consecutive_failures, 2);

        job.set_behavior(Behavior::Succeed);
        fx.scheduler.trigger_now("flaky").await.unwrap();
        assert!(TestEnv::wait_for(|| std::future::ready(job.runs() == 3), WAIT).await);
        wait_idle(&fx.scheduler, "flaky").await;

        let task = fx.tasks.snapshot("flaky").unwrap();
        assert_eq!(task.consecutive_failures, 0);
        assert!(!task.is_quarantined);
    }

    #[tokio::test]
    async fn test_panicking_job_is_recorded_as_failure() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("boom").with_cron(YEARLY).build()]);
        let job = TestJob::new("boom", Behavior::Panic);
        fx.scheduler.register_handler(job.clone()).unwrap();

        fx.scheduler.trigger_now("boom").await.unwrap();
        assert!(TestEnv::wait_for(|| std::future::ready(job.runs() == 1), WAIT).await);
        wait_idle(&fx.scheduler, "boom").await;

        let entries = fx.logs.list_by_task("boom", 10).await.unwrap();
        assert_eq!(entries[0].status, ExecutionStatus::Failure);
        assert_eq!(entries[0].error_type.as_deref(), Some("Panic"));
        assert_eq!(fx.tasks.snapshot("boom").unwrap().consecutive_failures, 1);
        assert_eq!(fx.scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("publish").with_cron(YEARLY).build()]);
        let job = TestJob::new("publish", Behavior::Succeed);
        fx.scheduler.register_handler(job.clone()).unwrap();
        fx.scheduler.start().await.unwrap();

        let paused = fx.scheduler.pause("publish").await.unwrap();
        assert!(!paused.is_active);
        assert!(!fx.scheduler.is_scheduled("publish"));
        assert_eq!(fx.scheduler.job_state("publish").await.unwrap(), JobState::Paused);

        // 暂停中的任务仍可手动执行
        assert!(fx.scheduler.trigger_now("publish").await.unwrap());
        assert!(TestEnv::wait_for(|| std::future::ready(job.runs() == 1), WAIT).await);
        wait_idle(&fx.scheduler, "publish").await;

        fx.scheduler.resume("publish").await.unwrap();
        assert!(fx.scheduler.is_scheduled("publish"));
        let snapshot = fx.scheduler.job("publish").await.unwrap();
        assert_eq!(snapshot.state, JobState::Active);
        assert!(snapshot.next_fire_time.is_some());
        assert!(snapshot.last_started_at.is_some());
        fx.scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_trigger_errors() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("orphan").build()]);

        let err = fx.scheduler.trigger_now("missing").await.unwrap_err();
        assert!(matches!(err, GeoError::TaskNotFound { .. }));

        let err = fx.scheduler.trigger_now("orphan").await.unwrap_err();
        assert!(matches!(err, GeoError::HandlerNotRegistered { .. }));
    }

    #[tokio::test]
    async fn test_jobs_snapshot_reports_registered_state() {
        let fx = fixture(vec![
            ScheduledTaskBuilder::new("a").with_cron(YEARLY).build(),
            ScheduledTaskBuilder::new("b").with_cron(YEARLY).build(),
        ]);
        fx.scheduler
            .register_handler(TestJob::new("a", Behavior::Succeed))
            .unwrap();
        fx.scheduler.start().await.unwrap();

        let jobs = fx.scheduler.jobs().await.unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].config.task_key, "a");
        assert_eq!(jobs[0].state, JobState::Active);
        assert!(jobs[0].scheduled);
        assert_eq!(jobs[1].state, JobState::Registered);
        assert!(!jobs[1].scheduled);
        fx.scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_runs() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("slow").with_cron(YEARLY).build()]);
        let job = TestJob::slow("slow", Behavior::Succeed, Duration::from_millis(200));
        fx.scheduler.register_handler(job.clone()).unwrap();
        fx.scheduler.start().await.unwrap();
        fx.scheduler.trigger_now("slow").await.unwrap();

        assert!(fx.scheduler.shutdown(Duration::from_secs(2)).await);

        assert_eq!(job.runs(), 1);
        assert!(fx.scheduler.scheduled_tasks().is_empty());
        assert!(matches!(
            fx.scheduler.trigger_now("slow").await,
            Err(GeoError::Internal(_))
        ));
        assert_eq!(fx.logs.running_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_gives_up_after_grace_period() {
        let fx = fixture(vec![ScheduledTaskBuilder::new("stuck").with_cron(YEARLY).build()]);
        let job = TestJob::slow("stuck", Behavior::Succeed, Duration::from_secs(5));
        fx.scheduler.register_handler(job).unwrap();
        fx.scheduler.trigger_now("stuck").await.unwrap();

        assert!(!fx.scheduler.shutdown(Duration::from_millis(50)).await);
        assert_eq!(fx.scheduler.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_task_fails() {
        let fx = fixture(vec![]);
        let err = fx
            .scheduler
            .update_task(
                "missing",
                &TaskScheduleUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GeoError::TaskNotFound { .. }));
        assert!(fx.tasks.list().await.unwrap().is_empty());
    }
}
