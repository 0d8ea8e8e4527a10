//! Scheduler - 制御面（start / stop / manual trigger / schedule update / status）
//!
//! # 状態遷移
//! - Stopped -> Running: `start()`
//! - Running -> Stopped: `stop()`
//!
//! Running の間は、有効な schedule ごとに timer が 1 本、dispatch loop が 1 本動きます。
//! `stop()` は timer と dispatch loop を止めますが、実行中のタスクは中断しません。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::status::SchedulerStatus;
use super::{dispatcher, timer};
use crate::domain::{
    Priority, ScheduleConfig, SchedulePatch, SchedulerError, Source, TaskId, TaskSpec,
};
use crate::ports::{Clock, CrawlExecutor, ExecutionLog, Notifier, SubscriberDirectory};
use crate::queue::TaskQueue;

/// Dispatch-side knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
    /// Fallback cadence of the dispatch loop when no queue change arrives.
    pub poll_interval: Duration,

    /// Per-attempt limit on the crawl call. `None` waits indefinitely.
    pub execution_timeout: Option<Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            execution_timeout: None,
        }
    }
}

/// Collaborators shared by the dispatch loop and every running task.
pub(crate) struct Shared {
    pub(crate) queue: Arc<dyn TaskQueue>,
    pub(crate) executor: Arc<dyn CrawlExecutor>,
    pub(crate) log: Arc<dyn ExecutionLog>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) directory: Arc<dyn SubscriberDirectory>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) options: SchedulerOptions,
}

/// Handles that exist only while running.
struct RunHandles {
    shutdown_tx: watch::Sender<bool>,
    dispatcher: Option<JoinHandle<()>>,
    timers: HashMap<Source, JoinHandle<()>>,
}

impl Drop for RunHandles {
    fn drop(&mut self) {
        for timer in self.timers.values() {
            timer.abort();
        }
        let _ = self.shutdown_tx.send(true);
    }
}

struct Control {
    schedules: BTreeMap<Source, ScheduleConfig>,
    run: Option<RunHandles>,
}

/// Scheduler handle.
///
/// Cheap to clone; every clone drives the same scheduler. Built by
/// `SchedulerBuilder`.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
    control: Arc<Mutex<Control>>,
}

impl Scheduler {
    pub(crate) fn new(shared: Shared, schedules: Vec<ScheduleConfig>) -> Self {
        let schedules = schedules.into_iter().map(|s| (s.source, s)).collect();
        Self {
            shared: Arc::new(shared),
            control: Arc::new(Mutex::new(Control {
                schedules,
                run: None,
            })),
        }
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.shared.queue
    }

    pub async fn is_running(&self) -> bool {
        self.control.lock().await.run.is_some()
    }

    /// Start timers and the dispatch loop. No-op when already running.
    pub async fn start(&self) {
        let mut control = self.control.lock().await;
        if control.run.is_some() {
            debug!("scheduler already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(dispatcher::run(Arc::clone(&self.shared), shutdown_rx));

        let timers: HashMap<Source, JoinHandle<()>> = control
            .schedules
            .values()
            .filter(|config| config.enabled)
            .map(|config| {
                (
                    config.source,
                    timer::spawn(Arc::clone(&self.shared.queue), config.clone()),
                )
            })
            .collect();

        info!(timers = timers.len(), "scheduler started");
        control.run = Some(RunHandles {
            shutdown_tx,
            dispatcher: Some(dispatcher),
            timers,
        });
    }

    /// Cancel timers and stop the dispatch loop, then wait for the loop to
    /// exit. Tasks already running are not interrupted.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        let Some(mut run) = control.run.take() else {
            debug!("scheduler already stopped");
            return;
        };

        let dispatcher = run.dispatcher.take();
        drop(run); // timers abort + shutdown signal

        if let Some(dispatcher) = dispatcher {
            let _ = dispatcher.await;
        }
        info!("scheduler stopped");
    }

    /// Queue a high-priority crawl right away, independent of any timer.
    ///
    /// Works while stopped too; the task is dispatched after `start()`.
    pub async fn trigger_manual_crawl(
        &self,
        source: Source,
        category: Option<String>,
        keywords: Option<Vec<String>>,
    ) -> Result<TaskId, SchedulerError> {
        if category.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(SchedulerError::InvalidRequest(
                "category must not be blank".to_string(),
            ));
        }
        if keywords
            .as_deref()
            .is_some_and(|ks| ks.iter().any(|k| k.trim().is_empty()))
        {
            return Err(SchedulerError::InvalidRequest(
                "keywords must not be blank".to_string(),
            ));
        }

        let spec = TaskSpec {
            source,
            category,
            keywords,
            priority: Priority::High,
            max_retries: None,
        };
        let task_id = self.shared.queue.add_task(spec).await;
        info!(task_id = %task_id, source = %source, "manual crawl queued");
        Ok(task_id)
    }

    /// Replace the schedule of `source` with `patch` applied.
    ///
    /// The old timer is cancelled; while running, a new one is started if
    /// the result is enabled. Tasks already queued are left as they are.
    pub async fn update_schedule(
        &self,
        source: Source,
        patch: SchedulePatch,
    ) -> Result<ScheduleConfig, SchedulerError> {
        let mut control = self.control.lock().await;
        let current = control
            .schedules
            .get(&source)
            .cloned()
            .unwrap_or_else(|| ScheduleConfig::default_for(source));
        let next = current.merged(&patch)?;
        control.schedules.insert(source, next.clone());

        if let Some(run) = control.run.as_mut() {
            if let Some(old) = run.timers.remove(&source) {
                old.abort();
            }
            if next.enabled {
                run.timers.insert(
                    source,
                    timer::spawn(Arc::clone(&self.shared.queue), next.clone()),
                );
            }
        }

        info!(
            source = %source,
            interval_minutes = next.interval_minutes,
            categories = next.categories.len(),
            enabled = next.enabled,
            "schedule updated"
        );
        Ok(next)
    }

    pub async fn schedule(&self, source: Source) -> Option<ScheduleConfig> {
        self.control.lock().await.schedules.get(&source).cloned()
    }

    pub async fn status(&self) -> SchedulerStatus {
        let (running, schedules) = {
            let control = self.control.lock().await;
            (
                control.run.is_some(),
                control.schedules.values().cloned().collect(),
            )
        };
        SchedulerStatus {
            running,
            schedules,
            queue: self.shared.queue.status().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::app::SchedulerBuilder;
    use crate::config::Settings;
    use crate::domain::{ExecutionStatus, ScheduleError};
    use crate::impls::{InMemoryExecutionLog, StaticSubscriberDirectory};
    use crate::ports::{FixedClock, UserId};
    use crate::queue::{InMemoryTaskQueue, QueueSettings, RetryPolicy, TaskStatus};
    use crate::testing::{
        FailingDirectory, FailingExecutionLog, FailingNotifier, PanickingExecutionLog,
        PanickingNotifier, RecordingNotifier, ScriptedExecutor, Step, eventually,
    };

    struct Harness {
        scheduler: Scheduler,
        queue: Arc<InMemoryTaskQueue>,
        executor: Arc<ScriptedExecutor>,
        log: Arc<InMemoryExecutionLog>,
        notifier: Arc<RecordingNotifier>,
    }

    fn settings_without_schedules() -> Settings {
        let mut settings = Settings::default();
        for schedule in &mut settings.schedules {
            schedule.enabled = false;
        }
        settings
    }

    fn harness(max_concurrent: usize, executor: ScriptedExecutor) -> Harness {
        harness_with(max_concurrent, executor, settings_without_schedules())
    }

    fn harness_with(max_concurrent: usize, executor: ScriptedExecutor, settings: Settings) -> Harness {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let queue = Arc::new(InMemoryTaskQueue::with_clock(
            QueueSettings {
                max_concurrent,
                default_max_retries: 3,
                retry_policy: RetryPolicy::immediate(),
            },
            clock.clone(),
        ));
        let executor = Arc::new(executor);
        let log = Arc::new(InMemoryExecutionLog::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let directory = StaticSubscriberDirectory::new()
            .watch("electronics", UserId::new("alice"))
            .watch("electronics", UserId::new("bob"));

        let scheduler = SchedulerBuilder::new()
            .settings(settings)
            .executor(executor.clone())
            .queue(queue.clone())
            .execution_log(log.clone())
            .notifier(notifier.clone())
            .subscribers(Arc::new(directory))
            .clock(clock)
            .build()
            .unwrap();

        Harness {
            scheduler,
            queue,
            executor,
            log,
            notifier,
        }
    }

    #[tokio::test]
    async fn manual_trigger_queues_high_priority_task_while_stopped() {
        let h = harness(2, ScriptedExecutor::new());

        let id = h
            .scheduler
            .trigger_manual_crawl(
                Source::Amazon,
                Some("electronics".into()),
                Some(vec!["usb-c hub".into()]),
            )
            .await
            .unwrap();

        let task = h.queue.get_task(id).await.unwrap();
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.keywords(), ["usb-c hub".to_string()]);
        assert!(!h.scheduler.is_running().await);
        assert!(h.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn manual_trigger_rejects_blank_input() {
        let h = harness(2, ScriptedExecutor::new());

        let err = h
            .scheduler
            .trigger_manual_crawl(Source::Ebay, Some("   ".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRequest(_)));

        let err = h
            .scheduler
            .trigger_manual_crawl(Source::Ebay, None, Some(vec!["ok".into(), "".into()]))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRequest(_)));

        assert_eq!(h.queue.status().await.total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_crawl_is_logged_completed_and_notified() {
        let h = harness(2, ScriptedExecutor::new().then(Step::Collect(12)));
        h.scheduler.start().await;

        let id = h
            .scheduler
            .trigger_manual_crawl(Source::Amazon, Some("electronics".into()), None)
            .await
            .unwrap();

        eventually(|| async { h.notifier.sent().len() == 1 }).await;

        let entries = h.log.entries_for(id).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, ExecutionStatus::Completed);
        assert_eq!(entries[0].items_collected, Some(12));
        assert!(entries[0].duration_ms.is_some());
        assert!(h.queue.get_task(id).await.is_none());

        let sent = &h.notifier.sent()[0];
        assert_eq!(sent.users, vec![UserId::new("alice"), UserId::new("bob")]);
        assert_eq!(sent.payload["items_collected"], 12);
        assert_eq!(sent.payload["source"], "amazon");
        assert_eq!(sent.payload["task_id"], id.to_string());
        assert!(sent.message.contains("12 new items"));

        let calls = h.executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].source, Source::Amazon);
        assert_eq!(calls[0].category.as_deref(), Some("electronics"));
        assert!(calls[0].keywords.is_empty());

        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_notification_without_watchers() {
        let h = harness(2, ScriptedExecutor::new());
        h.scheduler.start().await;

        let id = h
            .scheduler
            .trigger_manual_crawl(Source::Etsy, Some("vintage".into()), None)
            .await
            .unwrap();
        eventually(|| async { h.queue.get_task(id).await.is_none() }).await;

        assert!(h.notifier.sent().is_empty());
        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_end_in_terminal_failure() {
        let h = harness(
            1,
            ScriptedExecutor::new()
                .then(Step::Fail("503 Service Unavailable"))
                .then(Step::Fail("503 Service Unavailable"))
                .then(Step::Fail("503 Service Unavailable")),
        );
        h.scheduler.start().await;

        let id = h
            .scheduler
            .trigger_manual_crawl(Source::Walmart, Some("grocery".into()), None)
            .await
            .unwrap();

        eventually(|| async {
            h.log
                .entries_for(id)
                .await
                .iter()
                .filter(|e| e.status == ExecutionStatus::Failed)
                .count()
                == 3
        })
        .await;
        eventually(|| async { h.queue.get_task(id).await.is_none() }).await;

        assert_eq!(h.executor.calls().len(), 3);
        let entries = h.log.entries_for(id).await;
        assert!(entries
            .iter()
            .all(|e| e.error_message.as_deref() == Some("503 Service Unavailable")));
        assert!(h.notifier.sent().is_empty());
        h.queue.assert_invariants().await;

        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn executor_panic_becomes_a_retryable_failure() {
        let h = harness(1, ScriptedExecutor::new().then(Step::Panic));
        h.scheduler.start().await;

        let id = h
            .scheduler
            .trigger_manual_crawl(Source::Ebay, None, None)
            .await
            .unwrap();
        eventually(|| async { h.log.entries_for(id).await.len() == 2 }).await;
        eventually(|| async { h.queue.get_task(id).await.is_none() }).await;

        let entries = h.log.entries_for(id).await;
        assert_eq!(entries[0].status, ExecutionStatus::Failed);
        assert!(entries[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("panicked"));
        assert_eq!(entries[1].status, ExecutionStatus::Completed);

        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hung_crawl_times_out() {
        let mut settings = settings_without_schedules();
        settings.dispatch.execution_timeout_secs = Some(5);
        let h = harness_with(1, ScriptedExecutor::new().then(Step::Hang), settings);
        h.scheduler.start().await;

        let id = h
            .scheduler
            .trigger_manual_crawl(Source::Amazon, None, None)
            .await
            .unwrap();
        eventually(|| async { h.log.entries_for(id).await.len() == 2 }).await;
        eventually(|| async { h.queue.get_task(id).await.is_none() }).await;

        let entries = h.log.entries_for(id).await;
        assert_eq!(entries[0].status, ExecutionStatus::Failed);
        assert!(entries[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("timed out"));
        assert_eq!(entries[1].status, ExecutionStatus::Completed);

        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn broken_sinks_do_not_affect_task_state() {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let queue = Arc::new(InMemoryTaskQueue::with_clock(QueueSettings::default(), clock.clone()));
        let executor = Arc::new(ScriptedExecutor::new());
        let scheduler = SchedulerBuilder::new()
            .settings(settings_without_schedules())
            .executor(executor.clone())
            .queue(queue.clone())
            .execution_log(Arc::new(FailingExecutionLog))
            .notifier(Arc::new(FailingNotifier))
            .subscribers(Arc::new(FailingDirectory))
            .clock(clock)
            .build()
            .unwrap();
        scheduler.start().await;

        let first = scheduler
            .trigger_manual_crawl(Source::Etsy, Some("handmade".into()), None)
            .await
            .unwrap();
        let second = scheduler
            .trigger_manual_crawl(Source::Etsy, Some("vintage".into()), None)
            .await
            .unwrap();

        eventually(|| async {
            queue.get_task(first).await.is_none() && queue.get_task(second).await.is_none()
        })
        .await;
        assert_eq!(executor.calls().len(), 2);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_sinks_still_release_running_slots() {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let queue = Arc::new(InMemoryTaskQueue::with_clock(
            QueueSettings {
                max_concurrent: 1,
                ..QueueSettings::default()
            },
            clock.clone(),
        ));
        let executor = Arc::new(ScriptedExecutor::new().then(Step::Fail("upstream 503")));
        let directory =
            StaticSubscriberDirectory::new().watch("electronics", UserId::new("alice"));
        let scheduler = SchedulerBuilder::new()
            .settings(settings_without_schedules())
            .executor(executor.clone())
            .queue(queue.clone())
            .execution_log(Arc::new(PanickingExecutionLog))
            .notifier(Arc::new(PanickingNotifier))
            .subscribers(Arc::new(directory))
            .clock(clock)
            .build()
            .unwrap();
        scheduler.start().await;

        let first = scheduler
            .trigger_manual_crawl(Source::Amazon, Some("electronics".into()), None)
            .await
            .unwrap();
        let second = scheduler
            .trigger_manual_crawl(Source::Amazon, Some("electronics".into()), None)
            .await
            .unwrap();

        // 1 回目は失敗して retry、その後 2 件とも完了する
        eventually(|| async { queue.status().await.total == 0 }).await;
        assert!(queue.get_task(first).await.is_none());
        assert!(queue.get_task(second).await.is_none());
        assert_eq!(executor.calls().len(), 3);
        queue.assert_invariants().await;

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn running_tasks_never_exceed_max_concurrent() {
        let executor = ScriptedExecutor::new().gated();
        let gate = executor.gate();
        let h = harness(2, executor);
        h.scheduler.start().await;

        for _ in 0..5 {
            h.scheduler
                .trigger_manual_crawl(Source::Amazon, None, None)
                .await
                .unwrap();
        }

        eventually(|| async { h.executor.calls().len() == 2 }).await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.executor.calls().len(), 2);
        assert_eq!(h.queue.status().await.running, 2);
        h.queue.assert_invariants().await;

        gate.add_permits(5);
        eventually(|| async { h.queue.status().await.total == 0 }).await;
        assert_eq!(h.executor.calls().len(), 5);

        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_dispatch_but_lets_in_flight_work_finish() {
        let executor = ScriptedExecutor::new().gated();
        let gate = executor.gate();
        let h = harness(1, executor);
        h.scheduler.start().await;

        let in_flight = h
            .scheduler
            .trigger_manual_crawl(Source::Ebay, None, None)
            .await
            .unwrap();
        eventually(|| async { h.executor.calls().len() == 1 }).await;

        h.scheduler.stop().await;
        assert!(!h.scheduler.is_running().await);

        let queued = h
            .scheduler
            .trigger_manual_crawl(Source::Ebay, None, None)
            .await
            .unwrap();
        gate.add_permits(2);

        eventually(|| async { h.queue.get_task(in_flight).await.is_none() }).await;
        tokio::time::sleep(Duration::from_secs(300)).await;

        // dispatch is stopped, so the second task stays pending
        assert_eq!(h.executor.calls().len(), 1);
        assert_eq!(
            h.queue.get_task(queued).await.unwrap().status,
            TaskStatus::Pending
        );

        // and is picked up after a restart
        h.scheduler.start().await;
        eventually(|| async { h.queue.get_task(queued).await.is_none() }).await;
        h.scheduler.stop().await;
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let h = harness(1, ScriptedExecutor::new());

        h.scheduler.stop().await;
        h.scheduler.start().await;
        h.scheduler.start().await;
        assert!(h.scheduler.status().await.running);

        h.scheduler.stop().await;
        h.scheduler.stop().await;
        assert!(!h.scheduler.status().await.running);
    }

    #[tokio::test]
    async fn invalid_schedule_update_is_rejected_and_keeps_old_config() {
        let h = harness(1, ScriptedExecutor::new());
        let before = h.scheduler.schedule(Source::Amazon).await.unwrap();

        let err = h
            .scheduler
            .update_schedule(
                Source::Amazon,
                SchedulePatch {
                    interval_minutes: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SchedulerError::Schedule(ScheduleError::NonPositiveInterval(Source::Amazon))
        );
        assert_eq!(h.scheduler.schedule(Source::Amazon).await.unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_update_restarts_timer_with_new_interval() {
        let executor = ScriptedExecutor::new().gated();
        let h = harness(10, executor);
        h.scheduler.start().await;

        let updated = h
            .scheduler
            .update_schedule(
                Source::Etsy,
                SchedulePatch {
                    categories: Some(vec!["ceramics".into(), "prints".into()]),
                    interval_minutes: Some(5),
                    enabled: Some(true),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.interval_minutes, 5);

        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
        eventually(|| async { h.executor.calls().len() == 2 }).await;
        let mut categories: Vec<String> = h
            .executor
            .calls()
            .into_iter()
            .filter_map(|c| c.category)
            .collect();
        categories.sort();
        assert_eq!(categories, vec!["ceramics".to_string(), "prints".to_string()]);

        // disabling cancels the timer
        h.scheduler
            .update_schedule(
                Source::Etsy,
                SchedulePatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        assert_eq!(h.executor.calls().len(), 2);

        let status = h.scheduler.status().await;
        let etsy = status
            .schedules
            .iter()
            .find(|s| s.source == Source::Etsy)
            .unwrap();
        assert!(!etsy.enabled);

        h.scheduler.stop().await;
    }

    #[tokio::test]
    async fn status_reports_schedules_and_queue() {
        let h = harness(1, ScriptedExecutor::new());
        h.scheduler
            .trigger_manual_crawl(Source::Amazon, None, None)
            .await
            .unwrap();

        let status = h.scheduler.status().await;
        assert!(!status.running);
        assert_eq!(status.schedules.len(), Source::ALL.len());
        assert_eq!(status.queue.pending, 1);
        assert_eq!(status.queue.total, 1);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["queue"]["pending"], 1);
    }
}
