//! Per-source schedule timers.
//!
//! Each enabled schedule owns one tokio task that enqueues one
//! medium-priority task per category on every tick.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::domain::{Priority, ScheduleConfig, TaskId, TaskSpec};
use crate::queue::TaskQueue;

/// Enqueue the tasks for one tick of `config`.
///
/// All categories go in as one `add_tasks` batch, so aborting the timer
/// never leaves half a tick in the queue.
pub async fn enqueue_tick(queue: &dyn TaskQueue, config: &ScheduleConfig) -> Vec<TaskId> {
    if config.categories.is_empty() {
        debug!(source = %config.source, "schedule has no categories, nothing to enqueue");
        return Vec::new();
    }

    let specs: Vec<TaskSpec> = config
        .categories
        .iter()
        .map(|category| {
            TaskSpec::new(config.source)
                .with_category(category.as_str())
                .with_priority(Priority::Medium)
        })
        .collect();
    let ids = queue.add_tasks(specs).await;
    info!(source = %config.source, tasks = ids.len(), "scheduled crawl tasks enqueued");
    ids
}

/// Start the repeating timer for `config`.
///
/// The first tick fires one full interval after the call. The caller owns
/// the handle and aborts it to cancel the timer.
pub(crate) fn spawn(queue: Arc<dyn TaskQueue>, config: ScheduleConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = config.interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(
            source = %config.source,
            interval_minutes = config.interval_minutes,
            "schedule timer started"
        );

        loop {
            ticker.tick().await;
            enqueue_tick(queue.as_ref(), &config).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::domain::Source;
    use crate::queue::{InMemoryTaskQueue, QueueSettings, QueueStatus, Task, TaskStatus};

    /// Delegates to an in-memory queue and records how tasks arrive.
    struct CountingQueue {
        inner: InMemoryTaskQueue,
        single_adds: Mutex<usize>,
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl TaskQueue for CountingQueue {
        async fn add_task(&self, spec: TaskSpec) -> TaskId {
            *self.single_adds.lock().await += 1;
            self.inner.add_task(spec).await
        }

        async fn add_tasks(&self, specs: Vec<TaskSpec>) -> Vec<TaskId> {
            self.batches.lock().await.push(specs.len());
            self.inner.add_tasks(specs).await
        }

        async fn next_task(&self) -> Option<Task> {
            self.inner.next_task().await
        }

        async fn complete_task(&self, task_id: TaskId) -> bool {
            self.inner.complete_task(task_id).await
        }

        async fn fail_task(&self, task_id: TaskId, error: String) -> Option<TaskStatus> {
            self.inner.fail_task(task_id, error).await
        }

        async fn status(&self) -> QueueStatus {
            self.inner.status().await
        }

        async fn get_task(&self, task_id: TaskId) -> Option<Task> {
            self.inner.get_task(task_id).await
        }

        async fn changed(&self) {
            self.inner.changed().await
        }
    }

    fn schedule(interval_minutes: u32, categories: &[&str]) -> ScheduleConfig {
        ScheduleConfig {
            source: Source::Ebay,
            categories: categories.iter().map(|c| c.to_string()).collect(),
            interval_minutes,
            enabled: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn each_tick_enqueues_one_task_per_category() {
        let queue = Arc::new(InMemoryTaskQueue::new(QueueSettings {
            max_concurrent: 10,
            ..QueueSettings::default()
        }));
        let handle = spawn(queue.clone(), schedule(60, &["cameras", "watches"]));

        tokio::time::sleep(Duration::from_secs(59 * 60)).await;
        assert_eq!(queue.status().await.total, 0);

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert_eq!(queue.status().await.total, 2);

        let mut categories = HashSet::new();
        while let Some(task) = queue.next_task().await {
            assert_eq!(task.source, Source::Ebay);
            assert_eq!(task.priority, Priority::Medium);
            categories.insert(task.category.unwrap());
        }
        assert_eq!(
            categories,
            HashSet::from(["cameras".to_string(), "watches".to_string()])
        );

        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        assert_eq!(queue.status().await.pending, 2);

        handle.abort();
    }

    #[tokio::test]
    async fn tick_enqueues_categories_as_one_batch() {
        let queue = CountingQueue {
            inner: InMemoryTaskQueue::new(QueueSettings::default()),
            single_adds: Mutex::new(0),
            batches: Mutex::new(Vec::new()),
        };

        let ids = enqueue_tick(&queue, &schedule(5, &["cameras", "watches", "coins"])).await;

        assert_eq!(ids.len(), 3);
        assert_eq!(*queue.batches.lock().await, vec![3]);
        assert_eq!(*queue.single_adds.lock().await, 0);
        assert_eq!(queue.status().await.pending, 3);
    }

    #[tokio::test]
    async fn empty_category_list_enqueues_nothing() {
        let queue = InMemoryTaskQueue::new(QueueSettings::default());
        let ids = enqueue_tick(&queue, &schedule(5, &[])).await;

        assert!(ids.is_empty());
        assert_eq!(queue.status().await.total, 0);
    }
}
