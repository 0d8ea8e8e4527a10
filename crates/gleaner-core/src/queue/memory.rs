//! In-memory TaskQueue implementation.
//!
//! State is ephemeral: everything is lost when the process exits.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{QueueStatus, RetryDecision, RetryPolicy, Task, TaskQueue, TaskStatus};
use crate::domain::{TaskId, TaskSpec};
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};

/// Queue-wide limits.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    /// Admission limit: at most this many tasks are Running at once.
    pub max_concurrent: usize,

    /// `max_retries` for tasks whose spec does not set one.
    pub default_max_retries: u32,

    pub retry_policy: RetryPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            default_max_retries: 3,
            retry_policy: RetryPolicy::immediate(),
        }
    }
}

/// A task plus the bookkeeping the queue needs to order it.
struct Entry {
    task: Task,

    /// Insertion sequence, the last FIFO tie-breaker.
    seq: u64,

    /// Delayed retry: not admissible before this instant.
    eligible_at: Option<Instant>,
}

impl Entry {
    fn is_eligible(&self, now: Instant) -> bool {
        self.eligible_at.is_none_or(|at| at <= now)
    }
}

/// priority rank 昇順 → created_at 昇順 → 投入順
fn dispatch_order(a: &Entry, b: &Entry) -> Ordering {
    a.task
        .priority
        .rank()
        .cmp(&b.task.priority.rank())
        .then_with(|| a.task.created_at.cmp(&b.task.created_at))
        .then_with(|| a.seq.cmp(&b.seq))
}

struct InMemoryQueueState {
    /// All queued tasks (single source of truth).
    entries: HashMap<TaskId, Entry>,

    /// Pending TaskIds in dispatch order.
    pending: Vec<TaskId>,

    /// Running TaskIds.
    running: HashSet<TaskId>,

    next_seq: u64,
}

impl InMemoryQueueState {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            pending: Vec::new(),
            running: HashSet::new(),
            next_seq: 0,
        }
    }

    fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Re-sort the pending list (on every insertion).
    fn sort_pending(&mut self) {
        let entries = &self.entries;
        self.pending.sort_by(|a, b| match (entries.get(a), entries.get(b)) {
            (Some(a), Some(b)) => dispatch_order(a, b),
            _ => Ordering::Equal,
        });
    }

    fn push_pending(&mut self, task_id: TaskId) {
        self.pending.push(task_id);
        self.sort_pending();
    }

    /// Earliest future instant at which a delayed retry becomes eligible.
    fn next_eligible_at(&self, now: Instant) -> Option<Instant> {
        self.pending
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter_map(|entry| entry.eligible_at)
            .filter(|at| *at > now)
            .min()
    }

    fn status(&self) -> QueueStatus {
        QueueStatus {
            pending: self.pending.len(),
            running: self.running.len(),
            total: self.entries.len(),
        }
    }
}

/// In-memory queue implementation.
///
/// All mutations go through one `tokio::sync::Mutex`, so callers on any
/// number of tasks see the same sequential behaviour. Locks are never held
/// across an await on anything but the lock itself.
pub struct InMemoryTaskQueue {
    state: Mutex<InMemoryQueueState>,
    notify: Notify,
    settings: QueueSettings,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryTaskQueue {
    pub fn new(settings: QueueSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: QueueSettings, clock: Arc<dyn Clock>) -> Self {
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        Self::with_parts(settings, clock, ids)
    }

    /// `max_concurrent` below 1 would never admit anything; it is raised
    /// to 1.
    pub fn with_parts(
        mut settings: QueueSettings,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        if settings.max_concurrent == 0 {
            warn!("max_concurrent = 0 would never dispatch; using 1");
            settings.max_concurrent = 1;
        }
        Self {
            state: Mutex::new(InMemoryQueueState::new()),
            notify: Notify::new(),
            settings,
            clock,
            ids,
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }
}

impl InMemoryTaskQueue {
    /// Create a pending task under an already-held lock.
    fn insert(&self, state: &mut InMemoryQueueState, spec: TaskSpec) -> TaskId {
        let task_id = self.ids.generate_task_id();
        let task = Task::new(
            task_id,
            spec,
            self.settings.default_max_retries,
            self.clock.now(),
        );
        debug!(
            task_id = %task_id,
            source = %task.source,
            category = ?task.category,
            priority = ?task.priority,
            "task added"
        );

        let seq = state.allocate_seq();
        state.entries.insert(
            task_id,
            Entry {
                task,
                seq,
                eligible_at: None,
            },
        );
        state.push_pending(task_id);
        task_id
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn add_task(&self, spec: TaskSpec) -> TaskId {
        let task_id = {
            let mut state = self.state.lock().await;
            self.insert(&mut state, spec)
        };

        self.notify.notify_one();
        task_id
    }

    async fn add_tasks(&self, specs: Vec<TaskSpec>) -> Vec<TaskId> {
        if specs.is_empty() {
            return Vec::new();
        }

        // 1 回のロックで全件投入（途中で cancel されても一部だけ入ることはない）
        let ids: Vec<TaskId> = {
            let mut state = self.state.lock().await;
            specs
                .into_iter()
                .map(|spec| self.insert(&mut state, spec))
                .collect()
        };

        self.notify.notify_one();
        ids
    }

    async fn next_task(&self) -> Option<Task> {
        let mut state = self.state.lock().await;
        if state.running.len() >= self.settings.max_concurrent {
            return None;
        }

        let now = Instant::now();
        let position = state.pending.iter().position(|id| {
            state
                .entries
                .get(id)
                .is_some_and(|entry| entry.is_eligible(now))
        })?;
        let task_id = state.pending.remove(position);

        let started_at = self.clock.now();
        let entry = state.entries.get_mut(&task_id)?;
        entry.eligible_at = None;
        entry.task.start(started_at);
        let task = entry.task.clone();
        state.running.insert(task_id);

        debug!(task_id = %task_id, running = state.running.len(), "task admitted");
        Some(task)
    }

    async fn complete_task(&self, task_id: TaskId) -> bool {
        {
            let mut state = self.state.lock().await;
            if !state.running.remove(&task_id) {
                debug!(task_id = %task_id, "complete_task ignored: task is not running");
                return false;
            }
            if let Some(mut entry) = state.entries.remove(&task_id) {
                entry.task.mark_completed(self.clock.now());
                debug!(task_id = %task_id, "task completed");
            }
        }

        // running slot が空いたので dispatcher を起こす
        self.notify.notify_one();
        true
    }

    async fn fail_task(&self, task_id: TaskId, error: String) -> Option<TaskStatus> {
        let status = {
            let mut state = self.state.lock().await;
            if !state.running.remove(&task_id) {
                debug!(task_id = %task_id, "fail_task ignored: task is not running");
                return None;
            }
            let now = self.clock.now();
            let entry = state.entries.get_mut(&task_id)?;
            entry.task.record_failure(error);

            let retry_count = entry.task.retry_count;
            let max_retries = entry.task.max_retries;
            match self.settings.retry_policy.decide(retry_count, max_retries) {
                RetryDecision::Retry { delay } => {
                    entry.task.requeue();
                    entry.eligible_at = (!delay.is_zero()).then(|| Instant::now() + delay);
                    debug!(
                        task_id = %task_id,
                        retry_count,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "task scheduled for retry"
                    );
                    state.push_pending(task_id);
                    TaskStatus::Pending
                }
                RetryDecision::GiveUp => {
                    entry.task.mark_failed(now);
                    warn!(
                        task_id = %task_id,
                        retry_count,
                        max_retries,
                        error = ?entry.task.error,
                        "task failed permanently"
                    );
                    state.entries.remove(&task_id);
                    TaskStatus::Failed
                }
            }
        }; // Lock released here

        self.notify.notify_one();
        Some(status)
    }

    async fn status(&self) -> QueueStatus {
        self.state.lock().await.status()
    }

    async fn get_task(&self, task_id: TaskId) -> Option<Task> {
        let state = self.state.lock().await;
        state.entries.get(&task_id).map(|entry| entry.task.clone())
    }

    async fn changed(&self) {
        let next_wake = {
            let state = self.state.lock().await;
            state.next_eligible_at(Instant::now())
        };

        // Wait for notification OR the next delayed retry
        match next_wake {
            Some(wake_at) => {
                tokio::select! {
                    _ = self.notify.notified() => {},
                    _ = tokio::time::sleep_until(wake_at) => {},
                }
            }
            None => self.notify.notified().await,
        }
    }
}

#[cfg(test)]
impl InMemoryTaskQueue {
    /// Check the structural invariants (for testing).
    pub(crate) async fn assert_invariants(&self) {
        let state = self.state.lock().await;
        assert!(state.running.len() <= self.settings.max_concurrent);
        assert_eq!(state.pending.len() + state.running.len(), state.entries.len());
        for entry in state.entries.values() {
            assert!(entry.task.retry_count <= entry.task.max_retries);
            let expected = if state.running.contains(&entry.task.id) {
                TaskStatus::Running
            } else {
                TaskStatus::Pending
            };
            assert_eq!(entry.task.status, expected);
        }
    }
}
