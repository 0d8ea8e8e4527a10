//! Test doubles for the scheduler unit tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::domain::{CrawlError, ExecutionLogEntry, ExecutionUpdate, SinkError, Source, TaskId};
use crate::ports::{CrawlExecutor, CrawlReport, ExecutionLog, Notifier, SubscriberDirectory, UserId};

/// What the next `execute` call does. Once the script runs out every call
/// collects zero items.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Collect(u64),
    Fail(&'static str),
    Panic,
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub(crate) source: Source,
    pub(crate) category: Option<String>,
    pub(crate) keywords: Vec<String>,
}

#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn then(self, step: Step) -> Self {
        self.steps
            .lock()
            .unwrap()
            .push_back(step);
        self
    }

    /// Every call blocks until a permit is added to `gate()`.
    pub(crate) fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub(crate) fn gate(&self) -> Arc<Semaphore> {
        Arc::clone(self.gate.as_ref().expect("executor is not gated"))
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrawlExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        source: Source,
        category: Option<&str>,
        keywords: &[String],
    ) -> Result<CrawlReport, CrawlError> {
        self.calls.lock().unwrap().push(Call {
            source,
            category: category.map(str::to_string),
            keywords: keywords.to_vec(),
        });

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let step = self.steps.lock().unwrap().pop_front();
        match step.unwrap_or(Step::Collect(0)) {
            Step::Collect(items_collected) => Ok(CrawlReport { items_collected }),
            Step::Fail(message) => Err(CrawlError::failed(message)),
            Step::Panic => panic!("scraper blew up"),
            Step::Hang => std::future::pending::<Result<CrawlReport, CrawlError>>().await,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Sent {
    pub(crate) users: Vec<UserId>,
    pub(crate) message: String,
    pub(crate) payload: serde_json::Value,
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        users: &[UserId],
        message: &str,
        payload: serde_json::Value,
    ) -> Result<(), SinkError> {
        self.sent.lock().unwrap().push(Sent {
            users: users.to_vec(),
            message: message.to_string(),
            payload,
        });
        Ok(())
    }
}

pub(crate) struct FailingExecutionLog;

#[async_trait]
impl ExecutionLog for FailingExecutionLog {
    async fn record(&self, _entry: ExecutionLogEntry) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("log store offline".into()))
    }

    async fn update(&self, _task_id: TaskId, _update: ExecutionUpdate) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("log store offline".into()))
    }
}

/// Panics on every call.
pub(crate) struct PanickingExecutionLog;

#[async_trait]
impl ExecutionLog for PanickingExecutionLog {
    async fn record(&self, _entry: ExecutionLogEntry) -> Result<(), SinkError> {
        panic!("log store corrupted");
    }

    async fn update(&self, _task_id: TaskId, _update: ExecutionUpdate) -> Result<(), SinkError> {
        panic!("log store corrupted");
    }
}

pub(crate) struct PanickingNotifier;

#[async_trait]
impl Notifier for PanickingNotifier {
    async fn notify(
        &self,
        _users: &[UserId],
        _message: &str,
        _payload: serde_json::Value,
    ) -> Result<(), SinkError> {
        panic!("push gateway crashed");
    }
}

pub(crate) struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(
        &self,
        _users: &[UserId],
        _message: &str,
        _payload: serde_json::Value,
    ) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("push gateway offline".into()))
    }
}

pub(crate) struct FailingDirectory;

#[async_trait]
impl SubscriberDirectory for FailingDirectory {
    async fn watchers(&self, _category: &str) -> Result<Vec<UserId>, SinkError> {
        Err(SinkError::Unavailable("user db offline".into()))
    }
}

/// Poll `check` until it holds. Meant for `start_paused` tests, where the
/// sleeps cost no wall time.
pub(crate) async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..10_000 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
