//! Per-task execution: log -> crawl -> log -> queue transition -> notify.
//!
//! Nothing in here may take the scheduler down. Crawl errors, timeouts and
//! panics all become `fail_task`; log / directory / notifier errors are
//! reported with `warn!` and otherwise ignored. The sink calls run in their
//! own tokio task as well, so a panicking sink cannot skip the queue
//! transition.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::scheduler::Shared;
use crate::domain::{CrawlError, ExecutionLogEntry, ExecutionUpdate, SinkError, TaskId};
use crate::ports::CrawlReport;
use crate::queue::{Task, TaskStatus};

pub(crate) async fn run_task(shared: Arc<Shared>, task: Task) {
    let started = Instant::now();
    let entry = ExecutionLogEntry::started(task.id, task.source, shared.clock.now());
    let log = Arc::clone(&shared.log);
    isolated("execution log record", task.id, async move {
        report_sink_error("execution log record", log.record(entry).await);
    })
    .await;

    let result = execute(&shared, &task).await;
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let completed_at = shared.clock.now();

    match result {
        Ok(report) => {
            info!(
                task_id = %task.id,
                source = %task.source,
                category = ?task.category,
                items_collected = report.items_collected,
                duration_ms,
                "crawl completed"
            );
            let update = ExecutionUpdate::completed(report.items_collected, completed_at, duration_ms);
            update_log(&shared, task.id, update).await;
            shared.queue.complete_task(task.id).await;

            let task_id = task.id;
            let shared = Arc::clone(&shared);
            isolated("notification", task_id, async move {
                notify_watchers(&shared, &task, report).await;
            })
            .await;
        }
        Err(err) => {
            let message = err.to_string();
            let update = ExecutionUpdate::failed(message.as_str(), completed_at, duration_ms);
            update_log(&shared, task.id, update).await;

            let outcome = shared.queue.fail_task(task.id, message.clone()).await;
            warn!(
                task_id = %task.id,
                source = %task.source,
                category = ?task.category,
                attempt = task.retry_count + 1,
                max_retries = task.max_retries,
                will_retry = outcome == Some(TaskStatus::Pending),
                duration_ms,
                error = %message,
                "crawl failed"
            );
        }
    }
}

async fn update_log(shared: &Shared, task_id: TaskId, update: ExecutionUpdate) {
    let log = Arc::clone(&shared.log);
    isolated("execution log update", task_id, async move {
        report_sink_error("execution log update", log.update(task_id, update).await);
    })
    .await;
}

/// Run a side effect in its own tokio task; a panic there is logged and
/// swallowed.
async fn isolated<F>(what: &'static str, task_id: TaskId, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(err) = tokio::spawn(fut).await {
        let reason = if err.is_panic() {
            panic_message(err.into_panic())
        } else {
            err.to_string()
        };
        warn!(task_id = %task_id, reason = %reason, "{what} panicked; continuing");
    }
}

/// Run the crawl in its own tokio task so a panic surfaces as a `JoinError`
/// instead of unwinding through the scheduler.
async fn execute(shared: &Shared, task: &Task) -> Result<CrawlReport, CrawlError> {
    let executor = Arc::clone(&shared.executor);
    let source = task.source;
    let category = task.category.clone();
    let keywords = task.keywords().to_vec();

    let handle = tokio::spawn(async move {
        executor
            .execute(source, category.as_deref(), &keywords)
            .await
    });
    let abort = handle.abort_handle();

    let joined = match shared.options.execution_timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.abort();
                return Err(CrawlError::Timeout(limit));
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(CrawlError::Panicked(panic_message(err.into_panic()))),
        Err(err) => Err(CrawlError::failed(format!("crawl task aborted: {err}"))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn notify_watchers(shared: &Shared, task: &Task, report: CrawlReport) {
    let Some(category) = task.category.as_deref() else {
        return;
    };

    let users = match shared.directory.watchers(category).await {
        Ok(users) => users,
        Err(err) => {
            warn!(task_id = %task.id, category, error = %err, "subscriber lookup failed");
            return;
        }
    };
    if users.is_empty() {
        debug!(task_id = %task.id, category, "no watchers for category");
        return;
    }

    let message = format!(
        "{} crawl for '{}' finished with {} new items",
        task.source, category, report.items_collected
    );
    let payload = serde_json::json!({
        "task_id": task.id.to_string(),
        "source": task.source,
        "category": category,
        "items_collected": report.items_collected,
    });
    report_sink_error(
        "notification",
        shared.notifier.notify(&users, &message, payload).await,
    );
}

fn report_sink_error(what: &str, result: Result<(), SinkError>) {
    if let Err(err) = result {
        warn!(error = %err, "{what} failed; continuing");
    }
}
