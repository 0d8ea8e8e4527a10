//! Dispatch loop: pull admissible tasks from the queue and run each one in
//! its own tokio task.
//!
//! The loop wakes on whichever comes first:
//! - the queue reports a change (new task, freed slot, due retry)
//! - the poll interval elapses
//! - shutdown is requested
//!
//! Shutdown stops taking new tasks; in-flight executions are left to finish.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use super::runner;
use super::scheduler::Shared;

fn shutdown_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

pub(crate) async fn run(shared: Arc<Shared>, mut shutdown_rx: watch::Receiver<bool>) {
    info!(
        poll_interval_ms = shared.options.poll_interval.as_millis() as u64,
        "dispatch loop started"
    );

    loop {
        // admission control は queue 側（max_concurrent に達したら None）
        while !shutdown_requested(&shutdown_rx) {
            let Some(task) = shared.queue.next_task().await else {
                break;
            };
            debug!(task_id = %task.id, source = %task.source, "dispatching task");
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                runner::run_task(shared, task).await;
            });
        }

        if shutdown_requested(&shutdown_rx) {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender dropped: the scheduler handle is gone
                if changed.is_err() {
                    break;
                }
            }
            _ = shared.queue.changed() => {}
            _ = tokio::time::sleep(shared.options.poll_interval) => {}
        }
    }

    info!("dispatch loop stopped");
}
