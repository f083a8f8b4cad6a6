//! Progress-monitor helpers: percent milestones and log substring matching.

use std::time::Duration;

use tokio::time::{sleep, Instant};

use super::api::RunApi;
use crate::model::ProgressMonitor;

const POST_PROCESSING: &str = "post_processing";

/// Reports percent-complete milestones, each strictly above the previous one.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: Option<u32>,
}

impl ProgressTracker {
    /// Returns the rounded percentage when it is a new milestone.
    pub fn observe(&mut self, percent_finished: f64) -> Option<u32> {
        let rounded = percent_finished.round().clamp(0.0, 100.0) as u32;
        if self.last.is_some_and(|last| rounded <= last) {
            return None;
        }
        self.last = Some(rounded);
        Some(rounded)
    }

    /// No more queries are needed once 100% was reported.
    pub fn finished(&self) -> bool {
        self.last == Some(100)
    }
}

/// True when every sub-task other than post processing has logged an event
/// containing `needle`. A monitor without such sub-tasks never matches.
pub fn all_sub_tasks_logged(monitor: &ProgressMonitor, needle: &str) -> bool {
    let mut tasks = monitor
        .sub_tasks()
        .iter()
        .filter(|t| t.task_path != POST_PROCESSING)
        .peekable();
    if tasks.peek().is_none() {
        return false;
    }
    tasks.all(|t| t.event_messages().any(|m| m.contains(needle)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStringResult {
    Matched,
    TimedOut,
}

/// Poll the run's progress monitor until the exit string shows up in every
/// sub-task's log or `timeout` elapses. Failed polls are retried silently.
pub async fn wait_for_exit_string<A: RunApi>(
    api: &A,
    task_path: Option<&str>,
    needle: &str,
    timeout: Duration,
    interval: Duration,
) -> ExitStringResult {
    let deadline = Instant::now() + timeout;
    loop {
        sleep(interval).await;
        if Instant::now() > deadline {
            return ExitStringResult::TimedOut;
        }
        let Some(path) = task_path else {
            continue;
        };
        match api.progress(path, false).await {
            Ok(monitor) if all_sub_tasks_logged(&monitor, needle) => {
                return ExitStringResult::Matched
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "progress monitor poll failed"),
        }
    }
}
