//! Resolved settings for the two tools, built from their command lines.

use std::time::Duration;

/// Shortest interval between status polls the cluster tolerates.
pub const MIN_SLEEP_TIME: Duration = Duration::from_secs(30);
/// Shortest budget for a submitted run to show up in run history.
pub const MIN_NEW_RUN_TIMEOUT: Duration = Duration::from_secs(720);
/// Fixed pause before each history or status query.
pub const SETTLE_TIME: Duration = Duration::from_secs(15);
/// Attempts at fetching the job list before giving up.
pub const JOB_LIST_ATTEMPTS: u32 = 3;

/// Polling behaviour of a triggered run.
///
/// The three budgets are independent: `wait_if_running` bounds the wait for an
/// existing run to clear, `new_run_timeout` bounds the wait for the new run to
/// appear, and `status_retries` bounds consecutive failed status polls.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub wait: bool,
    pub abort_if_running: bool,
    pub wait_if_running: Duration,
    pub cancel_previous_after: Option<Duration>,
    pub new_run_timeout: Duration,
    pub sleep_time: Duration,
    pub settle_time: Duration,
    pub status_retries: u32,
    pub progress: bool,
    pub exit_string: Option<String>,
    pub exit_string_timeout: Duration,
}

impl LifecycleConfig {
    /// Apply the floors on poll interval and new-run timeout. Progress and
    /// exit-string monitoring only make sense while waiting.
    pub fn normalized(mut self) -> Self {
        self.sleep_time = self.sleep_time.max(MIN_SLEEP_TIME);
        self.new_run_timeout = self.new_run_timeout.max(MIN_NEW_RUN_TIMEOUT);
        if self.progress || self.exit_string.is_some() {
            self.wait = true;
        }
        self
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            wait: false,
            abort_if_running: false,
            wait_if_running: Duration::from_secs(60 * 60),
            cancel_previous_after: None,
            new_run_timeout: Duration::from_secs(30 * 60),
            sleep_time: Duration::from_secs(120),
            settle_time: SETTLE_TIME,
            status_retries: 10,
            progress: false,
            exit_string: None,
            exit_string_timeout: Duration::from_secs(120),
        }
    }
}

/// Settings of one replication audit pass.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub remote_cluster: String,
    /// Empty means every protection group.
    pub job_names: Vec<String>,
    /// Fixed replica retention in days; 0 derives it from the original expiry.
    pub keep_for: u32,
    pub commit: bool,
    pub resync: bool,
    pub exclude_logs: bool,
    pub page_size: u32,
    pub now_usecs: i64,
}
