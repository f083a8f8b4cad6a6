//! Run-now lifecycle: submit, wait out an in-flight run, wait for the new run
//! to register, then follow it to a terminal status.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::api::{RunApi, SubmitOutcome};
use super::monitor::{wait_for_exit_string, ExitStringResult, ProgressTracker};
use crate::clock;
use crate::config::LifecycleConfig;
use crate::error::{ApiError, RunError};
use crate::model::{BackupInfo, ProtectionRun, RunRequest, RunStatus};
use crate::output::Output;
use crate::text_summary::build_run_summary;

/// The job a lifecycle drives.
#[derive(Debug, Clone)]
pub struct RunTarget {
    pub job_id: u64,
    pub job_name: String,
    /// v2 protection group id, `clusterId:incarnationId:jobId`.
    pub group_id: String,
    /// First selected object; only runs containing it count as new.
    pub selected_source: Option<u64>,
}

/// How a lifecycle ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A run was in flight and the caller asked not to wait for it.
    AlreadyRunning,
    /// Accepted and not waited on.
    Started,
    Finished {
        status: RunStatus,
        end_time_usecs: Option<i64>,
    },
    ExitStringMatched,
    ExitStringTimedOut,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::AlreadyRunning | RunOutcome::Started | RunOutcome::ExitStringMatched => 0,
            RunOutcome::Finished { status, .. } if status.is_success() => 0,
            RunOutcome::Finished { .. } | RunOutcome::ExitStringTimedOut => 1,
        }
    }
}

/// A run is new only when its instance id is strictly above the baseline.
/// Runs that are still working and not already being canceled.
fn is_cancelable(status: RunStatus) -> bool {
    !status.is_terminal() && status != RunStatus::Canceling
}

/// Start time before which an in-flight run counts as stale. Saturates for
/// ages beyond the microsecond range.
fn stale_cutoff(now_usecs: i64, age: Duration) -> i64 {
    now_usecs.saturating_sub(i64::try_from(age.as_micros()).unwrap_or(i64::MAX))
}

pub fn is_new_run(last_instance_id: u64, observed_instance_id: u64) -> bool {
    observed_instance_id > last_instance_id
}

pub struct RunLifecycle<'a, A> {
    api: &'a A,
    cfg: &'a LifecycleConfig,
    out: &'a Output,
}

impl<'a, A: RunApi> RunLifecycle<'a, A> {
    pub fn new(api: &'a A, cfg: &'a LifecycleConfig, out: &'a Output) -> Self {
        Self { api, cfg, out }
    }

    pub async fn execute(
        &self,
        target: &RunTarget,
        request: &RunRequest,
    ) -> Result<RunOutcome, RunError> {
        let baseline = self.baseline(target).await?;
        debug!(baseline, group = %target.group_id, "last known run instance");

        if !self.submit(target, request).await? {
            return Ok(RunOutcome::AlreadyRunning);
        }
        self.out.say(format!("Running {}...", target.job_name));
        if !self.cfg.wait {
            return Ok(RunOutcome::Started);
        }

        let run_id = self.wait_for_new_run(target, baseline).await?;
        self.wait_for_completion(target, &run_id).await
    }

    /// Instance id of the newest run, or 1 when the job never ran.
    async fn baseline(&self, target: &RunTarget) -> Result<u64, RunError> {
        let page = self.api.recent_runs(&target.group_id, 1, false).await?;
        Ok(page
            .runs
            .first()
            .map(|r| r.protection_group_instance_id)
            .unwrap_or(1))
    }

    /// Submit until accepted. Returns false when a run is in flight and the
    /// caller asked to abort in that case.
    async fn submit(&self, target: &RunTarget, request: &RunRequest) -> Result<bool, RunError> {
        let deadline = Instant::now() + self.cfg.wait_if_running;
        let mut reported = false;
        loop {
            match self.api.submit_run(target.job_id, request).await? {
                SubmitOutcome::Accepted => return Ok(true),
                SubmitOutcome::AlreadyRunning(message) => {
                    debug!(%message, "run-now refused");
                    if let Some(age) = self.cfg.cancel_previous_after {
                        self.cancel_stale_runs(target, age).await;
                    }
                    if !reported {
                        if self.cfg.abort_if_running {
                            self.out.say("job is already running");
                            return Ok(false);
                        }
                        self.out.say("Waiting for existing run to finish");
                        reported = true;
                    }
                    if Instant::now() >= deadline {
                        return Err(RunError::ExistingRunTimeout);
                    }
                    sleep(self.cfg.sleep_time).await;
                }
            }
        }
    }

    /// Cancel in-flight runs that started more than `age` ago.
    async fn cancel_stale_runs(&self, target: &RunTarget, age: Duration) {
        let cutoff = stale_cutoff(clock::now_usecs(), age);
        let runs = match self.api.job_runs(target.job_id).await {
            Ok(runs) => runs,
            Err(e) => {
                warn!(error = %e, "could not list runs to cancel");
                return;
            }
        };
        for backup_run in runs.iter().filter_map(|r| r.backup_run.as_ref()) {
            let in_flight = backup_run.status.is_some_and(is_cancelable);
            let started = backup_run.stats.as_ref().and_then(|s| s.start_time_usecs);
            if !in_flight || !started.is_some_and(|start| start < cutoff) {
                continue;
            }
            self.out.say("Canceling previous job run");
            if let Err(e) = self.api.cancel_run(target.job_id, backup_run.job_run_id).await {
                warn!(error = %e, job_run_id = backup_run.job_run_id, "cancel failed");
            }
        }
    }

    async fn newest_run(&self, target: &RunTarget) -> Result<Option<ProtectionRun>, ApiError> {
        let newest = match target.selected_source {
            Some(object_id) => self
                .api
                .recent_runs(&target.group_id, 10, true)
                .await?
                .runs
                .into_iter()
                .find(|r| r.protects(object_id)),
            None => self
                .api
                .recent_runs(&target.group_id, 1, false)
                .await?
                .runs
                .into_iter()
                .next(),
        };
        Ok(newest)
    }

    /// Wait until a run newer than `baseline` shows up and return its v2 id.
    async fn wait_for_new_run(
        &self,
        target: &RunTarget,
        baseline: u64,
    ) -> Result<String, RunError> {
        let deadline = Instant::now() + self.cfg.new_run_timeout;
        loop {
            sleep(self.cfg.settle_time).await;
            match self.newest_run(target).await {
                Ok(Some(run)) => {
                    debug!(
                        previous = baseline,
                        latest = run.protection_group_instance_id,
                        "run history"
                    );
                    if is_new_run(baseline, run.protection_group_instance_id) {
                        self.out.say(format!("New Job Run ID: {}", run.id));
                        return Ok(run.id);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(error = %e, "run history poll failed"),
            }
            if Instant::now() > deadline {
                return Err(RunError::NewRunTimeout);
            }
            sleep(self.cfg.sleep_time).await;
        }
    }

    /// Poll the run until it is terminal. Consecutive failed polls beyond the
    /// retry limit abort the wait.
    async fn wait_for_completion(
        &self,
        target: &RunTarget,
        run_id: &str,
    ) -> Result<RunOutcome, RunError> {
        let mut failures = 0u32;
        let mut tracker = ProgressTracker::default();
        loop {
            sleep(self.cfg.settle_time).await;
            match self.poll(target, run_id, &mut tracker).await {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => failures = 0,
                Err(e) => {
                    failures += 1;
                    debug!(error = %e, failures, "error getting updated status");
                    if failures > self.cfg.status_retries {
                        return Err(RunError::StatusTimeout);
                    }
                }
            }
            sleep(self.cfg.sleep_time).await;
        }
    }

    async fn poll(
        &self,
        target: &RunTarget,
        run_id: &str,
        tracker: &mut ProgressTracker,
    ) -> Result<Option<RunOutcome>, ApiError> {
        let needle = self.cfg.exit_string.as_deref();
        let run = self
            .api
            .run(&target.group_id, run_id, needle.is_some())
            .await?;
        let info = run
            .backup_info()
            .ok_or_else(|| ApiError::missing(run_id, "localBackupInfo"))?;

        if let Some(needle) = needle {
            let result = wait_for_exit_string(
                self.api,
                info.progress_task_id.as_deref(),
                needle,
                self.cfg.exit_string_timeout,
                self.cfg.settle_time,
            )
            .await;
            return Ok(Some(match result {
                ExitStringResult::Matched => {
                    self.out.say("*** SUCCESSFUL STRING MATCH");
                    RunOutcome::ExitStringMatched
                }
                ExitStringResult::TimedOut => {
                    self.out.say("*** TIMED OUT WAITING FOR STRING MATCH");
                    RunOutcome::ExitStringTimedOut
                }
            }));
        }

        if self.cfg.progress && !tracker.finished() {
            if let Some(path) = info.progress_task_id.as_deref() {
                let monitor = self.api.progress(path, true).await?;
                if let Some(percent) = monitor.percent_finished().and_then(|p| tracker.observe(p)) {
                    self.out.say(format!("{percent}% completed"));
                }
            }
        }

        if info.status.is_terminal() {
            return Ok(Some(self.finish(info)));
        }
        Ok(None)
    }

    fn finish(&self, info: &BackupInfo) -> RunOutcome {
        for line in build_run_summary(info).lines {
            self.out.say(line);
        }
        match info.end_time_usecs {
            Some(end) => self
                .out
                .note(format!("Backup ended {}", clock::usecs_to_date(end))),
            None => self.out.note("Backup ended"),
        }
        RunOutcome::Finished {
            status: info.status,
            end_time_usecs: info.end_time_usecs,
        }
    }
}
