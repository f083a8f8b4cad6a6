//! The REST operations the tools depend on.
//!
//! [`ClusterClient`](super::client::ClusterClient) implements these against a
//! live cluster; tests substitute an in-memory cluster.

use crate::error::ApiError;
use crate::model::{
    BackupSources, ClusterInfo, LegacyBackupJobEntry, LegacyRun, Policy, ProgressMonitor,
    ProtectionGroup, ProtectionJob, ProtectionRun, RemoteCluster, ReplicationTask, RunRequest,
    RunsPage, SourceNode, Vault,
};

/// Answer to a run-now request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// The cluster refused because a run of the job is still in flight. The
    /// payload is the cluster's message.
    AlreadyRunning(String),
}

#[allow(async_fn_in_trait)]
pub trait ClusterApi {
    async fn cluster(&self) -> Result<ClusterInfo, ApiError>;

    async fn remote_clusters(&self) -> Result<Vec<RemoteCluster>, ApiError>;
}

/// Operations used to trigger and follow a single job run.
#[allow(async_fn_in_trait)]
pub trait RunApi: ClusterApi {
    async fn protection_jobs(&self) -> Result<Vec<ProtectionJob>, ApiError>;

    async fn protection_policy(&self, policy_id: &str) -> Result<Policy, ApiError>;

    async fn protection_sources(&self, environment: &str) -> Result<Vec<SourceNode>, ApiError>;

    async fn backup_job(&self, job_id: u64) -> Result<Vec<LegacyBackupJobEntry>, ApiError>;

    async fn backup_sources(&self, parent_source_id: u64) -> Result<BackupSources, ApiError>;

    async fn vaults(&self) -> Result<Vec<Vault>, ApiError>;

    async fn submit_run(&self, job_id: u64, request: &RunRequest)
        -> Result<SubmitOutcome, ApiError>;

    /// Legacy run listing of a job, newest first.
    async fn job_runs(&self, job_id: u64) -> Result<Vec<LegacyRun>, ApiError>;

    async fn cancel_run(&self, job_id: u64, job_run_id: u64) -> Result<(), ApiError>;

    /// Newest `num_runs` runs of a protection group.
    async fn recent_runs(
        &self,
        group_id: &str,
        num_runs: u32,
        include_objects: bool,
    ) -> Result<RunsPage, ApiError>;

    async fn run(
        &self,
        group_id: &str,
        run_id: &str,
        include_objects: bool,
    ) -> Result<ProtectionRun, ApiError>;

    async fn progress(
        &self,
        task_path: &str,
        exclude_sub_tasks: bool,
    ) -> Result<ProgressMonitor, ApiError>;
}

/// Operations used by the replication audit.
#[allow(async_fn_in_trait)]
pub trait ReplicationApi: ClusterApi {
    async fn protection_groups(&self) -> Result<Vec<ProtectionGroup>, ApiError>;

    /// Up to `num_runs` runs that started at or before `end_time_usecs`,
    /// newest first.
    async fn runs_before(
        &self,
        group_id: &str,
        num_runs: u32,
        end_time_usecs: i64,
    ) -> Result<RunsPage, ApiError>;

    /// Expiry of the local snapshot of the run that started at
    /// `start_time_usecs`.
    async fn run_expiry(&self, job_id: u64, start_time_usecs: i64)
        -> Result<Option<i64>, ApiError>;

    async fn submit_replication(&self, task: &ReplicationTask) -> Result<(), ApiError>;
}
