//! In-memory cluster for exercising the polling loops.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use reqwest::StatusCode;

use super::api::{ClusterApi, ReplicationApi, RunApi, SubmitOutcome};
use crate::error::ApiError;
use crate::model::{
    BackupInfo, BackupSources, ClusterInfo, LegacyBackupJobEntry, LegacyRun, ObjectSummary,
    Policy, ProgressMonitor, ProtectionGroup, ProtectionJob, ProtectionRun, RemoteCluster,
    ReplicationInfo, ReplicationTargetResult, ReplicationTask, RunObject, RunRequest, RunStatus,
    RunsPage, SourceNode, Vault,
};

/// Scripted responses. Values are consumed in order and the last one repeats.
#[derive(Debug)]
pub struct Script<T>(VecDeque<Result<T, String>>);

impl<T> Default for Script<T> {
    fn default() -> Self {
        Script(VecDeque::new())
    }
}

impl<T: Clone> Script<T> {
    pub fn set(&mut self, values: impl IntoIterator<Item = Result<T, String>>) {
        self.0 = values.into_iter().collect();
    }

    pub fn ok(&mut self, values: impl IntoIterator<Item = T>) {
        self.set(values.into_iter().map(Ok));
    }

    fn next(&mut self, path: &str) -> Result<T, ApiError> {
        let value = if self.0.len() > 1 {
            self.0.pop_front()
        } else {
            self.0.front().cloned()
        };
        match value {
            Some(Ok(v)) => Ok(v),
            Some(Err(body)) => Err(ApiError::Status {
                path: path.to_string(),
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body,
            }),
            None => Err(ApiError::missing(path, "scripted response")),
        }
    }
}

#[derive(Debug)]
pub struct State {
    pub cluster: ClusterInfo,
    pub remotes: Vec<RemoteCluster>,
    pub vaults: Vec<Vault>,
    pub jobs: Script<Vec<ProtectionJob>>,
    pub policy: Policy,
    pub sources: Vec<SourceNode>,
    pub backup_job: Vec<LegacyBackupJobEntry>,
    pub backup_sources: BackupSources,
    pub submits: Script<SubmitOutcome>,
    pub legacy_runs: Vec<LegacyRun>,
    pub recent: Script<RunsPage>,
    pub run: Script<ProtectionRun>,
    pub progress: Script<ProgressMonitor>,
    pub groups: Vec<ProtectionGroup>,
    pub history: HashMap<String, Vec<ProtectionRun>>,
    pub expiries: HashMap<i64, i64>,
    /// Run start times whose expiry lookup fails.
    pub expiry_errors: Vec<i64>,

    pub submitted: Vec<RunRequest>,
    pub canceled: Vec<u64>,
    pub replications: Vec<ReplicationTask>,
    pub job_list_calls: u32,
    pub history_calls: u32,
}

impl Default for State {
    fn default() -> Self {
        Self {
            cluster: ClusterInfo {
                id: 1111,
                incarnation_id: 2222,
                name: Some("prod".into()),
            },
            remotes: Vec::new(),
            vaults: Vec::new(),
            jobs: Script::default(),
            policy: Policy::default(),
            sources: Vec::new(),
            backup_job: Vec::new(),
            backup_sources: BackupSources::default(),
            submits: Script::default(),
            legacy_runs: Vec::new(),
            recent: Script::default(),
            run: Script::default(),
            progress: Script::default(),
            groups: Vec::new(),
            history: HashMap::new(),
            expiries: HashMap::new(),
            expiry_errors: Vec::new(),
            submitted: Vec::new(),
            canceled: Vec::new(),
            replications: Vec::new(),
            job_list_calls: 0,
            history_calls: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new(setup: impl FnOnce(&mut State)) -> Self {
        let mut state = State::default();
        setup(&mut state);
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

/// A run of group `job_id` started at `start`, as the v2 API reports it.
pub fn run(job_id: u64, start: i64, instance: u64, status: RunStatus) -> ProtectionRun {
    ProtectionRun {
        id: format!("{job_id}:{start}"),
        protection_group_instance_id: instance,
        local_backup_info: Some(BackupInfo {
            status,
            run_type: Some("kRegular".into()),
            start_time_usecs: Some(start),
            end_time_usecs: status.is_terminal().then_some(start + 60_000_000),
            messages: Vec::new(),
            progress_task_id: Some(format!("backup_{job_id}_{instance}")),
        }),
        original_backup_info: None,
        replication_info: None,
        objects: Vec::new(),
        is_local_snapshots_deleted: Some(false),
    }
}

pub fn with_objects(mut run: ProtectionRun, ids: &[u64]) -> ProtectionRun {
    run.objects = ids
        .iter()
        .map(|&id| RunObject {
            object: ObjectSummary { id, name: None },
        })
        .collect();
    run
}

pub fn with_replica(mut run: ProtectionRun, cluster: &str, status: RunStatus) -> ProtectionRun {
    run.replication_info
        .get_or_insert_with(ReplicationInfo::default)
        .replication_target_results
        .push(ReplicationTargetResult {
            cluster_name: Some(cluster.into()),
            status,
        });
    run
}

pub fn job(id: u64, name: &str, environment: &str) -> ProtectionJob {
    ProtectionJob {
        id,
        name: name.into(),
        environment: environment.into(),
        policy_id: "pol-1".into(),
        source_ids: Vec::new(),
        is_active: None,
    }
}

impl ClusterApi for FakeCluster {
    async fn cluster(&self) -> Result<ClusterInfo, ApiError> {
        Ok(self.state().cluster.clone())
    }

    async fn remote_clusters(&self) -> Result<Vec<RemoteCluster>, ApiError> {
        Ok(self.state().remotes.clone())
    }
}

impl RunApi for FakeCluster {
    async fn protection_jobs(&self) -> Result<Vec<ProtectionJob>, ApiError> {
        let mut state = self.state();
        state.job_list_calls += 1;
        state.jobs.next("protectionJobs")
    }

    async fn protection_policy(&self, _policy_id: &str) -> Result<Policy, ApiError> {
        Ok(self.state().policy.clone())
    }

    async fn protection_sources(&self, _environment: &str) -> Result<Vec<SourceNode>, ApiError> {
        Ok(self.state().sources.clone())
    }

    async fn backup_job(&self, _job_id: u64) -> Result<Vec<LegacyBackupJobEntry>, ApiError> {
        Ok(self.state().backup_job.clone())
    }

    async fn backup_sources(&self, _parent_source_id: u64) -> Result<BackupSources, ApiError> {
        Ok(self.state().backup_sources.clone())
    }

    async fn vaults(&self) -> Result<Vec<Vault>, ApiError> {
        Ok(self.state().vaults.clone())
    }

    async fn submit_run(
        &self,
        _job_id: u64,
        request: &RunRequest,
    ) -> Result<SubmitOutcome, ApiError> {
        let mut state = self.state();
        state.submitted.push(request.clone());
        state.submits.next("protectionJobs/run")
    }

    async fn job_runs(&self, _job_id: u64) -> Result<Vec<LegacyRun>, ApiError> {
        Ok(self.state().legacy_runs.clone())
    }

    async fn cancel_run(&self, _job_id: u64, job_run_id: u64) -> Result<(), ApiError> {
        self.state().canceled.push(job_run_id);
        Ok(())
    }

    async fn recent_runs(
        &self,
        _group_id: &str,
        _num_runs: u32,
        _include_objects: bool,
    ) -> Result<RunsPage, ApiError> {
        self.state().recent.next("runs")
    }

    async fn run(
        &self,
        _group_id: &str,
        _run_id: &str,
        _include_objects: bool,
    ) -> Result<ProtectionRun, ApiError> {
        self.state().run.next("run")
    }

    async fn progress(
        &self,
        _task_path: &str,
        _exclude_sub_tasks: bool,
    ) -> Result<ProgressMonitor, ApiError> {
        self.state().progress.next("progressMonitors")
    }
}

impl ReplicationApi for FakeCluster {
    async fn protection_groups(&self) -> Result<Vec<ProtectionGroup>, ApiError> {
        Ok(self.state().groups.clone())
    }

    async fn runs_before(
        &self,
        group_id: &str,
        num_runs: u32,
        end_time_usecs: i64,
    ) -> Result<RunsPage, ApiError> {
        let mut state = self.state();
        state.history_calls += 1;
        let mut runs: Vec<ProtectionRun> = state
            .history
            .get(group_id)
            .into_iter()
            .flatten()
            .filter(|r| r.start_time_usecs().is_some_and(|s| s <= end_time_usecs))
            .cloned()
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse(r.start_time_usecs()));
        runs.truncate(num_runs as usize);
        Ok(RunsPage { runs })
    }

    async fn run_expiry(
        &self,
        _job_id: u64,
        start_time_usecs: i64,
    ) -> Result<Option<i64>, ApiError> {
        let state = self.state();
        if state.expiry_errors.contains(&start_time_usecs) {
            return Err(ApiError::Status {
                path: "backupjobruns".into(),
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "unavailable".into(),
            });
        }
        Ok(state.expiries.get(&start_time_usecs).copied())
    }

    async fn submit_replication(&self, task: &ReplicationTask) -> Result<(), ApiError> {
        self.state().replications.push(task.clone());
        Ok(())
    }
}
