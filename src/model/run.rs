//! Run history payloads: v2 protection group runs, legacy v1 runs, progress
//! monitors and copy-run expiry lookups.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Status of a run or of one of its copy tasks.
///
/// The cluster reports v2 names (`Succeeded`), legacy v1 names (`kSuccess`)
/// and, on older releases, the numeric v1 codes. All three spellings parse
/// into the same variant. Anything else is rejected rather than guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "RawStatus")]
pub enum RunStatus {
    Accepted,
    Running,
    Canceling,
    Paused,
    OnHold,
    Finalizing,
    Canceled,
    Succeeded,
    SucceededWithWarning,
    Failed,
    Missed,
    Skipped,
}

impl RunStatus {
    pub const ALL: [RunStatus; 12] = [
        RunStatus::Accepted,
        RunStatus::Running,
        RunStatus::Canceling,
        RunStatus::Paused,
        RunStatus::OnHold,
        RunStatus::Finalizing,
        RunStatus::Canceled,
        RunStatus::Succeeded,
        RunStatus::SucceededWithWarning,
        RunStatus::Failed,
        RunStatus::Missed,
        RunStatus::Skipped,
    ];

    /// No further state change happens once a run reports a terminal status.
    pub fn is_terminal(self) -> bool {
        match self {
            RunStatus::Canceled
            | RunStatus::Succeeded
            | RunStatus::SucceededWithWarning
            | RunStatus::Failed
            | RunStatus::Missed
            | RunStatus::Skipped => true,
            RunStatus::Accepted
            | RunStatus::Running
            | RunStatus::Canceling
            | RunStatus::Paused
            | RunStatus::OnHold
            | RunStatus::Finalizing => false,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::SucceededWithWarning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Accepted => "Accepted",
            RunStatus::Running => "Running",
            RunStatus::Canceling => "Canceling",
            RunStatus::Paused => "Paused",
            RunStatus::OnHold => "OnHold",
            RunStatus::Finalizing => "Finalizing",
            RunStatus::Canceled => "Canceled",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::SucceededWithWarning => "SucceededWithWarning",
            RunStatus::Failed => "Failed",
            RunStatus::Missed => "Missed",
            RunStatus::Skipped => "Skipped",
        }
    }

    /// Legacy v1 numeric status codes.
    fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            0 => RunStatus::Accepted,
            1 => RunStatus::Running,
            2 => RunStatus::Canceling,
            3 => RunStatus::Canceled,
            4 => RunStatus::Succeeded,
            5 => RunStatus::Failed,
            6 => RunStatus::SucceededWithWarning,
            7 => RunStatus::OnHold,
            8 => RunStatus::Missed,
            9 => RunStatus::Finalizing,
            _ => return None,
        })
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown run status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for RunStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u64>() {
            return RunStatus::from_code(code).ok_or_else(|| UnknownStatus(s.to_string()));
        }
        let status = match s {
            "Accepted" | "kAccepted" => RunStatus::Accepted,
            "Running" | "kRunning" => RunStatus::Running,
            "Canceling" | "kCanceling" => RunStatus::Canceling,
            "Paused" | "kPaused" => RunStatus::Paused,
            "OnHold" | "kOnHold" => RunStatus::OnHold,
            "Finalizing" | "kFinalizing" => RunStatus::Finalizing,
            "Canceled" | "kCanceled" => RunStatus::Canceled,
            "Succeeded" | "kSuccess" => RunStatus::Succeeded,
            "SucceededWithWarning" | "kWarning" => RunStatus::SucceededWithWarning,
            "Failed" | "kFailure" => RunStatus::Failed,
            "Missed" | "kMissed" => RunStatus::Missed,
            "Skipped" | "kSkipped" => RunStatus::Skipped,
            other => return Err(UnknownStatus(other.to_string())),
        };
        Ok(status)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStatus {
    Text(String),
    Code(u64),
}

impl TryFrom<RawStatus> for RunStatus {
    type Error = UnknownStatus;

    fn try_from(raw: RawStatus) -> Result<Self, Self::Error> {
        match raw {
            RawStatus::Text(s) => s.parse(),
            RawStatus::Code(c) => {
                RunStatus::from_code(c).ok_or_else(|| UnknownStatus(c.to_string()))
            }
        }
    }
}

/// One page of v2 run history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunsPage {
    #[serde(default)]
    pub runs: Vec<ProtectionRun>,
}

/// A v2 protection group run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionRun {
    /// `<jobId>:<startTimeUsecs>`
    pub id: String,
    #[serde(default)]
    pub protection_group_instance_id: u64,
    #[serde(default)]
    pub local_backup_info: Option<BackupInfo>,
    #[serde(default)]
    pub original_backup_info: Option<BackupInfo>,
    #[serde(default)]
    pub replication_info: Option<ReplicationInfo>,
    #[serde(default)]
    pub objects: Vec<RunObject>,
    #[serde(default)]
    pub is_local_snapshots_deleted: Option<bool>,
}

impl ProtectionRun {
    /// Start time encoded in the run id.
    pub fn start_time_usecs(&self) -> Option<i64> {
        self.id.split(':').nth(1)?.parse().ok()
    }

    /// Local backup details, falling back to the original backup for runs
    /// received through replication.
    pub fn backup_info(&self) -> Option<&BackupInfo> {
        self.local_backup_info
            .as_ref()
            .or(self.original_backup_info.as_ref())
    }

    pub fn protects(&self, object_id: u64) -> bool {
        self.objects.iter().any(|o| o.object.id == object_id)
    }

    pub fn replication_results(&self) -> &[ReplicationTargetResult] {
        self.replication_info
            .as_ref()
            .map(|r| r.replication_target_results.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub status: RunStatus,
    #[serde(default)]
    pub run_type: Option<String>,
    #[serde(default)]
    pub start_time_usecs: Option<i64>,
    #[serde(default)]
    pub end_time_usecs: Option<i64>,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub progress_task_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunObject {
    pub object: ObjectSummary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectSummary {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationInfo {
    #[serde(default)]
    pub replication_target_results: Vec<ReplicationTargetResult>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationTargetResult {
    #[serde(default)]
    pub cluster_name: Option<String>,
    pub status: RunStatus,
}

/// Legacy v1 `protectionRuns` entry, used to find stale in-flight runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRun {
    #[serde(default)]
    pub backup_run: Option<LegacyBackupRun>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBackupRun {
    pub job_run_id: u64,
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub stats: Option<LegacyRunStats>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRunStats {
    #[serde(default)]
    pub start_time_usecs: Option<i64>,
}

/// Response of the progress monitor endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMonitor {
    #[serde(default)]
    pub result_group_vec: Vec<ResultGroup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultGroup {
    #[serde(default)]
    pub task_vec: Vec<ProgressTask>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressTask {
    #[serde(default)]
    pub task_path: String,
    #[serde(default)]
    pub progress: Option<TaskProgress>,
    #[serde(default)]
    pub sub_task_vec: Vec<ProgressTask>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    #[serde(default)]
    pub percent_finished: f64,
    #[serde(default)]
    pub event_vec: Vec<ProgressEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(default)]
    pub event_msg: String,
}

impl ProgressMonitor {
    fn root_task(&self) -> Option<&ProgressTask> {
        self.result_group_vec.first()?.task_vec.first()
    }

    pub fn percent_finished(&self) -> Option<f64> {
        Some(self.root_task()?.progress.as_ref()?.percent_finished)
    }

    pub fn sub_tasks(&self) -> &[ProgressTask] {
        self.root_task()
            .map(|t| t.sub_task_vec.as_slice())
            .unwrap_or_default()
    }
}

impl ProgressTask {
    pub fn event_messages(&self) -> impl Iterator<Item = &str> {
        self.progress
            .iter()
            .flat_map(|p| p.event_vec.iter())
            .map(|e| e.event_msg.as_str())
    }
}

/// Legacy `backupjobruns` lookup, used for the expiry of a local snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupJobRunsEntry {
    pub backup_job_runs: BackupJobRuns,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupJobRuns {
    #[serde(default)]
    pub protection_runs: Vec<CopyRunHolder>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRunHolder {
    pub copy_run: CopyRun,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRun {
    #[serde(default)]
    pub finished_tasks: Vec<FinishedCopyTask>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedCopyTask {
    #[serde(default)]
    pub expiry_time_usecs: Option<i64>,
}

/// Expiry of the first finished copy task of the first matching run.
pub fn first_expiry_usecs(entries: &[BackupJobRunsEntry]) -> Option<i64> {
    entries
        .first()?
        .backup_job_runs
        .protection_runs
        .first()?
        .copy_run
        .finished_tasks
        .first()?
        .expiry_time_usecs
}
