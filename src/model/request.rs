//! Payloads the tools submit: run-now requests and replication tasks.

use super::job::{ArchivalTarget, ReplicationTarget};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
pub enum BackupType {
    #[default]
    #[serde(rename = "kRegular")]
    #[value(name = "kRegular")]
    Regular,
    #[serde(rename = "kFull")]
    #[value(name = "kFull")]
    Full,
    #[serde(rename = "kLog")]
    #[value(name = "kLog")]
    Log,
}

/// Body of `POST protectionJobs/run/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub copy_run_targets: Vec<CopyRunTarget>,
    pub source_ids: Vec<u64>,
    pub run_type: BackupType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub run_now_parameters: Vec<RunNowParameter>,
}

/// Where one copy of the run is kept, and for how long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum CopyRunTarget {
    #[serde(rename = "kLocal")]
    Local { days_to_keep: u32 },
    #[serde(rename = "kRemote")]
    Remote {
        days_to_keep: u32,
        replication_target: ReplicationTarget,
    },
    #[serde(rename = "kArchival")]
    Archival {
        days_to_keep: u32,
        archival_target: ArchivalTarget,
    },
}

/// Identity of a copy target's destination, used to keep one entry per
/// destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Local,
    Cluster(u64),
    Vault(u64),
}

impl CopyRunTarget {
    pub fn destination(&self) -> Destination {
        match self {
            CopyRunTarget::Local { .. } => Destination::Local,
            CopyRunTarget::Remote {
                replication_target, ..
            } => Destination::Cluster(replication_target.cluster_id),
            CopyRunTarget::Archival {
                archival_target, ..
            } => Destination::Vault(archival_target.vault_id),
        }
    }

    pub fn days_to_keep(&self) -> u32 {
        match self {
            CopyRunTarget::Local { days_to_keep }
            | CopyRunTarget::Remote { days_to_keep, .. }
            | CopyRunTarget::Archival { days_to_keep, .. } => *days_to_keep,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunNowParameter {
    pub source_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_ids: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_params: Option<PhysicalParams>,
}

impl RunNowParameter {
    pub fn source(source_id: u64) -> Self {
        Self {
            source_id,
            database_ids: None,
            physical_params: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalParams {
    pub metadata_file_path: String,
}

/// Body of `PUT protectionRuns`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationTask {
    pub job_runs: Vec<ReplicationJobRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationJobRun {
    pub copy_run_targets: Vec<CopyRunTarget>,
    pub run_start_time_usecs: i64,
    pub job_uid: JobUid,
}

impl ReplicationTask {
    /// Replicate one existing run to `target`, keeping it `days_to_keep` days.
    pub fn single(
        job_uid: JobUid,
        run_start_time_usecs: i64,
        target: ReplicationTarget,
        days_to_keep: u32,
    ) -> Self {
        Self {
            job_runs: vec![ReplicationJobRun {
                copy_run_targets: vec![CopyRunTarget::Remote {
                    days_to_keep,
                    replication_target: target,
                }],
                run_start_time_usecs,
                job_uid,
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUid {
    pub cluster_id: u64,
    pub cluster_incarnation_id: u64,
    pub id: u64,
}

impl JobUid {
    /// Split a v2 group id (`clusterId:incarnationId:jobId`).
    pub fn parse(group_id: &str) -> Option<Self> {
        let mut parts = group_id.split(':').map(|p| p.parse::<u64>().ok());
        let uid = JobUid {
            cluster_id: parts.next()??,
            cluster_incarnation_id: parts.next()??,
            id: parts.next()??,
        };
        match parts.next() {
            None => Some(uid),
            Some(_) => None,
        }
    }
}
