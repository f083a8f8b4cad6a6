//! Wire and domain types for the cluster REST API.

mod job;
mod request;
mod run;
mod source;

pub use job::{
    same_name, ArchivalCopyPolicy, ArchivalTarget, ClusterInfo, Environment, Policy,
    ProtectionGroup, ProtectionGroups, ProtectionJob, RemoteCluster, ReplicationCopyPolicy,
    ReplicationTarget, Vault,
};
pub use request::{
    BackupType, CopyRunTarget, Destination, JobUid, PhysicalParams, ReplicationJobRun,
    ReplicationTask, RunNowParameter, RunRequest,
};
pub use run::{
    first_expiry_usecs, BackupInfo, BackupJobRunsEntry, LegacyBackupRun, LegacyRun,
    LegacyRunStats, ObjectSummary, ProgressEvent, ProgressMonitor, ProgressTask, ProtectionRun,
    ReplicationInfo, ReplicationTargetResult, ResultGroup, RunObject, RunStatus, RunsPage,
    TaskProgress, UnknownStatus,
};
pub use source::{
    BackupSourceParams, BackupSources, Entity, EntityHierarchy, EntityNode, EntityRef,
    LegacyBackupJob, LegacyBackupJobEntry, SourceInfo, SourceNode,
};
