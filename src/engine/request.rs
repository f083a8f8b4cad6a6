//! Run-now request construction.

use super::resolve::ObjectSelection;
use crate::error::RunError;
use crate::model::{
    ArchivalTarget, BackupType, CopyRunTarget, PhysicalParams, Policy, ReplicationTarget,
    RunNowParameter, RunRequest,
};

/// Retention and copy-target flags of a run-now invocation.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub backup_type: BackupType,
    pub keep_local_for: Option<u32>,
    pub local_only: bool,
    pub no_replica: bool,
    pub no_archive: bool,
    pub replicate_to: Option<String>,
    pub keep_replica_for: Option<u32>,
    pub archive_to: Option<String>,
    pub keep_archive_for: Option<u32>,
    pub metadata_file: Option<String>,
}

impl RequestOptions {
    /// Explicit copy targets need an explicit retention.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.replicate_to.is_some() && self.keep_replica_for.is_none() {
            return Err(RunError::input("--keep-replica-for is required"));
        }
        if self.archive_to.is_some() && self.keep_archive_for.is_none() {
            return Err(RunError::input("--keep-archive-for is required"));
        }
        Ok(())
    }
}

/// Copy targets named on the command line, resolved to their destinations.
#[derive(Debug, Clone, Default)]
pub struct ExplicitTargets {
    pub replica: Option<ReplicationTarget>,
    pub archive: Option<ArchivalTarget>,
}

fn push_target(targets: &mut Vec<CopyRunTarget>, target: CopyRunTarget) {
    if targets.iter().all(|t| t.destination() != target.destination()) {
        targets.push(target);
    }
}

/// Build the run-now request from the job's policy and the operator's flags.
///
/// Policy copy targets are added unless suppressed or replaced by an explicit
/// target of the same kind. Each destination appears at most once.
pub fn build_run_request(
    policy: &Policy,
    selection: &ObjectSelection,
    opts: &RequestOptions,
    explicit: &ExplicitTargets,
) -> Result<RunRequest, RunError> {
    opts.validate()?;

    let local_days = opts
        .keep_local_for
        .or(policy.days_to_keep)
        .ok_or_else(|| RunError::input("policy has no local retention, use --keep-local-for"))?;
    let mut targets = vec![CopyRunTarget::Local {
        days_to_keep: local_days,
    }];

    if !opts.local_only && !opts.no_replica && opts.replicate_to.is_none() {
        for replica in &policy.snapshot_replication_copy_policies {
            push_target(
                &mut targets,
                CopyRunTarget::Remote {
                    days_to_keep: opts.keep_replica_for.unwrap_or(replica.days_to_keep),
                    replication_target: replica.target.clone(),
                },
            );
        }
    }

    if !opts.local_only && !opts.no_archive && opts.archive_to.is_none() {
        for archive in &policy.snapshot_archival_copy_policies {
            push_target(
                &mut targets,
                CopyRunTarget::Archival {
                    days_to_keep: opts.keep_archive_for.unwrap_or(archive.days_to_keep),
                    archival_target: archive.target.clone(),
                },
            );
        }
    }

    if let (Some(target), Some(days)) = (&explicit.replica, opts.keep_replica_for) {
        push_target(
            &mut targets,
            CopyRunTarget::Remote {
                days_to_keep: days,
                replication_target: target.clone(),
            },
        );
    }
    if let (Some(target), Some(days)) = (&explicit.archive, opts.keep_archive_for) {
        push_target(
            &mut targets,
            CopyRunTarget::Archival {
                days_to_keep: days,
                archival_target: target.clone(),
            },
        );
    }

    let mut request = RunRequest {
        copy_run_targets: targets,
        source_ids: Vec::new(),
        run_type: opts.backup_type,
        run_now_parameters: Vec::new(),
    };

    match &opts.metadata_file {
        Some(path) => {
            request.run_now_parameters = selection
                .source_ids
                .iter()
                .map(|&source_id| RunNowParameter {
                    physical_params: Some(PhysicalParams {
                        metadata_file_path: path.clone(),
                    }),
                    ..RunNowParameter::source(source_id)
                })
                .collect();
        }
        None => request.source_ids = selection.source_ids.clone(),
    }
    if !selection.run_now_parameters.is_empty() {
        request.run_now_parameters = selection.run_now_parameters.clone();
    }

    Ok(request)
}
