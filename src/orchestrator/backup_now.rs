//! Trigger one protection job run and follow it.

use tokio::time::sleep;
use tracing::debug;

use crate::config::{LifecycleConfig, JOB_LIST_ATTEMPTS, SETTLE_TIME};
use crate::engine::request::{build_run_request, ExplicitTargets, RequestOptions};
use crate::engine::resolve::{
    find_job, find_remote_cluster, find_vault, resolve_objects, ObjectSelection, SourceCatalog,
};
use crate::engine::{RunApi, RunLifecycle, RunOutcome, RunTarget};
use crate::error::RunError;
use crate::model::{BackupType, Environment, ProtectionJob};
use crate::output::Output;

/// Everything a run-now invocation needs once connected.
#[derive(Debug, Clone, Default)]
pub struct BackupNowPlan {
    pub job_name: String,
    pub object_names: Vec<String>,
    pub request: RequestOptions,
    pub lifecycle: LifecycleConfig,
}

/// Fetch the job list, retrying a few times before giving up.
async fn fetch_jobs<A: RunApi>(api: &A) -> Result<Vec<ProtectionJob>, RunError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match api.protection_jobs().await {
            Ok(jobs) => return Ok(jobs),
            Err(e) => {
                debug!(error = %e, attempt, "job list fetch failed");
                if attempt >= JOB_LIST_ATTEMPTS {
                    return Err(RunError::JobListTimeout);
                }
                sleep(SETTLE_TIME).await;
            }
        }
    }
}

async fn load_catalog<A: RunApi>(
    api: &A,
    job: &ProtectionJob,
    environment: &Environment,
) -> Result<SourceCatalog, RunError> {
    let mut catalog = SourceCatalog::default();
    if environment.is_database() {
        let backup_job = api
            .backup_job(job.id)
            .await?
            .into_iter()
            .next()
            .map(|entry| entry.backup_job);
        if let Some(backup_job) = &backup_job {
            catalog.backup_sources = Some(api.backup_sources(backup_job.parent_source.id).await?);
        }
        catalog.backup_job = backup_job;
    }
    catalog.sources = api.protection_sources(environment.source_filter()).await?;
    Ok(catalog)
}

async fn explicit_targets<A: RunApi>(
    api: &A,
    opts: &RequestOptions,
) -> Result<ExplicitTargets, RunError> {
    let mut targets = ExplicitTargets::default();
    if let Some(name) = &opts.replicate_to {
        let remotes = api.remote_clusters().await?;
        let remote = find_remote_cluster(&remotes, name)
            .ok_or_else(|| RunError::input(format!("Remote Cluster {name} not found!")))?;
        targets.replica = Some(remote.as_target());
    }
    if let Some(name) = &opts.archive_to {
        let vaults = api.vaults().await?;
        let vault = find_vault(&vaults, name)
            .ok_or_else(|| RunError::input(format!("Archive target {name} not found!")))?;
        targets.archive = Some(vault.as_target());
    }
    Ok(targets)
}

/// Resolve the job, build its run-now request and drive the run lifecycle.
pub async fn backup_now<A: RunApi>(
    api: &A,
    plan: &BackupNowPlan,
    out: &Output,
) -> Result<RunOutcome, RunError> {
    let cluster = api.cluster().await?;
    let jobs = fetch_jobs(api).await?;
    let job = find_job(&jobs, &plan.job_name)
        .ok_or_else(|| RunError::input(format!("Job '{}' not found", plan.job_name)))?;

    let environment = Environment::from_api(&job.environment);
    if plan.request.backup_type == BackupType::Log && !environment.is_database() {
        return Err(RunError::input(format!(
            "BackupType kLog not applicable to {} jobs",
            environment.as_api()
        )));
    }

    let selection = if plan.object_names.is_empty() {
        ObjectSelection::default()
    } else {
        let catalog = load_catalog(api, job, &environment).await?;
        resolve_objects(job, &environment, &plan.object_names, &catalog)?
    };

    plan.request.validate()?;
    let policy = api.protection_policy(&job.policy_id).await?;
    let explicit = explicit_targets(api, &plan.request).await?;
    let request = build_run_request(&policy, &selection, &plan.request, &explicit)?;
    debug!(payload = ?request, "run-now request");

    let target = RunTarget {
        job_id: job.id,
        job_name: job.name.clone(),
        group_id: cluster.group_id(job.id),
        selected_source: selection.selected.first().copied(),
    };
    RunLifecycle::new(api, &plan.lifecycle, out)
        .execute(&target, &request)
        .await
}
