//! `backup-now`: run a protection job now and optionally wait for it.

use super::{connect_with, init_tracing, ConnectArgs};
use crate::config::LifecycleConfig;
use crate::engine::request::RequestOptions;
use crate::engine::{ClusterClient, ConnectSettings, RunOutcome};
use crate::error::RunError;
use crate::model::BackupType;
use crate::orchestrator::{backup_now, BackupNowPlan};
use crate::output::{open_log, spawn_output_writer, Output};
use clap::Parser;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser, Clone, Serialize)]
#[command(
    name = "backup-now",
    version,
    about = "Run a protection job now and wait for it to finish"
)]
pub struct Cli {
    #[command(flatten)]
    #[serde(flatten)]
    pub connect: ConnectArgs,

    /// Secondary cluster address, tried when the primary is unreachable
    #[arg(long)]
    pub vip2: Option<String>,

    /// Connect through a multi-cluster manager
    #[arg(long)]
    pub mcm: bool,

    /// Cluster to address through the cluster manager
    #[arg(long)]
    pub cluster_name: Option<String>,

    /// Name of the protection job to run
    #[arg(long)]
    pub job_name: String,

    /// Job name to use when connected to --vip2
    #[arg(long)]
    pub job_name2: Option<String>,

    /// Only keep the local snapshot
    #[arg(long)]
    pub local_only: bool,

    /// Skip the policy's replicas
    #[arg(long)]
    pub no_replica: bool,

    /// Skip the policy's archives
    #[arg(long)]
    pub no_archive: bool,

    /// Days to keep the local snapshot (defaults to the policy)
    #[arg(long)]
    pub keep_local_for: Option<u32>,

    /// Replicate to this remote cluster instead of the policy's replicas
    #[arg(long)]
    pub replicate_to: Option<String>,

    /// Days to keep the replica
    #[arg(long)]
    pub keep_replica_for: Option<u32>,

    /// Archive to this external target instead of the policy's archives
    #[arg(long)]
    pub archive_to: Option<String>,

    /// Days to keep the archive
    #[arg(long)]
    pub keep_archive_for: Option<u32>,

    /// Wait for the run to finish and report its status
    #[arg(long, visible_alias = "enable")]
    pub wait: bool,

    /// Report percent complete while waiting (implies --wait)
    #[arg(long)]
    pub progress: bool,

    /// Run type: kRegular, kFull or kLog (database jobs only)
    #[arg(long, value_enum, default_value = "kRegular")]
    pub backup_type: BackupType,

    /// Object to include in the run; server[/instance[/db]] for database jobs
    #[arg(long = "object-name")]
    pub object_names: Vec<String>,

    /// Metadata file path for physical file-based jobs
    #[arg(long)]
    pub metadata_file: Option<String>,

    /// Exit instead of waiting when the job is already running
    #[arg(long)]
    pub abort_if_running: bool,

    /// Append a timestamped copy of all output to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// How long to wait for an already running run to finish
    #[arg(long, default_value = "60m", value_parser = humantime::parse_duration)]
    #[serde(with = "humantime_serde")]
    pub wait_if_running: Duration,

    /// Cancel in-flight runs older than this while waiting
    #[arg(long, value_parser = humantime::parse_duration)]
    #[serde(with = "humantime_serde")]
    pub cancel_previous_after: Option<Duration>,

    /// How long a new run may take to appear (at least 12m)
    #[arg(long, default_value = "30m", value_parser = humantime::parse_duration)]
    #[serde(with = "humantime_serde")]
    pub new_run_timeout: Duration,

    /// Interval between status polls (at least 30s)
    #[arg(long, default_value = "2m", value_parser = humantime::parse_duration)]
    #[serde(with = "humantime_serde")]
    pub sleep_time: Duration,

    /// Succeed as soon as every object's log contains this string (implies --wait)
    #[arg(long)]
    pub exit_string: Option<String>,

    /// How long to wait for --exit-string
    #[arg(long, default_value = "2m", value_parser = humantime::parse_duration)]
    #[serde(with = "humantime_serde")]
    pub exit_string_timeout: Duration,

    /// Consecutive failed status polls tolerated
    #[arg(long, default_value_t = 10)]
    pub status_retries: u32,

    /// Use distinct exit codes per failure class
    #[arg(long)]
    pub extended_error_codes: bool,

    /// Verbose diagnostics on stderr
    #[arg(long)]
    pub debug: bool,
}

/// Build the run plan from CLI arguments.
pub fn build_config(args: &Cli) -> BackupNowPlan {
    BackupNowPlan {
        job_name: args.job_name.clone(),
        object_names: args.object_names.clone(),
        request: RequestOptions {
            backup_type: args.backup_type,
            keep_local_for: args.keep_local_for,
            local_only: args.local_only,
            no_replica: args.no_replica,
            no_archive: args.no_archive,
            replicate_to: args.replicate_to.clone(),
            keep_replica_for: args.keep_replica_for,
            archive_to: args.archive_to.clone(),
            keep_archive_for: args.keep_archive_for,
            metadata_file: args.metadata_file.clone(),
        },
        lifecycle: LifecycleConfig {
            wait: args.wait,
            abort_if_running: args.abort_if_running,
            wait_if_running: args.wait_if_running,
            cancel_previous_after: args.cancel_previous_after,
            new_run_timeout: args.new_run_timeout,
            sleep_time: args.sleep_time,
            status_retries: args.status_retries,
            progress: args.progress,
            exit_string: args.exit_string.clone(),
            exit_string_timeout: args.exit_string_timeout,
            ..LifecycleConfig::default()
        }
        .normalized(),
    }
}

fn connect_settings(args: &Cli) -> ConnectSettings {
    let mut settings = args.connect.settings();
    settings.mcm |= args.mcm;
    settings.cluster_name = args.cluster_name.clone();
    settings
}

/// Connect and build the plan. After falling back to `--vip2` the job is
/// looked up by `--job-name2` when given.
async fn connect_plan<C, F, Fut>(
    args: &Cli,
    out: &Output,
    connector: F,
) -> Result<(C, BackupNowPlan), RunError>
where
    F: Fn(ConnectSettings) -> Fut,
    Fut: Future<Output = Result<C, RunError>>,
{
    let (client, fell_back) =
        connect_with(&connect_settings(args), args.vip2.as_deref(), out, connector).await?;
    let mut plan = build_config(args);
    if fell_back {
        if let Some(name) = &args.job_name2 {
            plan.job_name = name.clone();
        }
    }
    Ok((client, plan))
}

async fn execute(args: &Cli, out: &Output) -> Result<RunOutcome, RunError> {
    let (client, plan) = connect_plan(args, out, |s| async move {
        ClusterClient::connect(&s).await
    })
    .await?;
    backup_now(&client, &plan, out).await
}

/// Run the tool and return the process exit code.
pub async fn run(args: Cli) -> i32 {
    init_tracing(args.debug);
    let log = match args.log_file.as_deref().map(|p| open_log(p, &args)).transpose() {
        Ok(log) => log,
        Err(e) => {
            eprintln!("{e:#}");
            return 1;
        }
    };
    let (out, writer) = spawn_output_writer(log);

    let code = match execute(&args, &out).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            out.say(e.to_string());
            e.exit_code(args.extended_error_codes)
        }
    };

    drop(out);
    let _ = writer.await;
    code
}
