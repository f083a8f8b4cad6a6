//! `replicate-old-snapshots`: replicate existing snapshots that never made it
//! to a remote cluster.

use super::{connect, init_tracing, ConnectArgs};
use crate::clock;
use crate::config::AuditConfig;
use crate::error::RunError;
use crate::orchestrator::Auditor;
use crate::output::{open_log, spawn_output_writer, Output};
use crate::text_summary::build_audit_summary;
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser, Clone, Serialize)]
#[command(
    name = "replicate-old-snapshots",
    version,
    about = "Replicate existing snapshots to a remote cluster"
)]
pub struct Cli {
    #[command(flatten)]
    #[serde(flatten)]
    pub connect: ConnectArgs,

    /// Remote cluster to replicate to
    #[arg(long)]
    pub remote_cluster: String,

    /// Job to audit (repeatable; default is every job)
    #[arg(long = "job-name")]
    pub job_names: Vec<String>,

    /// File with one job name per line
    #[arg(long)]
    pub job_list: Option<PathBuf>,

    /// Days to keep the replicas (0 keeps them as long as the originals)
    #[arg(long, default_value_t = 0)]
    pub keep_for: u32,

    /// Create the replication tasks (default is a dry run)
    #[arg(long)]
    pub commit: bool,

    /// Replicate again even where a replica already succeeded
    #[arg(long)]
    pub resync: bool,

    /// Leave log backups alone
    #[arg(long)]
    pub exclude_logs: bool,

    /// Runs per history page
    #[arg(long, default_value_t = 1000)]
    pub num_runs: u32,

    /// Append a timestamped copy of all output to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Use distinct exit codes per failure class
    #[arg(long)]
    pub extended_error_codes: bool,

    /// Verbose diagnostics on stderr
    #[arg(long)]
    pub debug: bool,
}

/// Job names from the command line followed by those in the list file.
/// Blank lines are skipped.
pub fn gather_job_names(names: &[String], list: Option<&Path>) -> Result<Vec<String>> {
    let mut all = names.to_vec();
    if let Some(path) = list {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read job list {}", path.display()))?;
        all.extend(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from),
        );
    }
    Ok(all)
}

/// Build an `AuditConfig` from CLI arguments.
pub fn build_config(args: &Cli, job_names: Vec<String>) -> AuditConfig {
    AuditConfig {
        remote_cluster: args.remote_cluster.clone(),
        job_names,
        keep_for: args.keep_for,
        commit: args.commit,
        resync: args.resync,
        exclude_logs: args.exclude_logs,
        page_size: args.num_runs.max(1),
        now_usecs: clock::now_usecs(),
    }
}

async fn execute(args: &Cli, out: &Output) -> Result<(), RunError> {
    let job_names = gather_job_names(&args.job_names, args.job_list.as_deref())
        .map_err(|e| RunError::input(format!("{e:#}")))?;
    let (client, _) = connect(&args.connect.settings(), None, out).await?;

    let cfg = build_config(args, job_names);
    let summary = Auditor::new(&client, &cfg, out).run().await?;
    for line in build_audit_summary(&summary).lines {
        out.note(line);
    }
    Ok(())
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
        Ok(()) => 0,
        Err(e) => {
            out.say(e.to_string());
            e.exit_code(args.extended_error_codes)
        }
    };

    drop(out);
    let _ = writer.await;
    code
}
