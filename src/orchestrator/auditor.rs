//! Replication audit: find runs that never reached the remote cluster and
//! queue replication tasks for them.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::clock::usecs_to_date;
use crate::config::AuditConfig;
use crate::engine::resolve::find_remote_cluster;
use crate::engine::ReplicationApi;
use crate::error::RunError;
use crate::model::{
    same_name, JobUid, ProtectionGroup, ProtectionRun, ReplicationTarget, ReplicationTask,
    RunStatus,
};
use crate::output::Output;
use crate::retention::replica_days;
use crate::text_summary::AuditSummary;

/// True when the run already has a replica on `cluster`, or one is under way.
/// With `resync`, a finished replica does not count.
pub fn is_replicated(run: &ProtectionRun, cluster: &str, resync: bool) -> bool {
    run.replication_results().iter().any(|result| {
        let to_cluster = result
            .cluster_name
            .as_deref()
            .is_some_and(|name| same_name(name, cluster));
        let counts = match result.status {
            RunStatus::Succeeded => !resync,
            RunStatus::Running | RunStatus::Accepted | RunStatus::Canceling => true,
            _ => false,
        };
        to_cluster && counts
    })
}

/// Runs whose local snapshot can still be replicated.
fn eligible(run: &ProtectionRun, exclude_logs: bool) -> bool {
    if run.is_local_snapshots_deleted == Some(true) {
        return false;
    }
    let Some(info) = run.backup_info() else {
        return false;
    };
    if info.end_time_usecs.is_none() {
        return false;
    }
    !(exclude_logs && info.run_type.as_deref() == Some("kLog"))
}

/// Groups to audit, in case-insensitive name order. Unknown names fail the
/// whole pass before anything is looked at.
fn select_groups(
    groups: Vec<ProtectionGroup>,
    names: &[String],
) -> Result<Vec<ProtectionGroup>, RunError> {
    let live: Vec<_> = groups
        .into_iter()
        .filter(|g| g.is_deleted != Some(true))
        .collect();
    let missing: Vec<&str> = names
        .iter()
        .filter(|n| !live.iter().any(|g| same_name(&g.name, n)))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(RunError::Failed(format!(
            "Jobs not found: {}",
            missing.join(", ")
        )));
    }
    let mut selected: Vec<_> = live
        .into_iter()
        .filter(|g| names.is_empty() || names.iter().any(|n| same_name(&g.name, n)))
        .collect();
    selected.sort_by_key(|g| g.name.to_lowercase());
    Ok(selected)
}

pub struct Auditor<'a, A> {
    api: &'a A,
    cfg: &'a AuditConfig,
    out: &'a Output,
}

impl<'a, A: ReplicationApi> Auditor<'a, A> {
    pub fn new(api: &'a A, cfg: &'a AuditConfig, out: &'a Output) -> Self {
        Self { api, cfg, out }
    }

    pub async fn run(&self) -> Result<AuditSummary, RunError> {
        let remotes = self.api.remote_clusters().await?;
        let remote = find_remote_cluster(&remotes, &self.cfg.remote_cluster)
            .ok_or_else(|| {
                RunError::input(format!("remote cluster {} not found", self.cfg.remote_cluster))
            })?
            .as_target();

        let groups = select_groups(self.api.protection_groups().await?, &self.cfg.job_names)?;
        let mut summary = AuditSummary {
            committed: self.cfg.commit,
            ..Default::default()
        };
        for group in &groups {
            self.audit_group(group, &remote, &mut summary).await?;
            summary.jobs += 1;
        }
        Ok(summary)
    }

    async fn audit_group(
        &self,
        group: &ProtectionGroup,
        remote: &ReplicationTarget,
        summary: &mut AuditSummary,
    ) -> Result<(), RunError> {
        self.out.say(group.name.clone());
        let Some(uid) = JobUid::parse(&group.id) else {
            warn!(group = %group.id, "unexpected protection group id, skipping");
            return Ok(());
        };

        let mut pending: BTreeMap<i64, ReplicationTask> = BTreeMap::new();
        let scanned = self
            .scan_history(group, uid, remote, summary, &mut pending)
            .await;

        // Announced replications are submitted even when the scan stopped early.
        if !pending.is_empty() {
            self.out.say("  Committing replications...");
        }
        for task in pending.values() {
            self.api.submit_replication(task).await?;
        }
        scanned
    }

    /// Walk the group's history newest page first, reporting each eligible
    /// run and queueing the ones to replicate into `pending`.
    async fn scan_history(
        &self,
        group: &ProtectionGroup,
        uid: JobUid,
        remote: &ReplicationTarget,
        summary: &mut AuditSummary,
        pending: &mut BTreeMap<i64, ReplicationTask>,
    ) -> Result<(), RunError> {
        let mut cursor = self.cfg.now_usecs;
        loop {
            let page = self
                .api
                .runs_before(&group.id, self.cfg.page_size, cursor)
                .await?;
            let Some(oldest) = page.runs.iter().filter_map(|r| r.start_time_usecs()).min() else {
                break;
            };
            debug!(group = %group.name, runs = page.runs.len(), cursor, "run page");

            let mut runs: Vec<_> = page
                .runs
                .iter()
                .filter(|r| eligible(r, self.cfg.exclude_logs))
                .filter_map(|r| Some((r.start_time_usecs()?, r)))
                .collect();
            runs.sort_by_key(|(start, _)| *start);

            for (start, run) in runs {
                let date = usecs_to_date(start);
                if is_replicated(run, &remote.cluster_name, self.cfg.resync) {
                    self.out.say(format!("  Already replicated  {date}"));
                    summary.already_replicated += 1;
                    continue;
                }

                let expiry = if self.cfg.keep_for > 0 {
                    None
                } else {
                    self.api.run_expiry(uid.id, start).await?
                };
                let Some(days) = replica_days(self.cfg.keep_for, expiry, self.cfg.now_usecs)
                else {
                    self.out.say(format!("  Skipping  {date}  (expiry unknown)"));
                    summary.skipped += 1;
                    continue;
                };

                summary.queued += 1;
                if self.cfg.commit {
                    self.out
                        .say(format!("  Replicating  {date}  for {days} days"));
                    pending.insert(
                        start,
                        ReplicationTask::single(uid, start, remote.clone(), days),
                    );
                } else {
                    self.out
                        .say(format!("  Would replicate  {date}  for {days} days"));
                }
            }

            if oldest - 1 >= cursor {
                break;
            }
            cursor = oldest - 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::USECS_PER_DAY;
    use crate::engine::fake::{run, with_replica, FakeCluster};
    use crate::model::{CopyRunTarget, RemoteCluster};
    use crate::output::drain;
    use pretty_assertions::assert_eq;

    const NOW: i64 = 1_700_000_000_000_000;
    const GROUP: &str = "1111:2222:7";

    fn group(id: &str, name: &str) -> ProtectionGroup {
        ProtectionGroup {
            id: id.into(),
            name: name.into(),
            is_deleted: None,
        }
    }

    fn config() -> AuditConfig {
        AuditConfig {
            remote_cluster: "DR".into(),
            job_names: vec![],
            keep_for: 0,
            commit: false,
            resync: false,
            exclude_logs: false,
            page_size: 2,
            now_usecs: NOW,
        }
    }

    fn cluster(history: Vec<ProtectionRun>) -> FakeCluster {
        FakeCluster::new(|s| {
            s.remotes = vec![RemoteCluster {
                cluster_id: 9,
                name: "DR".into(),
            }];
            s.groups = vec![group(GROUP, "SQL Daily")];
            s.history.insert(GROUP.into(), history);
        })
    }

    async fn audit(
        api: &FakeCluster,
        cfg: &AuditConfig,
    ) -> (Result<AuditSummary, RunError>, Vec<String>) {
        let (out, mut rx) = Output::pair();
        let result = Auditor::new(api, cfg, &out).run().await;
        (result, drain(&mut rx))
    }

    #[test]
    fn replication_status_classification() {
        let base = run(7, NOW, 1, RunStatus::Succeeded);
        assert!(!is_replicated(&base, "DR", false));

        let done = with_replica(base.clone(), "dr", RunStatus::Succeeded);
        assert!(is_replicated(&done, "DR", false));
        assert!(!is_replicated(&done, "DR", true));

        let running = with_replica(base.clone(), "DR", RunStatus::Running);
        assert!(is_replicated(&running, "DR", true));

        let failed = with_replica(base.clone(), "DR", RunStatus::Failed);
        assert!(!is_replicated(&failed, "DR", false));

        let elsewhere = with_replica(base, "Other", RunStatus::Succeeded);
        assert!(!is_replicated(&elsewhere, "DR", false));
    }

    #[tokio::test]
    async fn dry_run_reports_without_submitting() {
        let start = NOW - 10 * USECS_PER_DAY;
        let api = cluster(vec![run(7, start, 1, RunStatus::Succeeded)]);
        api.state().expiries.insert(start, NOW + 5 * USECS_PER_DAY);

        let (result, lines) = audit(&api, &config()).await;
        let summary = result.unwrap();
        assert_eq!(summary.queued, 1);
        assert_eq!(
            lines,
            vec![
                "SQL Daily".to_string(),
                format!("  Would replicate  {}  for 5 days", usecs_to_date(start)),
            ]
        );
        assert!(api.state().replications.is_empty());
    }

    #[tokio::test]
    async fn resync_requeues_succeeded_replicas() {
        let start = NOW - USECS_PER_DAY;
        let replicated = with_replica(
            run(7, start, 1, RunStatus::Succeeded),
            "DR",
            RunStatus::Succeeded,
        );
        let api = cluster(vec![replicated]);
        api.state().expiries.insert(start, NOW + 3 * USECS_PER_DAY);

        let (_, lines) = audit(&api, &config()).await;
        assert_eq!(lines[1], format!("  Already replicated  {}", usecs_to_date(start)));

        let cfg = AuditConfig {
            resync: true,
            ..config()
        };
        let (_, lines) = audit(&api, &cfg).await;
        assert_eq!(
            lines[1],
            format!("  Would replicate  {}  for 3 days", usecs_to_date(start))
        );
    }

    #[tokio::test]
    async fn commit_pages_backwards_and_submits_in_start_order() {
        let starts: Vec<i64> = (1..=5).map(|d| NOW - d * USECS_PER_DAY).collect();
        let mut history: Vec<_> = starts
            .iter()
            .enumerate()
            .map(|(i, &s)| run(7, s, 10 - i as u64, RunStatus::Succeeded))
            .collect();
        history[1] = with_replica(history[1].clone(), "DR", RunStatus::Accepted);
        let api = cluster(history);

        let cfg = AuditConfig {
            commit: true,
            keep_for: 14,
            ..config()
        };
        let (result, lines) = audit(&api, &cfg).await;
        let summary = result.unwrap();
        assert_eq!(summary.queued, 4);
        assert_eq!(summary.already_replicated, 1);
        assert_eq!(lines.last().unwrap(), "  Committing replications...");

        let state = api.state();
        // 5 runs at page size 2 take three pages, then an empty one.
        assert_eq!(state.history_calls, 4);
        let submitted: Vec<i64> = state
            .replications
            .iter()
            .map(|t| t.job_runs[0].run_start_time_usecs)
            .collect();
        assert_eq!(submitted, vec![starts[4], starts[3], starts[2], starts[0]]);

        let job_run = &state.replications[0].job_runs[0];
        assert_eq!(
            job_run.job_uid,
            JobUid {
                cluster_id: 1111,
                cluster_incarnation_id: 2222,
                id: 7
            }
        );
        assert_eq!(
            job_run.copy_run_targets,
            vec![CopyRunTarget::Remote {
                days_to_keep: 14,
                replication_target: ReplicationTarget {
                    cluster_id: 9,
                    cluster_name: "DR".into()
                }
            }]
        );
    }

    #[tokio::test]
    async fn ineligible_runs_are_ignored() {
        let mut deleted = run(7, NOW - 3 * USECS_PER_DAY, 3, RunStatus::Succeeded);
        deleted.is_local_snapshots_deleted = Some(true);
        let unfinished = run(7, NOW - 2 * USECS_PER_DAY, 4, RunStatus::Running);
        let mut log = run(7, NOW - USECS_PER_DAY, 5, RunStatus::Succeeded);
        if let Some(info) = log.local_backup_info.as_mut() {
            info.run_type = Some("kLog".into());
        }
        let api = cluster(vec![deleted, unfinished, log]);

        let cfg = AuditConfig {
            keep_for: 7,
            exclude_logs: true,
            ..config()
        };
        let (result, lines) = audit(&api, &cfg).await;
        assert_eq!(result.unwrap().queued, 0);
        assert_eq!(lines, vec!["SQL Daily"]);

        let cfg = AuditConfig {
            keep_for: 7,
            ..config()
        };
        let (result, _) = audit(&api, &cfg).await;
        assert_eq!(result.unwrap().queued, 1);
    }

    #[tokio::test]
    async fn unknown_expiry_is_skipped() {
        let start = NOW - USECS_PER_DAY;
        let api = cluster(vec![run(7, start, 1, RunStatus::Succeeded)]);
        let (result, lines) = audit(&api, &config()).await;
        assert_eq!(result.unwrap().skipped, 1);
        assert_eq!(
            lines[1],
            format!("  Skipping  {}  (expiry unknown)", usecs_to_date(start))
        );
    }

    #[tokio::test]
    async fn announced_replications_are_committed_before_a_lookup_error() {
        let first = NOW - 3 * USECS_PER_DAY;
        let second = NOW - 2 * USECS_PER_DAY;
        let api = cluster(vec![
            run(7, second, 2, RunStatus::Succeeded),
            run(7, first, 1, RunStatus::Succeeded),
        ]);
        {
            let mut state = api.state();
            state.expiries.insert(first, NOW + 10 * USECS_PER_DAY);
            state.expiry_errors.push(second);
        }
        let cfg = AuditConfig {
            commit: true,
            ..config()
        };
        let (result, lines) = audit(&api, &cfg).await;
        assert!(matches!(result, Err(RunError::Api(_))));
        assert_eq!(
            lines,
            vec![
                "SQL Daily".to_string(),
                format!("  Replicating  {}  for 10 days", usecs_to_date(first)),
                "  Committing replications...".to_string(),
            ]
        );
        let state = api.state();
        assert_eq!(state.replications.len(), 1);
        assert_eq!(state.replications[0].job_runs[0].run_start_time_usecs, first);
    }

    #[tokio::test]
    async fn job_selection() {
        let api = cluster(vec![]);
        {
            let mut s = api.state();
            s.groups.push(group("1111:2222:8", "alpha"));
            let mut gone = group("1111:2222:9", "Retired");
            gone.is_deleted = Some(true);
            s.groups.push(gone);
        }

        let (result, lines) = audit(&api, &config()).await;
        assert_eq!(result.unwrap().jobs, 2);
        assert_eq!(lines, vec!["alpha", "SQL Daily"]);

        let cfg = AuditConfig {
            job_names: vec!["sql daily".into(), "Retired".into(), "Nope".into()],
            ..config()
        };
        let (result, _) = audit(&api, &cfg).await;
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Jobs not found: Retired, Nope");
        assert_eq!(err.exit_code(true), 1);
    }

    #[tokio::test]
    async fn unknown_remote_cluster() {
        let api = cluster(vec![]);
        let cfg = AuditConfig {
            remote_cluster: "Elsewhere".into(),
            ..config()
        };
        let (result, _) = audit(&api, &cfg).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "remote cluster Elsewhere not found"
        );
    }
}
