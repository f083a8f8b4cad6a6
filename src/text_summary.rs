//! Text summary builder for CLI output.
//!
//! Formats the closing lines of a finished run and of a replication audit.

use crate::model::{BackupInfo, RunStatus};

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

/// Closing lines of a run that reached a terminal status. Failed and warning
/// outcomes carry the cluster's first message.
pub fn build_run_summary(info: &BackupInfo) -> TextSummary {
    let mut lines = vec![format!("Job finished with status: {}", info.status)];
    let first = info.messages.first().map(String::as_str).unwrap_or("");
    match info.status {
        RunStatus::Failed => lines.push(format!("Error: {first}")),
        RunStatus::SucceededWithWarning => lines.push(format!("Warning: {first}")),
        _ => {}
    }
    TextSummary { lines }
}

/// Totals of one audit pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditSummary {
    pub jobs: usize,
    pub already_replicated: usize,
    pub queued: usize,
    pub skipped: usize,
    pub committed: bool,
}

pub fn build_audit_summary(summary: &AuditSummary) -> TextSummary {
    let action = if summary.committed {
        "replicated"
    } else {
        "to replicate"
    };
    let mut lines = vec![format!(
        "{} jobs: {} runs {action}, {} already replicated",
        summary.jobs, summary.queued, summary.already_replicated
    )];
    if summary.skipped > 0 {
        lines.push(format!("{} runs skipped (expiry unknown)", summary.skipped));
    }
    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn info(status: RunStatus, messages: &[&str]) -> BackupInfo {
        BackupInfo {
            status,
            run_type: None,
            start_time_usecs: None,
            end_time_usecs: None,
            messages: messages.iter().map(|m| m.to_string()).collect(),
            progress_task_id: None,
        }
    }

    #[test]
    fn failed_run_reports_first_message() {
        let summary = build_run_summary(&info(RunStatus::Failed, &["disk full", "retry"]));
        assert_eq!(
            summary.lines,
            vec!["Job finished with status: Failed", "Error: disk full"]
        );
    }

    #[test]
    fn warning_and_success() {
        let summary = build_run_summary(&info(RunStatus::SucceededWithWarning, &["slow"]));
        assert_eq!(summary.lines[1], "Warning: slow");
        let summary = build_run_summary(&info(RunStatus::Succeeded, &[]));
        assert_eq!(summary.lines, vec!["Job finished with status: Succeeded"]);
    }

    #[test]
    fn audit_totals() {
        let summary = build_audit_summary(&AuditSummary {
            jobs: 2,
            already_replicated: 3,
            queued: 1,
            skipped: 1,
            committed: false,
        });
        assert_eq!(
            summary.lines,
            vec![
                "2 jobs: 1 runs to replicate, 3 already replicated",
                "1 runs skipped (expiry unknown)"
            ]
        );
    }
}
