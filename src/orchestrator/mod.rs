//! Application-level orchestration.
//!
//! Each tool has one entry point here that takes a connected API and resolved
//! settings. The CLI layer owns argument parsing, connection and exit codes.

mod auditor;
mod backup_now;

pub use auditor::{is_replicated, Auditor};
pub use backup_now::{backup_now, BackupNowPlan};
