//! Operator tools for a backup cluster's REST API: trigger a protection job
//! run and follow it to completion, or replicate old snapshots to a remote
//! cluster.

pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod retention;
pub mod text_summary;
