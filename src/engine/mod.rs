//! Cluster access and the run-now engine.
//!
//! `api` defines the REST operations, `client` implements them over HTTP, and
//! the remaining modules hold the logic that drives a job run.

pub mod api;
pub mod client;
pub mod lifecycle;
pub mod monitor;
pub mod request;
pub mod resolve;

#[cfg(test)]
pub(crate) mod fake;

pub use api::{ClusterApi, ReplicationApi, RunApi, SubmitOutcome};
pub use client::{ClusterClient, ConnectSettings};
pub use lifecycle::{RunLifecycle, RunOutcome, RunTarget};
