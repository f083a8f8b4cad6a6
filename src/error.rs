//! Error types shared by both tools.
//!
//! [`ApiError`] describes a failed REST call. [`RunError`] is the taxonomy the
//! binaries map onto process exit codes.

use reqwest::StatusCode;
use thiserror::Error;

/// A REST call that did not produce the expected payload.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{path} returned {status}: {body}")]
    Status {
        path: String,
        status: StatusCode,
        body: String,
    },
    #[error("could not decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} response is missing {field}")]
    Missing { path: String, field: &'static str },
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("invalid request url {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn missing(path: impl Into<String>, field: &'static str) -> Self {
        ApiError::Missing {
            path: path.into(),
            field,
        }
    }
}

/// Failure classes of a tool invocation.
#[derive(Debug, Error)]
pub enum RunError {
    /// Authentication or connectivity to the cluster failed.
    #[error("{0}")]
    Connection(String),
    /// Unknown names, missing companion flags and other operator mistakes.
    #[error("{0}")]
    Input(String),
    #[error("Timed out waiting for existing run")]
    ExistingRunTimeout,
    #[error("Timed out waiting for status update")]
    StatusTimeout,
    #[error("Timed out waiting for new run to appear")]
    NewRunTimeout,
    #[error("Timed out getting job!")]
    JobListTimeout,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{0}")]
    Failed(String),
}

impl RunError {
    pub fn input(msg: impl Into<String>) -> Self {
        RunError::Input(msg.into())
    }

    /// Process exit code for this failure. Without extended codes every
    /// failure collapses to 1.
    pub fn exit_code(&self, extended: bool) -> i32 {
        if !extended {
            return 1;
        }
        match self {
            RunError::Connection(_) => 2,
            RunError::Input(_) => 3,
            RunError::ExistingRunTimeout => 4,
            RunError::StatusTimeout => 5,
            RunError::NewRunTimeout => 6,
            RunError::JobListTimeout => 7,
            RunError::Api(ApiError::Unauthorized(_)) => 2,
            RunError::Api(_) | RunError::Failed(_) => 1,
        }
    }
}
