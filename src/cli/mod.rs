//! Command-line front ends of the two tools.

pub mod backup_now;
pub mod replicate;

use crate::engine::{ClusterClient, ConnectSettings};
use crate::error::RunError;
use crate::model::same_name;
use crate::output::Output;
use clap::Args;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Address of the cluster manager SaaS endpoint; connecting to it implies
/// cluster selection.
const HELIOS_VIP: &str = "helios.cohesity.com";

/// Connection flags shared by both tools.
#[derive(Debug, Clone, Args, Serialize)]
pub struct ConnectArgs {
    /// Cluster (or cluster manager) address
    #[arg(long)]
    pub vip: String,

    /// Username to authenticate as
    #[arg(long, default_value = "admin")]
    pub username: String,

    /// Authentication domain
    #[arg(long, default_value = "local")]
    pub domain: String,

    /// Password, or the API key with --use-api-key
    #[arg(long, env = "BACKUP_API_PASSWORD", hide_env_values = true)]
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Authenticate with an API key instead of a session token
    #[arg(long)]
    pub use_api_key: bool,

    /// Trust this CA certificate (PEM or DER) for the cluster's TLS endpoint
    #[arg(long)]
    pub certificate: Option<PathBuf>,

    /// Accept self-signed or otherwise invalid cluster certificates
    #[arg(long)]
    pub insecure: bool,
}

impl ConnectArgs {
    pub fn settings(&self) -> ConnectSettings {
        ConnectSettings {
            vip: self.vip.clone(),
            username: self.username.clone(),
            domain: self.domain.clone(),
            password: self.password.clone(),
            use_api_key: self.use_api_key,
            certificate: self.certificate.clone(),
            insecure: self.insecure,
            mcm: same_name(&self.vip, HELIOS_VIP),
            cluster_name: None,
        }
    }
}

/// Install the stderr diagnostics subscriber. `RUST_LOG` wins over `--debug`.
pub fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Connect to the primary address, falling back to `vip2` when given.
/// Returns the client and whether the fallback was used.
pub async fn connect(
    settings: &ConnectSettings,
    vip2: Option<&str>,
    out: &Output,
) -> Result<(ClusterClient, bool), RunError> {
    connect_with(settings, vip2, out, |s| async move {
        ClusterClient::connect(&s).await
    })
    .await
}

/// Fallback logic of [`connect`] over any connector. Only connection
/// failures of the primary address are retried against `vip2`.
pub async fn connect_with<C, F, Fut>(
    settings: &ConnectSettings,
    vip2: Option<&str>,
    out: &Output,
    connector: F,
) -> Result<(C, bool), RunError>
where
    F: Fn(ConnectSettings) -> Fut,
    Fut: Future<Output = Result<C, RunError>>,
{
    match connector(settings.clone()).await {
        Ok(client) => Ok((client, false)),
        Err(err @ RunError::Connection(_)) => {
            let Some(vip2) = vip2 else {
                return Err(err);
            };
            out.note(err.to_string());
            out.say(format!("Failed to connect to {}. Trying {vip2}...", settings.vip));
            let fallback = ConnectSettings {
                vip: vip2.to_string(),
                ..settings.clone()
            };
            let client = connector(fallback).await?;
            Ok((client, true))
        }
        Err(err) => Err(err),
    }
}
