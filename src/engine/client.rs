//! HTTP client for the cluster REST API.

use super::api::{ClusterApi, ReplicationApi, RunApi, SubmitOutcome};
use crate::error::{ApiError, RunError};
use crate::model::{
    first_expiry_usecs, same_name, BackupJobRunsEntry, BackupSources, ClusterInfo,
    LegacyBackupJobEntry, LegacyRun, Policy, ProgressMonitor, ProtectionGroup, ProtectionGroups,
    ProtectionJob, ProtectionRun, RemoteCluster, ReplicationTask, RunRequest, RunsPage,
    SourceNode, Vault,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// How to reach and authenticate against a cluster.
#[derive(Debug, Clone, Default)]
pub struct ConnectSettings {
    pub vip: String,
    pub username: String,
    pub domain: String,
    pub password: Option<String>,
    pub use_api_key: bool,
    pub certificate: Option<PathBuf>,
    pub insecure: bool,
    /// Connect through a multi-cluster manager and address `cluster_name`.
    pub mcm: bool,
    pub cluster_name: Option<String>,
}

/// API families exposed by the cluster.
#[derive(Debug, Clone, Copy)]
enum Root {
    Public,
    Private,
    V2,
    Mcm,
}

impl Root {
    fn prefix(self) -> &'static str {
        match self {
            Root::Public => "irisservices/api/v1/public/",
            Root::Private => "irisservices/api/v1/",
            Root::V2 => "v2/",
            Root::Mcm => "mcm/",
        }
    }
}

#[derive(Serialize)]
struct AccessTokenRequest<'a> {
    domain: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessToken {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedCluster {
    cluster_id: u64,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelRequest {
    job_run_id: u64,
}

/// Authenticated session against one cluster.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    http: reqwest::Client,
    base: Url,
    auth: HeaderMap,
}

fn build_http(settings: &ConnectSettings) -> Result<reqwest::Client, RunError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(format!("backup-run-cli/{}", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .danger_accept_invalid_certs(settings.insecure);

    if let Some(path) = settings.certificate.as_deref() {
        let bytes = std::fs::read(path).map_err(|e| {
            RunError::input(format!("failed to read certificate {}: {e}", path.display()))
        })?;
        let cert = reqwest::Certificate::from_pem(&bytes)
            .or_else(|_| reqwest::Certificate::from_der(&bytes))
            .map_err(|e| {
                RunError::input(format!(
                    "certificate {} is neither PEM nor DER: {e}",
                    path.display()
                ))
            })?;
        builder = builder.add_root_certificate(cert);
    }

    builder
        .build()
        .map_err(|e| RunError::Connection(format!("failed to build HTTP client: {e}")))
}

fn header(name: &'static str, value: &str) -> Result<(HeaderName, HeaderValue), RunError> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| RunError::input(format!("value for header {name} is not valid")))?;
    Ok((HeaderName::from_static(name), value))
}

impl ClusterClient {
    /// Authenticate and verify the session by fetching the cluster identity.
    pub async fn connect(settings: &ConnectSettings) -> Result<Self, RunError> {
        let http = build_http(settings)?;
        let base = Url::parse(&format!("https://{}/", settings.vip)).map_err(|e| {
            RunError::input(format!("invalid cluster address {}: {e}", settings.vip))
        })?;
        let mut client = ClusterClient {
            http,
            base,
            auth: HeaderMap::new(),
        };

        let password = settings.password.as_deref().ok_or_else(|| {
            RunError::Connection(
                "no password or API key supplied (use --password or BACKUP_API_PASSWORD)".into(),
            )
        })?;

        if settings.use_api_key {
            let (name, value) = header("apikey", password)?;
            client.auth.insert(name, value);
        } else {
            let token = client
                .access_token(&settings.username, &settings.domain, password)
                .await
                .map_err(|e| connection_error(&settings.vip, e))?;
            let bearer = format!("{} {}", token.token_type, token.access_token);
            let value = HeaderValue::from_str(&bearer).map_err(|_| {
                RunError::Connection("cluster returned an unusable access token".into())
            })?;
            client.auth.insert(AUTHORIZATION, value);
        }

        if settings.mcm {
            let name = settings.cluster_name.as_deref().ok_or_else(|| {
                RunError::input(
                    "--cluster-name is required when connecting through a cluster manager",
                )
            })?;
            client.select_cluster(name).await?;
        }

        let cluster = client
            .cluster()
            .await
            .map_err(|e| connection_error(&settings.vip, e))?;
        debug!(cluster_id = cluster.id, vip = %settings.vip, "connected");
        Ok(client)
    }

    async fn access_token(
        &self,
        username: &str,
        domain: &str,
        password: &str,
    ) -> Result<AccessToken, ApiError> {
        let body = AccessTokenRequest {
            domain,
            username,
            password,
        };
        let text = self
            .send(Method::POST, Root::Public, "accessTokens", &[], Some(&body))
            .await?;
        decode("accessTokens", &text)
    }

    async fn select_cluster(&mut self, name: &str) -> Result<(), RunError> {
        let clusters: Vec<ManagedCluster> = self
            .get(Root::Mcm, "clusters/connectionStatus", &[])
            .await?;
        let cluster = clusters
            .iter()
            .find(|c| same_name(&c.name, name))
            .ok_or_else(|| RunError::input(format!("Cluster {name} not found")))?;
        let (header_name, value) = header("accessclusterid", &cluster.cluster_id.to_string())?;
        self.auth.insert(header_name, value);
        Ok(())
    }

    fn url(&self, root: Root, path: &str, query: &[(&str, String)]) -> Result<Url, ApiError> {
        let raw = format!("{}{}", root.prefix(), path);
        let mut url = self
            .base
            .join(&raw)
            .map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Issue a request and return the body of a successful response.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        root: Root,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<String, ApiError> {
        let (status, text) = self.exchange(method, root, path, query, body).await?;
        check_status(path, status, text)
    }

    async fn exchange<B: Serialize + ?Sized>(
        &self,
        method: Method,
        root: Root,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<(StatusCode, String), ApiError> {
        let url = self.url(root, path, query)?;
        debug!(%method, %url, "request");
        let mut req = self.http.request(method, url).headers(self.auth.clone());
        if let Some(body) = body {
            req = req.json(body);
        }
        let transport = |source| ApiError::Transport {
            path: path.to_string(),
            source,
        };
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport)?;
        Ok((status, text))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        root: Root,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let text = self
            .send::<()>(Method::GET, root, path, query, None)
            .await?;
        decode(path, &text)
    }
}

fn check_status(path: &str, status: StatusCode, body: String) -> Result<String, ApiError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized(format!("{path}: {status}")));
    }
    if !status.is_success() {
        return Err(ApiError::Status {
            path: path.to_string(),
            status,
            body,
        });
    }
    Ok(body)
}

fn decode<T: DeserializeOwned>(path: &str, text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}

fn connection_error(vip: &str, err: ApiError) -> RunError {
    RunError::Connection(format!("Failed to connect to {vip}: {err}"))
}

/// Message of a cluster error body, which is usually `{"message": "..."}`.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(e) => e.message,
        Err(_) => body.trim().to_string(),
    }
}

/// A refused run-now request carries its reason in the body; an empty body is
/// a plain failure.
fn submit_outcome(path: &str, status: StatusCode, body: String) -> Result<SubmitOutcome, ApiError> {
    if status.is_success() {
        return Ok(SubmitOutcome::Accepted);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized(format!("{path}: {status}")));
    }
    if body.trim().is_empty() {
        return Err(ApiError::Status {
            path: path.to_string(),
            status,
            body,
        });
    }
    Ok(SubmitOutcome::AlreadyRunning(error_message(&body)))
}

impl ClusterApi for ClusterClient {
    async fn cluster(&self) -> Result<ClusterInfo, ApiError> {
        self.get(Root::Public, "cluster", &[]).await
    }

    async fn remote_clusters(&self) -> Result<Vec<RemoteCluster>, ApiError> {
        self.get(Root::Public, "remoteClusters", &[]).await
    }
}

impl RunApi for ClusterClient {
    async fn protection_jobs(&self) -> Result<Vec<ProtectionJob>, ApiError> {
        self.get(Root::Public, "protectionJobs", &[]).await
    }

    async fn protection_policy(&self, policy_id: &str) -> Result<Policy, ApiError> {
        self.get(Root::Public, &format!("protectionPolicies/{policy_id}"), &[])
            .await
    }

    async fn protection_sources(&self, environment: &str) -> Result<Vec<SourceNode>, ApiError> {
        self.get(
            Root::Public,
            "protectionSources",
            &[("environments", environment.to_string())],
        )
        .await
    }

    async fn backup_job(&self, job_id: u64) -> Result<Vec<LegacyBackupJobEntry>, ApiError> {
        self.get(Root::Private, &format!("backupjobs/{job_id}"), &[])
            .await
    }

    async fn backup_sources(&self, parent_source_id: u64) -> Result<BackupSources, ApiError> {
        self.get(
            Root::Private,
            "backupsources",
            &[
                ("allUnderHierarchy", "false".into()),
                ("entityId", parent_source_id.to_string()),
                ("excludeTypes", "5".into()),
                ("includeVMFolders", "true".into()),
            ],
        )
        .await
    }

    async fn vaults(&self) -> Result<Vec<Vault>, ApiError> {
        self.get(Root::Public, "vaults", &[]).await
    }

    async fn submit_run(
        &self,
        job_id: u64,
        request: &RunRequest,
    ) -> Result<SubmitOutcome, ApiError> {
        let path = format!("protectionJobs/run/{job_id}");
        let (status, body) = self
            .exchange(Method::POST, Root::Public, &path, &[], Some(request))
            .await?;
        submit_outcome(&path, status, body)
    }

    async fn job_runs(&self, job_id: u64) -> Result<Vec<LegacyRun>, ApiError> {
        self.get(
            Root::Public,
            "protectionRuns",
            &[
                ("jobId", job_id.to_string()),
                ("numRuns", "10000".into()),
                ("excludeTasks", "true".into()),
            ],
        )
        .await
    }

    async fn cancel_run(&self, job_id: u64, job_run_id: u64) -> Result<(), ApiError> {
        self.send(
            Method::POST,
            Root::Public,
            &format!("protectionRuns/cancel/{job_id}"),
            &[],
            Some(&CancelRequest { job_run_id }),
        )
        .await
        .map(|_| ())
    }

    async fn recent_runs(
        &self,
        group_id: &str,
        num_runs: u32,
        include_objects: bool,
    ) -> Result<RunsPage, ApiError> {
        self.get(
            Root::V2,
            &format!("data-protect/protection-groups/{group_id}/runs"),
            &[
                ("numRuns", num_runs.to_string()),
                ("includeObjectDetails", include_objects.to_string()),
            ],
        )
        .await
    }

    async fn run(
        &self,
        group_id: &str,
        run_id: &str,
        include_objects: bool,
    ) -> Result<ProtectionRun, ApiError> {
        self.get(
            Root::V2,
            &format!("data-protect/protection-groups/{group_id}/runs/{run_id}"),
            &[("includeObjectDetails", include_objects.to_string())],
        )
        .await
    }

    async fn progress(
        &self,
        task_path: &str,
        exclude_sub_tasks: bool,
    ) -> Result<ProgressMonitor, ApiError> {
        let mut query = vec![("taskPathVec", task_path.to_string())];
        if exclude_sub_tasks {
            query.push(("excludeSubTasks", "true".into()));
            query.push(("includeFinishedTasks", "false".into()));
        }
        self.get(Root::Private, "progressMonitors", &query).await
    }
}

impl ReplicationApi for ClusterClient {
    async fn protection_groups(&self) -> Result<Vec<ProtectionGroup>, ApiError> {
        let groups: ProtectionGroups = self
            .get(Root::V2, "data-protect/protection-groups", &[])
            .await?;
        Ok(groups.protection_groups.unwrap_or_default())
    }

    async fn runs_before(
        &self,
        group_id: &str,
        num_runs: u32,
        end_time_usecs: i64,
    ) -> Result<RunsPage, ApiError> {
        self.get(
            Root::V2,
            &format!("data-protect/protection-groups/{group_id}/runs"),
            &[
                ("numRuns", num_runs.to_string()),
                ("endTimeUsecs", end_time_usecs.to_string()),
                ("includeTenants", "true".into()),
            ],
        )
        .await
    }

    async fn run_expiry(
        &self,
        job_id: u64,
        start_time_usecs: i64,
    ) -> Result<Option<i64>, ApiError> {
        let entries: Vec<BackupJobRunsEntry> = self
            .get(
                Root::Private,
                "backupjobruns",
                &[
                    ("allUnderHierarchy", "true".into()),
                    ("exactMatchStartTimeUsecs", start_time_usecs.to_string()),
                    ("excludeTasks", "true".into()),
                    ("id", job_id.to_string()),
                ],
            )
            .await?;
        Ok(first_expiry_usecs(&entries))
    }

    async fn submit_replication(&self, task: &ReplicationTask) -> Result<(), ApiError> {
        self.send(Method::PUT, Root::Public, "protectionRuns", &[], Some(task))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClusterClient {
        ClusterClient {
            http: reqwest::Client::new(),
            base: Url::parse("https://cluster.example/").unwrap(),
            auth: HeaderMap::new(),
        }
    }

    #[test]
    fn urls_are_rooted_per_api_family() {
        let c = client();
        let url = c
            .url(
                Root::V2,
                "data-protect/protection-groups/1:2:3/runs",
                &[("numRuns", "1".into())],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://cluster.example/v2/data-protect/protection-groups/1:2:3/runs?numRuns=1"
        );
        let url = c.url(Root::Private, "progressMonitors", &[]).unwrap();
        assert_eq!(url.as_str(), "https://cluster.example/irisservices/api/v1/progressMonitors");
        let url = c.url(Root::Public, "cluster", &[]).unwrap();
        assert_eq!(url.as_str(), "https://cluster.example/irisservices/api/v1/public/cluster");
    }

    #[test]
    fn refused_submission_is_a_conflict() {
        let body = r#"{"errorCode":"KStatusFailed","message":"Protection job is already running"}"#;
        assert_eq!(
            submit_outcome("protectionJobs/run/1", StatusCode::INTERNAL_SERVER_ERROR, body.into())
                .unwrap(),
            SubmitOutcome::AlreadyRunning("Protection job is already running".into())
        );
        assert_eq!(
            submit_outcome("protectionJobs/run/1", StatusCode::NO_CONTENT, String::new()).unwrap(),
            SubmitOutcome::Accepted
        );
    }

    #[test]
    fn auth_and_empty_failures_are_errors() {
        assert!(matches!(
            submit_outcome("p", StatusCode::UNAUTHORIZED, "denied".into()),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            submit_outcome("p", StatusCode::BAD_GATEWAY, "  ".into()),
            Err(ApiError::Status { .. })
        ));
        assert!(matches!(
            check_status("p", StatusCode::NOT_FOUND, "missing".into()),
            Err(ApiError::Status { .. })
        ));
    }

    #[test]
    fn plain_text_error_body_is_kept() {
        assert_eq!(error_message("  job busy \n"), "job busy");
    }
}
