use serde::{Deserialize, Serialize};

/// Identity of the connected cluster.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub id: u64,
    pub incarnation_id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

impl ClusterInfo {
    /// v2 protection group id of a v1 job: `clusterId:incarnationId:jobId`.
    pub fn group_id(&self, job_id: u64) -> String {
        format!("{}:{}:{}", self.id, self.incarnation_id, job_id)
    }
}

/// v1 protection job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionJob {
    pub id: u64,
    pub name: String,
    pub environment: String,
    pub policy_id: String,
    #[serde(default)]
    pub source_ids: Vec<u64>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Source environment of a job, as far as object selection cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Sql,
    Oracle,
    Physical,
    Other(String),
}

impl Environment {
    pub fn from_api(raw: &str) -> Self {
        match raw {
            "kSQL" => Environment::Sql,
            "kOracle" => Environment::Oracle,
            "kPhysical" | "kPhysicalFiles" => Environment::Physical,
            other => Environment::Other(other.to_string()),
        }
    }

    pub fn as_api(&self) -> &str {
        match self {
            Environment::Sql => "kSQL",
            Environment::Oracle => "kOracle",
            Environment::Physical => "kPhysical",
            Environment::Other(s) => s,
        }
    }

    pub fn is_database(&self) -> bool {
        matches!(self, Environment::Sql | Environment::Oracle)
    }

    /// Environment filter for the protection source tree lookup. All AWS
    /// flavours live under one `kAWS` tree.
    pub fn source_filter(&self) -> &str {
        match self {
            Environment::Other(s) if s.contains("kAWS") => "kAWS",
            other => other.as_api(),
        }
    }
}

/// v1 protection policy, reduced to its copy retention settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    pub days_to_keep: Option<u32>,
    #[serde(default)]
    pub snapshot_replication_copy_policies: Vec<ReplicationCopyPolicy>,
    #[serde(default)]
    pub snapshot_archival_copy_policies: Vec<ArchivalCopyPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationCopyPolicy {
    pub target: ReplicationTarget,
    pub days_to_keep: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalCopyPolicy {
    pub target: ArchivalTarget,
    pub days_to_keep: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationTarget {
    pub cluster_id: u64,
    pub cluster_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalTarget {
    pub vault_id: u64,
    pub vault_name: String,
    #[serde(default = "default_vault_type")]
    pub vault_type: String,
}

fn default_vault_type() -> String {
    "kCloud".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCluster {
    pub cluster_id: u64,
    pub name: String,
}

impl RemoteCluster {
    pub fn as_target(&self) -> ReplicationTarget {
        ReplicationTarget {
            cluster_id: self.cluster_id,
            cluster_name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vault {
    pub id: u64,
    pub name: String,
}

impl Vault {
    pub fn as_target(&self) -> ArchivalTarget {
        ArchivalTarget {
            vault_id: self.id,
            vault_name: self.name.clone(),
            vault_type: default_vault_type(),
        }
    }
}

/// v2 protection group listing entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionGroup {
    /// `clusterId:incarnationId:jobId`
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_deleted: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionGroups {
    #[serde(default)]
    pub protection_groups: Option<Vec<ProtectionGroup>>,
}

/// Case-insensitive name comparison used for every operator-supplied name.
pub fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
