use serde::Deserialize;

/// Node of the v1 protection source tree.
///
/// Registered sources carry their identity under `protectionSource`; some
/// listings flatten it onto the node itself.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceNode {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub protection_source: Option<SourceInfo>,
    #[serde(default)]
    pub nodes: Vec<SourceNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceInfo {
    pub id: u64,
    pub name: String,
}

/// Legacy `backupjobs/{id}` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBackupJobEntry {
    pub backup_job: LegacyBackupJob,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBackupJob {
    pub parent_source: EntityRef,
    #[serde(default)]
    pub backup_source_params: Option<Vec<BackupSourceParams>>,
}

impl LegacyBackupJob {
    /// Application entity ids the job protects on `server_id`. `None` means
    /// the job protects everything on that server.
    pub fn protected_app_entities(&self, server_id: u64) -> Option<&[u64]> {
        self.backup_source_params
            .as_ref()?
            .iter()
            .find(|p| p.source_id == server_id)
            .map(|p| p.app_entity_id_vec.as_slice())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityRef {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSourceParams {
    pub source_id: u64,
    #[serde(default)]
    pub app_entity_id_vec: Vec<u64>,
}

/// Legacy `backupsources` hierarchy under a registered parent source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSources {
    #[serde(default)]
    pub entity_hierarchy: EntityHierarchy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityHierarchy {
    #[serde(default)]
    pub children: Vec<EntityNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityNode {
    pub entity: Entity,
    #[serde(default)]
    pub children: Vec<EntityNode>,
    #[serde(default)]
    pub aux_children: Vec<EntityNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: u64,
    #[serde(default)]
    pub display_name: String,
}
