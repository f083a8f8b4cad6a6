//! Job and object resolution.
//!
//! Maps operator-supplied names onto the numeric ids the run-now request
//! needs. Every lookup compares names case-insensitively; anything that does
//! not resolve is an input error.

use crate::error::RunError;
use crate::model::{
    same_name, BackupSources, EntityNode, Environment, LegacyBackupJob, ProtectionJob,
    RemoteCluster, RunNowParameter, SourceNode, Vault,
};

/// First active job whose name matches.
pub fn find_job<'a>(jobs: &'a [ProtectionJob], name: &str) -> Option<&'a ProtectionJob> {
    jobs.iter()
        .find(|j| same_name(&j.name, name) && j.is_active != Some(false))
}

/// Depth-first search of the source tree; the first node whose own name or
/// registered source name matches wins.
pub fn find_source_id(nodes: &[SourceNode], name: &str) -> Option<u64> {
    nodes.iter().find_map(|node| node.find(name))
}

impl SourceNode {
    fn find(&self, name: &str) -> Option<u64> {
        if let (Some(n), Some(id)) = (self.name.as_deref(), self.id) {
            if same_name(n, name) {
                return Some(id);
            }
        }
        if let Some(source) = &self.protection_source {
            if same_name(&source.name, name) {
                return Some(source.id);
            }
        }
        self.nodes.iter().find_map(|child| child.find(name))
    }
}

pub fn find_remote_cluster<'a>(
    remotes: &'a [RemoteCluster],
    name: &str,
) -> Option<&'a RemoteCluster> {
    remotes.iter().find(|r| same_name(&r.name, name))
}

pub fn find_vault<'a>(vaults: &'a [Vault], name: &str) -> Option<&'a Vault> {
    vaults.iter().find(|v| same_name(&v.name, name))
}

/// An `--object-name` value, interpreted for the job's environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectSelector {
    Object(String),
    /// `server[/instance[/db]]`. Oracle paths stop at the instance.
    Database {
        server: String,
        instance: Option<String>,
        database: Option<String>,
    },
}

impl ObjectSelector {
    pub fn parse(environment: &Environment, text: &str) -> Self {
        let parts: Vec<&str> = text.split('/').collect();
        let owned = |s: &&str| s.to_string();
        match environment {
            Environment::Sql => match parts.as_slice() {
                [server, instance, db] => ObjectSelector::Database {
                    server: owned(server),
                    instance: Some(owned(instance)),
                    database: Some(owned(db)),
                },
                [server, instance] => ObjectSelector::Database {
                    server: owned(server),
                    instance: Some(owned(instance)),
                    database: None,
                },
                _ => ObjectSelector::server_only(parts[0]),
            },
            Environment::Oracle => match parts.as_slice() {
                [server, instance] => ObjectSelector::Database {
                    server: owned(server),
                    instance: Some(owned(instance)),
                    database: None,
                },
                _ => ObjectSelector::server_only(parts[0]),
            },
            _ => ObjectSelector::Object(text.to_string()),
        }
    }

    fn server_only(server: &str) -> Self {
        ObjectSelector::Database {
            server: server.to_string(),
            instance: None,
            database: None,
        }
    }
}

/// Source data needed to resolve object selectors for one job.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    pub sources: Vec<SourceNode>,
    /// Legacy job definition and hierarchy, only loaded for database jobs.
    pub backup_job: Option<LegacyBackupJob>,
    pub backup_sources: Option<BackupSources>,
}

/// Resolved object selection of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSelection {
    /// Plain objects (non-database environments).
    pub source_ids: Vec<u64>,
    /// Per-server selections (database environments).
    pub run_now_parameters: Vec<RunNowParameter>,
    /// Every selected object, in selection order.
    pub selected: Vec<u64>,
}

impl ObjectSelection {
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Resolve every `--object-name` against the catalog.
pub fn resolve_objects(
    job: &ProtectionJob,
    environment: &Environment,
    names: &[String],
    catalog: &SourceCatalog,
) -> Result<ObjectSelection, RunError> {
    let mut selection = ObjectSelection::default();
    for name in names {
        match ObjectSelector::parse(environment, name) {
            ObjectSelector::Object(object) => {
                let id = find_source_id(&catalog.sources, &object)
                    .ok_or_else(|| RunError::input(format!("Object {object} not found!")))?;
                selection.source_ids.push(id);
                selection.selected.push(id);
            }
            ObjectSelector::Database {
                server,
                instance,
                database,
            } => {
                let target = DatabaseTarget {
                    text: name,
                    server: &server,
                    instance: instance.as_deref(),
                    database: database.as_deref(),
                };
                resolve_database(job, environment, &target, catalog, &mut selection)?;
            }
        }
    }
    Ok(selection)
}

struct DatabaseTarget<'a> {
    text: &'a str,
    server: &'a str,
    instance: Option<&'a str>,
    database: Option<&'a str>,
}

fn resolve_database(
    job: &ProtectionJob,
    environment: &Environment,
    target: &DatabaseTarget<'_>,
    catalog: &SourceCatalog,
    selection: &mut ObjectSelection,
) -> Result<(), RunError> {
    let not_protected =
        || RunError::input(format!("{} not protected by {}", target.text, job.name));

    let server_id = find_source_id(&catalog.sources, target.server).ok_or_else(|| {
        RunError::input(format!("Object {} not found (server name)", target.server))
    })?;
    if !job.source_ids.contains(&server_id) {
        return Err(RunError::input(format!(
            "{} not protected by {}",
            target.server, job.name
        )));
    }

    let index = match selection
        .run_now_parameters
        .iter()
        .position(|p| p.source_id == server_id)
    {
        Some(i) => i,
        None => {
            selection
                .run_now_parameters
                .push(RunNowParameter::source(server_id));
            selection.selected.push(server_id);
            selection.run_now_parameters.len() - 1
        }
    };

    let Some(instance) = target.instance else {
        return Ok(());
    };

    let backup_job = catalog.backup_job.as_ref().ok_or_else(not_protected)?;
    let allowed = backup_job.protected_app_entities(server_id);
    let server_node = catalog
        .backup_sources
        .as_ref()
        .and_then(|s| s.entity_hierarchy.children.iter().find(|c| c.entity.id == server_id))
        .ok_or_else(not_protected)?;

    let mut database_ids = Vec::new();
    match environment {
        Environment::Sql => {
            let instance_node = server_node
                .aux_children
                .iter()
                .find(|i| same_name(&i.entity.display_name, instance))
                .ok_or_else(not_protected)?;
            let dbs: Vec<&EntityNode> = match target.database {
                None => instance_node.children.iter().collect(),
                Some(db) => {
                    let wanted = format!("{instance}/{db}");
                    instance_node
                        .children
                        .iter()
                        .filter(|c| same_name(&c.entity.display_name, &wanted))
                        .collect()
                }
            };
            if dbs.is_empty() {
                return Err(not_protected());
            }
            for db in dbs {
                let permitted = allowed.map_or(true, |ids| {
                    ids.contains(&db.entity.id) || ids.contains(&instance_node.entity.id)
                });
                if !permitted {
                    return Err(not_protected());
                }
                database_ids.push(db.entity.id);
            }
        }
        _ => {
            let dbs: Vec<&EntityNode> = server_node
                .aux_children
                .iter()
                .filter(|c| same_name(&c.entity.display_name, instance))
                .collect();
            if dbs.is_empty() {
                return Err(not_protected());
            }
            database_ids.extend(
                dbs.iter()
                    .filter(|db| allowed.map_or(true, |ids| ids.contains(&db.entity.id)))
                    .map(|db| db.entity.id),
            );
        }
    }

    selection.run_now_parameters[index]
        .database_ids
        .get_or_insert_with(Vec::new)
        .extend(database_ids);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackupSourceParams, Entity, EntityHierarchy, EntityRef, SourceInfo};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn job(name: &str, active: Option<bool>) -> ProtectionJob {
        ProtectionJob {
            id: 10,
            name: name.into(),
            environment: "kSQL".into(),
            policy_id: "p".into(),
            source_ids: vec![100],
            is_active: active,
        }
    }

    fn leaf(id: u64, name: &str) -> SourceNode {
        SourceNode {
            protection_source: Some(SourceInfo {
                id,
                name: name.into(),
            }),
            ..Default::default()
        }
    }

    fn entity(id: u64, name: &str, children: Vec<EntityNode>, aux: Vec<EntityNode>) -> EntityNode {
        EntityNode {
            entity: Entity {
                id,
                display_name: name.into(),
            },
            children,
            aux_children: aux,
        }
    }

    fn sql_catalog(app_ids: Option<Vec<u64>>) -> SourceCatalog {
        let instance = entity(
            200,
            "MSSQLSERVER",
            vec![
                entity(201, "MSSQLSERVER/sales", vec![], vec![]),
                entity(202, "MSSQLSERVER/hr", vec![], vec![]),
            ],
            vec![],
        );
        SourceCatalog {
            sources: vec![SourceNode {
                protection_source: Some(SourceInfo {
                    id: 1,
                    name: "SQL root".into(),
                }),
                nodes: vec![leaf(100, "sqlserver1.lab"), leaf(101, "sqlserver2.lab")],
                ..Default::default()
            }],
            backup_job: Some(LegacyBackupJob {
                parent_source: EntityRef { id: 1 },
                backup_source_params: app_ids.map(|ids| {
                    vec![BackupSourceParams {
                        source_id: 100,
                        app_entity_id_vec: ids,
                    }]
                }),
            }),
            backup_sources: Some(BackupSources {
                entity_hierarchy: EntityHierarchy {
                    children: vec![entity(100, "sqlserver1.lab", vec![], vec![instance])],
                },
            }),
        }
    }

    #[rstest]
    #[case("Generic NAS")]
    #[case("generic nas")]
    #[case("GENERIC NAS")]
    fn job_lookup_ignores_case(#[case] name: &str) {
        let jobs = vec![job("Other", None), job("Generic NAS", None)];
        assert_eq!(find_job(&jobs, name).map(|j| j.name.as_str()), Some("Generic NAS"));
    }

    #[test]
    fn inactive_jobs_are_skipped() {
        let jobs = vec![job("Generic NAS", Some(false))];
        assert!(find_job(&jobs, "Generic NAS").is_none());
        let jobs = vec![job("Generic NAS", Some(true))];
        assert!(find_job(&jobs, "Generic NAS").is_some());
        assert!(find_job(&jobs, "Generic NAS 2").is_none());
    }

    #[test]
    fn source_search_is_depth_first() {
        let tree = vec![
            SourceNode {
                name: Some("root".into()),
                id: Some(1),
                nodes: vec![SourceNode {
                    name: Some("folder".into()),
                    id: Some(2),
                    nodes: vec![leaf(3, "VM-A")],
                    ..Default::default()
                }],
                ..Default::default()
            },
            leaf(4, "vm-a"),
        ];
        assert_eq!(find_source_id(&tree, "vm-a"), Some(3));
        assert_eq!(find_source_id(&tree, "FOLDER"), Some(2));
        assert_eq!(find_source_id(&tree, "nothing"), None);
    }

    fn db(server: &str, instance: Option<&str>, database: Option<&str>) -> ObjectSelector {
        ObjectSelector::Database {
            server: server.into(),
            instance: instance.map(String::from),
            database: database.map(String::from),
        }
    }

    #[rstest]
    #[case(Environment::Sql, "srv/inst/db", db("srv", Some("inst"), Some("db")))]
    #[case(Environment::Sql, "srv/inst", db("srv", Some("inst"), None))]
    #[case(Environment::Sql, "srv", db("srv", None, None))]
    #[case(Environment::Oracle, "srv/orcl", db("srv", Some("orcl"), None))]
    #[case(Environment::Oracle, "srv/orcl/x", db("srv", None, None))]
    #[case(
        Environment::Physical,
        "host/with/slash",
        ObjectSelector::Object("host/with/slash".into())
    )]
    fn selector_parsing(
        #[case] env: Environment,
        #[case] text: &str,
        #[case] expected: ObjectSelector,
    ) {
        assert_eq!(ObjectSelector::parse(&env, text), expected);
    }

    #[test]
    fn plain_objects_resolve_to_source_ids() {
        let catalog = SourceCatalog {
            sources: vec![leaf(7, "fileserver"), leaf(8, "nas01")],
            ..Default::default()
        };
        let selection = resolve_objects(
            &job("Files", None),
            &Environment::Physical,
            &["NAS01".into(), "fileserver".into()],
            &catalog,
        )
        .unwrap();
        assert_eq!(selection.source_ids, vec![8, 7]);
        assert_eq!(selection.selected, vec![8, 7]);
        assert!(selection.run_now_parameters.is_empty());

        let err = resolve_objects(
            &job("Files", None),
            &Environment::Physical,
            &["x".into()],
            &catalog,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Object x not found!");
    }

    #[test]
    fn sql_database_selection() {
        let catalog = sql_catalog(None);
        let selection = resolve_objects(
            &job("SQL", None),
            &Environment::Sql,
            &["sqlserver1.lab/mssqlserver/sales".into()],
            &catalog,
        )
        .unwrap();
        assert_eq!(
            selection.run_now_parameters,
            vec![RunNowParameter {
                source_id: 100,
                database_ids: Some(vec![201]),
                physical_params: None,
            }]
        );
        assert_eq!(selection.selected, vec![100]);
    }

    #[test]
    fn sql_instance_selects_all_databases_once_per_server() {
        let catalog = sql_catalog(None);
        let selection = resolve_objects(
            &job("SQL", None),
            &Environment::Sql,
            &["sqlserver1.lab/MSSQLSERVER".into(), "sqlserver1.lab".into()],
            &catalog,
        )
        .unwrap();
        assert_eq!(selection.run_now_parameters.len(), 1);
        assert_eq!(selection.run_now_parameters[0].database_ids, Some(vec![201, 202]));
    }

    #[test]
    fn backup_source_params_restrict_databases() {
        let catalog = sql_catalog(Some(vec![202]));
        let err = resolve_objects(
            &job("SQL", None),
            &Environment::Sql,
            &["sqlserver1.lab/MSSQLSERVER/sales".into()],
            &catalog,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "sqlserver1.lab/MSSQLSERVER/sales not protected by SQL");

        let ok = resolve_objects(
            &job("SQL", None),
            &Environment::Sql,
            &["sqlserver1.lab/MSSQLSERVER/hr".into()],
            &catalog,
        )
        .unwrap();
        assert_eq!(ok.run_now_parameters[0].database_ids, Some(vec![202]));
    }

    #[test]
    fn server_must_belong_to_job() {
        let catalog = sql_catalog(None);
        let err = resolve_objects(
            &job("SQL", None),
            &Environment::Sql,
            &["sqlserver2.lab".into()],
            &catalog,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "sqlserver2.lab not protected by SQL");
        assert!(matches!(err, RunError::Input(_)));

        let err = resolve_objects(&job("SQL", None), &Environment::Sql, &["ghost".into()], &catalog)
            .unwrap_err();
        assert_eq!(err.to_string(), "Object ghost not found (server name)");
    }

    #[test]
    fn unknown_instance_is_an_input_error() {
        let catalog = sql_catalog(None);
        let err = resolve_objects(
            &job("SQL", None),
            &Environment::Sql,
            &["sqlserver1.lab/OTHER/sales".into()],
            &catalog,
        )
        .unwrap_err();
        assert!(matches!(err, RunError::Input(_)));
    }

    #[test]
    fn oracle_instance_selection() {
        let mut catalog = sql_catalog(None);
        catalog.backup_sources = Some(BackupSources {
            entity_hierarchy: EntityHierarchy {
                children: vec![entity(
                    100,
                    "oraclehost",
                    vec![],
                    vec![entity(300, "ORCL", vec![], vec![]), entity(301, "DEV", vec![], vec![])],
                )],
            },
        });
        let selection = resolve_objects(
            &job("Oracle", None),
            &Environment::Oracle,
            &["sqlserver1.lab/orcl".into()],
            &catalog,
        )
        .unwrap();
        assert_eq!(selection.run_now_parameters[0].database_ids, Some(vec![300]));
    }
}
