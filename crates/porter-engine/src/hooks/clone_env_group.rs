use std::collections::BTreeSet;
use std::sync::Arc;

use porter_client::{CloneEnvGroupRequest, ClusterScope, ControlPlane, GetEnvGroupRequest};
use porter_domain::{ENV_GROUP_DRIVER, EnvGroupRef, Resource, ResourceGroup};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::HookError;
use crate::target::{TargetDefaults, resolve_target};
use crate::worker::Hook;

/// Copies env groups that applications reference into their target namespace
/// when they only exist elsewhere.
pub struct CloneEnvGroupHook {
    client: Arc<dyn ControlPlane>,
    defaults: TargetDefaults,
}

impl CloneEnvGroupHook {
    #[must_use]
    pub fn new(client: Arc<dyn ControlPlane>, defaults: TargetDefaults) -> Self {
        Self { client, defaults }
    }

    fn ensure_group(
        &self,
        resource: &str,
        scope: ClusterScope,
        namespace: &str,
        group: &EnvGroupRef,
        declared: &BTreeSet<&str>,
    ) -> Result<(), HookError> {
        if group.name.trim().is_empty() {
            return Err(HookError::EmptyEnvGroupName {
                resource: resource.to_string(),
            });
        }
        if group.namespace == namespace && declared.contains(group.name.as_str()) {
            debug!(group = group.name.as_str(), namespace, "env group is created by this apply");
            return Ok(());
        }

        let lookup = GetEnvGroupRequest {
            name: group.name.clone(),
            version: group.version,
        };
        match self.client.get_env_group(scope, namespace, &lookup) {
            Ok(_) => Ok(()),
            Err(error) if error.is_not_found() => {
                if group.namespace.trim().is_empty() {
                    return Err(HookError::EmptyEnvGroupNamespace {
                        resource: resource.to_string(),
                        group: group.name.clone(),
                    });
                }
                if group.namespace == namespace {
                    return Err(HookError::EnvGroupNotFound {
                        resource: resource.to_string(),
                        group: group.name.clone(),
                        namespace: namespace.to_string(),
                    });
                }
                info!(
                    group = group.name.as_str(),
                    from = group.namespace.as_str(),
                    to = namespace,
                    "cloning env group into target namespace"
                );
                self.client
                    .clone_env_group(
                        scope,
                        &group.namespace,
                        &CloneEnvGroupRequest {
                            source_name: group.name.clone(),
                            target_namespace: namespace.to_string(),
                        },
                    )
                    .map_err(|source| HookError::Remote {
                        action: "error cloning env group",
                        source,
                    })?;
                Ok(())
            }
            Err(source) => Err(HookError::Remote {
                action: "error fetching env group",
                source,
            }),
        }
    }
}

/// Names of the env groups that `env-group` resources in the manifest create.
fn declared_env_groups(resources: &[Resource]) -> BTreeSet<&str> {
    resources
        .iter()
        .filter(|resource| resource.driver() == Some(ENV_GROUP_DRIVER))
        .filter_map(|resource| resource.config.get("env_groups").and_then(Value::as_array))
        .flatten()
        .filter_map(|group| group.get("name").and_then(Value::as_str))
        .collect()
}

impl Hook for CloneEnvGroupHook {
    fn pre_apply(&mut self, group: &ResourceGroup) -> Result<(), HookError> {
        let declared = declared_env_groups(&group.resources);
        for resource in &group.resources {
            if resource.driver() == Some(ENV_GROUP_DRIVER) {
                continue;
            }
            let Some(raw) = resource.config.get("env_groups") else {
                continue;
            };
            let env_groups: Vec<EnvGroupRef> = match serde_json::from_value(raw.clone()) {
                Ok(env_groups) => env_groups,
                Err(error) => {
                    debug!(resource = resource.name.as_str(), %error, "ignoring undecodable env_groups");
                    continue;
                }
            };
            if env_groups.is_empty() {
                continue;
            }

            let target = resolve_target(resource.name.as_str(), &resource.target, &self.defaults)?;
            let scope = ClusterScope::new(target.project, target.cluster);
            for env_group in &env_groups {
                self.ensure_group(
                    resource.name.as_str(),
                    scope,
                    &target.namespace,
                    env_group,
                    &declared,
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

use std::sync::Arc;

    use porter_client::EnvGroup;
    use porter_domain::ResourceGroup;
    use serde_json::{Value, json};

    use super::CloneEnvGroupHook;
    use crate::error::HookError;
    use crate::target::TargetDefaults;
    use crate::testing::FakeControlPlane;
    use crate::worker::Hook;

    fn defaults() -> TargetDefaults {
        TargetDefaults {
            project: Some(1),
            cluster: Some(2),
            override_namespace: Some("pr-7".to_string()),
            ..TargetDefaults::default()
        }
    }

    fn group(env_groups: Value) -> ResourceGroup {
        serde_json::from_value(json!({
            "version": "v1",
            "resources": [
                {
                    "name": "web",
                    "source": {"name": "web"},
                    "config": {"env_groups": env_groups},
                },
                {
                    "name": "env-group-shared",
                    "driver": "env-group",
                    "config": {"env_groups": [{"name": ""}]},
                },
            ],
        }))
        .expect("group decodes")
    }

    fn run(client: &Arc<FakeControlPlane>, env_groups: Value) -> Result<(), HookError> {
        CloneEnvGroupHook::new(client.clone(), defaults()).pre_apply(&group(env_groups))
    }

    #[test]
    fn missing_groups_are_cloned_from_their_namespace() {
        let client: Arc<FakeControlPlane> = Arc::default();

        run(&client, json!([{"name": "shared", "namespace": "default"}])).expect("clones");

        let state = client.state();
        let (source_namespace, request) = &state.cloned_env_groups[0];
        assert_eq!(source_namespace, "default");
        assert_eq!(request.source_name, "shared");
        assert_eq!(request.target_namespace, "pr-7");
    }

    #[test]
    fn existing_groups_are_left_alone() {
        let client: Arc<FakeControlPlane> = Arc::default();
        client.state().env_groups.insert(
            ("pr-7".to_string(), "shared".to_string()),
            EnvGroup {
                name: "shared".to_string(),
                namespace: "pr-7".to_string(),
                version: 2,
                variables: std::collections::BTreeMap::new(),
            },
        );

        run(&client, json!([{"name": "shared", "namespace": "default"}])).expect("no-op");
        assert!(client.state().cloned_env_groups.is_empty());
    }

    #[test]
    fn group_names_and_source_namespaces_are_required() {
        let client: Arc<FakeControlPlane> = Arc::default();

        let error = run(&client, json!([{"name": "", "namespace": "default"}]))
            .expect_err("name required");
        assert!(matches!(error, HookError::EmptyEnvGroupName { .. }));

        let error = run(&client, json!([{"name": "shared"}])).expect_err("namespace required");
        assert!(matches!(error, HookError::EmptyEnvGroupNamespace { .. }));
    }

    #[test]
    fn undecodable_config_is_skipped() {
        let client: Arc<FakeControlPlane> = Arc::default();
        run(&client, json!("not-a-list")).expect("skipped");
        assert!(client.calls().is_empty());
    }

    #[test]
    fn groups_created_by_the_manifest_are_not_looked_up() {
        let client: Arc<FakeControlPlane> = Arc::default();
        let group: ResourceGroup = serde_json::from_value(json!({
            "version": "v1",
            "resources": [
                {
                    "name": "env-group-shared",
                    "driver": "env-group",
                    "config": {"env_groups": [{"name": "shared"}]},
                },
                {
                    "name": "web",
                    "source": {"name": "web"},
                    "config": {"env_groups": [{"name": "shared", "namespace": "pr-7"}]},
                },
            ],
        }))
        .expect("group decodes");

        CloneEnvGroupHook::new(client.clone(), defaults())
            .pre_apply(&group)
            .expect("declared group");
        assert!(client.calls().is_empty());
    }

    #[test]
    fn missing_group_in_the_target_namespace_is_an_error() {
        let client: Arc<FakeControlPlane> = Arc::default();

        let error = run(&client, json!([{"name": "shared", "namespace": "pr-7"}]))
            .expect_err("group does not exist");

        assert!(matches!(error, HookError::EnvGroupNotFound { .. }));
        assert_eq!(client.calls(), vec!["get_env_group".to_string()]);
        assert!(client.state().cloned_env_groups.is_empty());
    }

    #[test]
    fn lookup_errors_propagate() {
        let client: Arc<FakeControlPlane> = Arc::default();
        client.state().failing.insert("get_env_group");
        let error = run(&client, json!([{"name": "shared", "namespace": "default"}]))
            .expect_err("lookup fails");
        assert!(matches!(error, HookError::Remote { .. }));
    }
}
