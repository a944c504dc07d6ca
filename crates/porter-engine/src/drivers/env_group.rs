use std::collections::BTreeMap;

use porter_client::{ClusterScope, CreateEnvGroupRequest};
use porter_domain::{OutputMap, Resource, Target};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use super::DriverOptions;
use crate::error::DriverError;
use crate::resolve::{OutputTable, Resolver};
use crate::target::resolve_target;
use crate::values::scalar_to_string;
use crate::worker::{ApplyOutcome, Driver};

#[derive(Debug, Default, Deserialize)]
struct EnvGroupsConfig {
    #[serde(default)]
    env_groups: Vec<EnvGroupSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct EnvGroupSpec {
    #[serde(default)]
    name: String,
    #[serde(default)]
    variables: Map<String, Value>,
    #[serde(default)]
    secret_variables: Map<String, Value>,
}

fn stringify(values: &Map<String, Value>) -> BTreeMap<String, String> {
    values
        .iter()
        .map(|(key, value)| (key.clone(), scalar_to_string(value)))
        .collect()
}

/// Creates or updates the env groups listed under `config.env_groups`.
pub struct EnvGroupDriver {
    options: DriverOptions,
    target: Target,
    output: OutputMap,
}

impl EnvGroupDriver {
    /// # Errors
    ///
    /// Returns an error when the resource's target cannot be resolved.
    pub fn new(resource: &Resource, options: DriverOptions) -> Result<Self, DriverError> {
        let target = resolve_target(resource.name.as_str(), &resource.target, &options.defaults)?;
        Ok(Self {
            options,
            target,
            output: OutputMap::new(),
        })
    }
}

impl Driver for EnvGroupDriver {
    fn apply(
        &mut self,
        resource: &Resource,
        outputs: &OutputTable,
    ) -> Result<ApplyOutcome, DriverError> {
        let name = resource.name.as_str();
        let config = Resolver::for_dependencies(outputs, &resource.depends_on)
            .resolve_map(&resource.config)
            .map_err(|source| DriverError::Resolve {
                resource: name.to_string(),
                source,
            })?;
        let parsed: EnvGroupsConfig =
            serde_json::from_value(Value::Object(config)).map_err(|source| DriverError::Config {
                resource: name.to_string(),
                source,
            })?;

        let scope = ClusterScope::new(self.target.project, self.target.cluster);
        let mut output = OutputMap::new();
        for group in parsed.env_groups {
            if group.name.trim().is_empty() {
                return Err(DriverError::EmptyEnvGroupName {
                    resource: name.to_string(),
                });
            }

            info!(group = group.name.as_str(), namespace = self.target.namespace.as_str(), "applying env group");
            let request = CreateEnvGroupRequest {
                name: group.name.clone(),
                variables: stringify(&group.variables),
                secret_variables: stringify(&group.secret_variables),
            };
            let applied = self
                .options
                .client
                .create_env_group(scope, &self.target.namespace, &request)
                .map_err(|source| DriverError::Remote {
                    resource: name.to_string(),
                    action: "error creating env group",
                    source,
                })?;

            let variables = applied
                .variables
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect();
            output.insert(group.name, Value::Object(variables));
        }

        self.output = output;
        Ok(ApplyOutcome::Applied)
    }

    fn output(&self) -> OutputMap {
        self.output.clone()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use porter_domain::Resource;
    use serde_json::{Value, json};

    use super::EnvGroupDriver;
    use crate::drivers::fixtures::harness;
    use crate::error::DriverError;
    use crate::resolve::OutputTable;
    use crate::testing::FakeControlPlane;
    use crate::worker::Driver;

    fn resource(config: Value) -> Resource {
        serde_json::from_value(json!({
            "name": "env-group-shared",
            "driver": "env-group",
            "target": {"namespace": "pr-42"},
            "config": config,
        }))
        .expect("resource decodes")
    }

    #[test]
    fn creates_each_group_in_the_target_namespace() {
        let harness = harness(FakeControlPlane::default(), &[]);
        let resource = resource(json!({
            "env_groups": [{
                "name": "shared",
                "variables": {"PORT": 8080, "HOST": "0.0.0.0"},
                "secret_variables": {"TOKEN": "s3cret"},
            }],
        }));

        let mut driver = EnvGroupDriver::new(&resource, harness.options.clone()).expect("driver");
        driver.apply(&resource, &OutputTable::new()).expect("applies");

        let state = harness.client.state();
        let (namespace, request) = &state.created_env_groups[0];
        assert_eq!(namespace, "pr-42");
        assert_eq!(request.variables.get("PORT").map(String::as_str), Some("8080"));
        assert_eq!(request.secret_variables.get("TOKEN").map(String::as_str), Some("s3cret"));
        assert_eq!(
            Value::Object(driver.output()),
            json!({"shared": {"PORT": "8080", "HOST": "0.0.0.0"}})
        );
    }

    #[test]
    fn unnamed_groups_are_rejected() {
        let harness = harness(FakeControlPlane::default(), &[]);
        let resource = resource(json!({"env_groups": [{"variables": {"A": "1"}}]}));

        let mut driver = EnvGroupDriver::new(&resource, harness.options.clone()).expect("driver");
        let error = driver
            .apply(&resource, &OutputTable::new())
            .expect_err("name is required");
        assert!(matches!(error, DriverError::EmptyEnvGroupName { .. }));
        assert!(harness.client.state().created_env_groups.is_empty());
    }
}
