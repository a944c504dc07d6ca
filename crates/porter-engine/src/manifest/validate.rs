use std::collections::BTreeSet;

use porter_domain::{
    APPLICATION_TEMPLATES, ApplicationConfig, DEFAULT_DRIVER, ENV_GROUP_DRIVER, Resource,
    ResourceName,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{V1, V2BETA1, probe_version, v2beta1};
use crate::drivers::KNOWN_DRIVERS;
use crate::error::{GraphError, ValidationError};
use crate::graph::build_execution_order;
use crate::target::DEFAULT_NAMESPACE;

#[derive(Debug, Deserialize)]
struct RawGroup {
    #[serde(default)]
    resources: Vec<RawResource>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    #[serde(default)]
    name: String,
    #[serde(default)]
    driver: Option<String>,
    #[serde(default)]
    source: Map<String, Value>,
    #[serde(default)]
    config: Map<String, Value>,
    #[serde(default, alias = "dependsOn")]
    depends_on: Vec<String>,
}

impl From<Resource> for RawResource {
    fn from(resource: Resource) -> Self {
        Self {
            name: resource.name.into(),
            driver: resource.driver,
            source: resource.source,
            config: resource.config,
            depends_on: resource.depends_on,
        }
    }
}

/// Check a manifest and collect every problem found, instead of stopping at
/// the first one.
///
/// An empty result means the manifest is valid.
#[must_use]
pub fn validate_manifest(contents: &str) -> Vec<ValidationError> {
    let version = match probe_version(contents) {
        Ok(version) => version,
        Err(error) => {
            return vec![ValidationError::Syntax {
                message: error.to_string(),
            }];
        }
    };

    let resources = match version.as_str() {
        V1 => match serde_yaml::from_str::<RawGroup>(contents) {
            Ok(group) => group.resources,
            Err(error) => {
                return vec![ValidationError::Structure {
                    message: error.to_string(),
                }];
            }
        },
        V2BETA1 => match v2beta1::downgrade(contents, DEFAULT_NAMESPACE) {
            Ok(group) => group.resources.into_iter().map(RawResource::from).collect(),
            Err(error) => {
                return vec![ValidationError::Structure {
                    message: error.to_string(),
                }];
            }
        },
        _ => return vec![ValidationError::UnknownVersion { version }],
    };

    check_resources(&resources)
}

fn check_resources(resources: &[RawResource]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = BTreeSet::new();
    let mut nodes = Vec::new();

    for (index, raw) in resources.iter().enumerate() {
        let Ok(name) = ResourceName::try_from(raw.name.as_str()) else {
            errors.push(ValidationError::EmptyName { index });
            continue;
        };
        if !seen.insert(raw.name.as_str()) {
            errors.push(ValidationError::DuplicateName {
                name: raw.name.clone(),
            });
            continue;
        }
        let mut node = Resource::new(name);
        node.depends_on.clone_from(&raw.depends_on);
        nodes.push(node);
    }

    for raw in resources.iter().filter(|raw| !raw.name.trim().is_empty()) {
        check_resource(raw, &seen, &mut errors);
    }

    for node in &mut nodes {
        node.depends_on
            .retain(|dependency| seen.contains(dependency.as_str()));
    }
    match build_execution_order(&nodes) {
        Ok(_) => {}
        Err(GraphError::CycleDetected { cycle }) => errors.push(ValidationError::Cycle { cycle }),
        Err(error) => errors.push(ValidationError::Structure {
            message: error.to_string(),
        }),
    }

    errors
}

fn check_resource(raw: &RawResource, names: &BTreeSet<&str>, errors: &mut Vec<ValidationError>) {
    let resource = raw.name.clone();
    let driver = raw
        .driver
        .as_deref()
        .filter(|driver| !driver.is_empty())
        .unwrap_or(DEFAULT_DRIVER);

    if !KNOWN_DRIVERS.contains(&driver) {
        errors.push(ValidationError::UnknownDriver {
            resource: resource.clone(),
            driver: driver.to_string(),
        });
    }

    for dependency in &raw.depends_on {
        if !names.contains(dependency.as_str()) {
            errors.push(ValidationError::MissingDependency {
                resource: resource.clone(),
                dependency: dependency.clone(),
            });
        }
    }

    match driver {
        DEFAULT_DRIVER => {
            let source_name = raw
                .source
                .get("name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty());
            let Some(source_name) = source_name else {
                errors.push(ValidationError::MissingSourceName { resource });
                return;
            };
            if APPLICATION_TEMPLATES.contains(&source_name) {
                check_application_config(raw, errors);
            }
        }
        ENV_GROUP_DRIVER => check_env_group_names(raw, errors),
        _ => {}
    }
}

fn check_application_config(raw: &RawResource, errors: &mut Vec<ValidationError>) {
    match serde_json::from_value::<ApplicationConfig>(Value::Object(raw.config.clone())) {
        Ok(config) => {
            if config.env_groups.iter().any(|group| group.name.trim().is_empty()) {
                errors.push(ValidationError::EmptyEnvGroupName {
                    resource: raw.name.clone(),
                });
            }
        }
        Err(error) => errors.push(ValidationError::InvalidConfig {
            resource: raw.name.clone(),
            message: error.to_string(),
        }),
    }
}

fn check_env_group_names(raw: &RawResource, errors: &mut Vec<ValidationError>) {
    let Some(groups) = raw.config.get("env_groups").and_then(Value::as_array) else {
        return;
    };
    let unnamed = groups.iter().any(|group| {
        group
            .get("name")
            .and_then(Value::as_str)
            .is_none_or(|name| name.trim().is_empty())
    });
    if unnamed {
        errors.push(ValidationError::EmptyEnvGroupName {
            resource: raw.name.clone(),
        });
    }
}
