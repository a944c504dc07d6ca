use porter_domain::{
    ADDON_REPO_URL, APPLICATION_REPO_URL, APPLICATION_TEMPLATES, Source, SourceKind, Target,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{SourceError, TargetError};

pub const DEFAULT_NAMESPACE: &str = "default";

/// Values that fill in or override a resource's `target` block.
///
/// `override_*` fields come from the environment and beat the manifest; the
/// plain fields come from the CLI configuration and only fill gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetDefaults {
    pub override_project: Option<u64>,
    pub override_cluster: Option<u64>,
    pub override_namespace: Option<String>,
    pub project: Option<u64>,
    pub cluster: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTarget {
    #[serde(default)]
    project: Option<u64>,
    #[serde(default)]
    cluster: Option<u64>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    registry_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSource {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    repo: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    values: Map<String, Value>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Resolve where `resource` deploys.
///
/// # Errors
///
/// Returns an error when the target block is malformed or no non-zero
/// project/cluster can be determined.
pub fn resolve_target(
    resource: &str,
    raw: &Map<String, Value>,
    defaults: &TargetDefaults,
) -> Result<Target, TargetError> {
    let parsed: RawTarget =
        serde_json::from_value(Value::Object(raw.clone())).map_err(|source| {
            TargetError::Decode {
                resource: resource.to_string(),
                source,
            }
        })?;

    let project = defaults
        .override_project
        .or(parsed.project.filter(|id| *id != 0))
        .or(defaults.project)
        .filter(|id| *id != 0)
        .ok_or_else(|| TargetError::MissingProject {
            resource: resource.to_string(),
        })?;
    let cluster = defaults
        .override_cluster
        .or(parsed.cluster.filter(|id| *id != 0))
        .or(defaults.cluster)
        .filter(|id| *id != 0)
        .ok_or_else(|| TargetError::MissingCluster {
            resource: resource.to_string(),
        })?;
    let namespace = non_empty(defaults.override_namespace.clone())
        .or_else(|| non_empty(parsed.namespace))
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    Ok(Target {
        project,
        cluster,
        namespace,
        app_name: non_empty(parsed.app_name),
        registry_url: non_empty(parsed.registry_url),
    })
}

/// Resolve which chart `resource` deploys.
///
/// # Errors
///
/// Returns an error when the source block is malformed or names no template.
pub fn resolve_source(resource: &str, raw: &Map<String, Value>) -> Result<Source, SourceError> {
    let parsed: RawSource =
        serde_json::from_value(Value::Object(raw.clone())).map_err(|source| {
            SourceError::Decode {
                resource: resource.to_string(),
                source,
            }
        })?;

    let name = non_empty(parsed.name).ok_or_else(|| SourceError::MissingName {
        resource: resource.to_string(),
    })?;
    let is_template = APPLICATION_TEMPLATES.contains(&name.as_str());

    let (repo, kind) = match non_empty(parsed.repo) {
        None if is_template => (APPLICATION_REPO_URL.to_string(), SourceKind::Application),
        None => (ADDON_REPO_URL.to_string(), SourceKind::Addon),
        Some(repo) => {
            let kind = if is_template && repo.trim_end_matches('/') == APPLICATION_REPO_URL {
                SourceKind::Application
            } else {
                SourceKind::Addon
            };
            (repo, kind)
        }
    };

    Ok(Source {
        name,
        repo,
        version: non_empty(parsed.version),
        values: parsed.values,
        kind,
    })
}
