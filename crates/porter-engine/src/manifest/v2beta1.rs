use std::collections::BTreeMap;

use porter_domain::{
    BuildConfig, DEFAULT_DRIVER, ENV_GROUP_DRIVER, Resource, ResourceGroup, ResourceName,
};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::V1;
use crate::error::ManifestError;

const DEFAULT_APP_CHART: &str = "web";

#[derive(Debug, Deserialize)]
struct PorterYaml {
    #[serde(default)]
    builds: Vec<Build>,
    #[serde(default)]
    apps: Vec<App>,
    #[serde(default)]
    addons: Vec<Addon>,
    #[serde(default)]
    env_groups: Vec<EnvGroup>,
}

#[derive(Debug, Deserialize)]
struct Build {
    name: String,
    #[serde(flatten)]
    config: BuildConfig,
}

#[derive(Debug, Default, Deserialize)]
struct HelmChart {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct App {
    name: String,
    #[serde(default)]
    helm_chart: Option<HelmChart>,
    #[serde(default)]
    build_ref: Option<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    values: Map<String, Value>,
    #[serde(default)]
    env_groups: Vec<String>,
    #[serde(default)]
    run_once: Option<bool>,
    #[serde(default)]
    wait_for_job: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Addon {
    name: String,
    #[serde(default)]
    helm_chart: HelmChart,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    values: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct EnvGroup {
    name: String,
    #[serde(default)]
    variables: Map<String, Value>,
    #[serde(default)]
    secret_variables: Map<String, Value>,
}

fn env_group_resource_name(group: &str) -> String {
    format!("env-group-{group}")
}

fn new_resource(name: &str, driver: &str, namespace: &str) -> Result<Resource, ManifestError> {
    let name = ResourceName::try_from(name).map_err(|_| ManifestError::InvalidResourceName {
        name: name.to_string(),
    })?;
    let mut resource = Resource::new(name);
    resource.driver = Some(driver.to_string());
    resource
        .target
        .insert("namespace".to_string(), Value::String(namespace.to_string()));
    Ok(resource)
}

fn chart_source(chart: &HelmChart) -> Map<String, Value> {
    let mut source = Map::new();
    source.insert("name".to_string(), Value::String(chart.name.clone()));
    if let Some(url) = chart.url.as_deref().filter(|url| !url.is_empty()) {
        source.insert("repo".to_string(), Value::String(url.to_string()));
    }
    if let Some(version) = chart.version.as_deref().filter(|version| !version.is_empty()) {
        source.insert("version".to_string(), Value::String(version.to_string()));
    }
    source
}

/// Parse a `v2beta1` manifest and rewrite it as a `v1` resource group in
/// `namespace`.
///
/// # Errors
///
/// Returns an error when the document does not parse, an app references an
/// undeclared build, an addon names no chart, or a generated resource name is
/// blank.
pub fn downgrade(contents: &str, namespace: &str) -> Result<ResourceGroup, ManifestError> {
    let parsed: PorterYaml =
        serde_yaml::from_str(contents).map_err(|source| ManifestError::Parse { source })?;

    let builds: BTreeMap<&str, &BuildConfig> = parsed
        .builds
        .iter()
        .map(|build| (build.name.as_str(), &build.config))
        .collect();
    let mut group = ResourceGroup::new(V1);

    for env_group in &parsed.env_groups {
        let mut resource = new_resource(
            &env_group_resource_name(&env_group.name),
            ENV_GROUP_DRIVER,
            namespace,
        )?;
        resource.config.insert(
            "env_groups".to_string(),
            json!([{
                "name": env_group.name,
                "variables": env_group.variables,
                "secret_variables": env_group.secret_variables,
            }]),
        );
        group.resources.push(resource);
    }

    for app in &parsed.apps {
        let mut resource = new_resource(&app.name, DEFAULT_DRIVER, namespace)?;
        let default_chart = HelmChart {
            name: DEFAULT_APP_CHART.to_string(),
            ..HelmChart::default()
        };
        let chart = app
            .helm_chart
            .as_ref()
            .filter(|chart| !chart.name.is_empty())
            .unwrap_or(&default_chart);
        resource.source = chart_source(chart);

        if let Some(build_ref) = app.build_ref.as_deref().filter(|name| !name.is_empty()) {
            let build = builds
                .get(build_ref)
                .ok_or_else(|| ManifestError::UnknownBuild {
                    app: app.name.clone(),
                    build: build_ref.to_string(),
                })?;
            let build = serde_json::to_value(build).map_err(|source| ManifestError::Encode {
                app: app.name.clone(),
                source,
            })?;
            resource.config.insert("build".to_string(), build);
        }

        resource
            .config
            .insert("values".to_string(), Value::Object(app.values.clone()));
        if let Some(run_once) = app.run_once {
            resource
                .config
                .insert("onlyCreate".to_string(), Value::Bool(run_once));
        }
        if let Some(wait_for_job) = app.wait_for_job {
            resource
                .config
                .insert("waitForJob".to_string(), Value::Bool(wait_for_job));
        }

        if !app.env_groups.is_empty() {
            let refs: Vec<Value> = app
                .env_groups
                .iter()
                .map(|name| json!({"name": name, "namespace": namespace}))
                .collect();
            resource
                .config
                .insert("env_groups".to_string(), Value::Array(refs));
        }

        resource.depends_on.clone_from(&app.depends_on);
        for name in &app.env_groups {
            if parsed.env_groups.iter().any(|group| &group.name == name) {
                resource.depends_on.push(env_group_resource_name(name));
            }
        }
        group.resources.push(resource);
    }

    for addon in &parsed.addons {
        if addon.helm_chart.name.is_empty() {
            return Err(ManifestError::MissingChart {
                addon: addon.name.clone(),
            });
        }
        let mut resource = new_resource(&addon.name, DEFAULT_DRIVER, namespace)?;
        resource.source = chart_source(&addon.helm_chart);
        resource.config.clone_from(&addon.values);
        resource.depends_on.clone_from(&addon.depends_on);
        group.resources.push(resource);
    }

    Ok(group)
}
