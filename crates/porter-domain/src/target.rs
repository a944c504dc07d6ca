use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const APPLICATION_REPO_URL: &str = "https://charts.getporter.dev";
pub const ADDON_REPO_URL: &str = "https://chart-addons.getporter.dev";

/// Templates that are built from source and deployed as applications.
pub const APPLICATION_TEMPLATES: [&str; 3] = ["web", "worker", "job"];

/// Where a resource is deployed. Resolved once per resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub project: u64,
    pub cluster: u64,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,
}

impl Target {
    /// Release name for `resource`, honoring an explicit `app_name`.
    #[must_use]
    pub fn release_name<'a>(&'a self, resource: &'a str) -> &'a str {
        self.app_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(resource)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Application,
    Addon,
}

/// Resolved chart identity for a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub values: Map<String, Value>,
    pub kind: SourceKind,
}

impl Source {
    #[must_use]
    pub fn is_application(&self) -> bool {
        self.kind == SourceKind::Application
    }

    #[must_use]
    pub fn is_job(&self) -> bool {
        self.name == "job"
    }

    #[must_use]
    pub fn is_web(&self) -> bool {
        self.name == "web"
    }
}

#[cfg(test)]
mod tests {
    use super::Target;

    #[test]
    fn release_name_prefers_app_name() {
        let mut target = Target {
            project: 1,
            cluster: 2,
            namespace: "default".to_string(),
            app_name: None,
            registry_url: None,
        };
        assert_eq!(target.release_name("web"), "web");

        target.app_name = Some("frontend".to_string());
        assert_eq!(target.release_name("web"), "frontend");

        target.app_name = Some(String::new());
        assert_eq!(target.release_name("web"), "web");
    }
}
