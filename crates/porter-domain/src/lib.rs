use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

mod config;
mod report;
mod target;

pub use config::{ApplicationConfig, BuildConfig, BuildMethod, EnvGroupRef, ImageRef};
pub use report::{ApplyReport, ResourceOutcome, ResourceResult};
pub use target::{
    ADDON_REPO_URL, APPLICATION_REPO_URL, APPLICATION_TEMPLATES, Source, SourceKind, Target,
};

/// Per-resource output values that later resources can reference.
pub type OutputMap = Map<String, Value>;

/// Driver used for resources that do not name one explicitly.
pub const DEFAULT_DRIVER: &str = "deploy";

/// Driver kind of resources that manage environment groups.
pub const ENV_GROUP_DRIVER: &str = "env-group";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainValidationError {
    #[error("resource name must not be empty")]
    EmptyResourceName,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceName(String);

impl ResourceName {
    /// Create a resource name wrapper, rejecting blank names.
    ///
    /// # Errors
    ///
    /// Returns an error when `name` is empty after trimming.
    pub fn new(name: String) -> Result<Self, DomainValidationError> {
        if name.trim().is_empty() {
            Err(DomainValidationError::EmptyResourceName)
        } else {
            Ok(Self(name))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourceName {
    type Error = DomainValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ResourceName {
    type Error = DomainValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for ResourceName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<ResourceName> for String {
    fn from(value: ResourceName) -> Self {
        value.0
    }
}

/// A parsed `porter.yaml` in its v1 graph shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub version: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl ResourceGroup {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            resources: Vec::new(),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|resource| resource.name.as_str() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default)]
    pub source: Map<String, Value>,
    #[serde(default)]
    pub target: Map<String, Value>,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, alias = "dependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl Resource {
    #[must_use]
    pub fn new(name: ResourceName) -> Self {
        Self {
            name,
            driver: None,
            source: Map::new(),
            target: Map::new(),
            config: Map::new(),
            depends_on: Vec::new(),
        }
    }

    /// Driver kind declared in the manifest, if any.
    #[must_use]
    pub fn driver(&self) -> Option<&str> {
        self.driver.as_deref().filter(|kind| !kind.is_empty())
    }

    #[must_use]
    pub fn driver_or_default(&self) -> &str {
        self.driver().unwrap_or(DEFAULT_DRIVER)
    }

    #[must_use]
    pub fn source_name(&self) -> Option<&str> {
        self.source
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use serde_json::json;

    use super::{DEFAULT_DRIVER, DomainValidationError, Resource, ResourceGroup, ResourceName};

    #[test]
    fn resource_name_rejects_blank_values() {
        let error = ResourceName::try_from("   ").expect_err("blank names must be rejected");
        assert_eq!(error, DomainValidationError::EmptyResourceName);
    }

    #[test]
    fn resource_accepts_both_dependency_spellings() {
        let snake: Resource = serde_json::from_value(json!({
            "name": "web",
            "depends_on": ["db"],
        }))
        .expect("snake case");
        let camel: Resource = serde_json::from_value(json!({
            "name": "web",
            "dependsOn": ["db"],
        }))
        .expect("camel case");

        assert_eq!(snake.depends_on, vec!["db".to_string()]);
        assert_eq!(camel.depends_on, snake.depends_on);
    }

    #[test]
    fn blank_driver_falls_back_to_default() {
        let mut resource = Resource::new(ResourceName::try_from("web").expect("name"));
        resource.driver = Some(String::new());
        assert_eq!(resource.driver(), None);
        assert_eq!(resource.driver_or_default(), DEFAULT_DRIVER);
    }

    #[test]
    fn group_lookup_by_name() {
        let mut group = ResourceGroup::new("v1");
        let mut resource = Resource::new(ResourceName::try_from("redis").expect("name"));
        resource
            .source
            .insert("name".to_string(), json!("redis"));
        group.resources.push(resource);

        let found = group.get("redis").expect("resource present");
        assert_eq!(found.source_name(), Some("redis"));
        assert!(group.get("missing").is_none());
    }
}
