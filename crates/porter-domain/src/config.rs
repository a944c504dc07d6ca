use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Typed view of an application resource's resolved `config` block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub values: Map<String, Value>,
    #[serde(default, rename = "env_groups")]
    pub env_groups: Vec<EnvGroupRef>,
    #[serde(default, rename = "onlyCreate")]
    pub only_create: bool,
    #[serde(default, rename = "waitForJob")]
    pub wait_for_job: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<BuildMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buildpacks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, rename = "use_cache")]
    pub use_cache: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl BuildConfig {
    /// Build method, inferred from the presence of a Dockerfile when unset.
    #[must_use]
    pub fn method(&self) -> BuildMethod {
        self.method.unwrap_or(if self.dockerfile().is_some() {
            BuildMethod::Docker
        } else {
            BuildMethod::Pack
        })
    }

    #[must_use]
    pub fn context(&self) -> &str {
        self.context
            .as_deref()
            .filter(|context| !context.is_empty())
            .unwrap_or(".")
    }

    #[must_use]
    pub fn dockerfile(&self) -> Option<&str> {
        self.dockerfile.as_deref().filter(|path| !path.is_empty())
    }

    #[must_use]
    pub fn builder(&self) -> Option<&str> {
        self.builder.as_deref().filter(|builder| !builder.is_empty())
    }

    #[must_use]
    pub fn image(&self) -> Option<ImageRef> {
        self.image
            .as_deref()
            .filter(|image| !image.is_empty())
            .map(ImageRef::parse)
    }

    #[must_use]
    pub fn is_registry(&self) -> bool {
        self.method() == BuildMethod::Registry
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMethod {
    Pack,
    Docker,
    Registry,
}

impl fmt::Display for BuildMethod {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pack => "pack",
            Self::Docker => "docker",
            Self::Registry => "registry",
        };
        formatter.write_str(label)
    }
}

/// Reference to an environment group an application consumes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvGroupRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// Container image reference split into repository, optional tag and
/// optional digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ImageRef {
    /// Split off an `@digest` suffix, then the tag after the last `:` that
    /// follows the last `/`, so registry ports (`host:5000/app`) are not
    /// mistaken for tags.
    #[must_use]
    pub fn parse(reference: &str) -> Self {
        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => (name, (!digest.is_empty()).then(|| digest.to_string())),
            None => (reference, None),
        };
        let name_start = name.rfind('/').map_or(0, |index| index + 1);
        match name[name_start..].rfind(':') {
            Some(offset) => {
                let split = name_start + offset;
                let tag = &name[split + 1..];
                Self {
                    repository: name[..split].to_string(),
                    tag: (!tag.is_empty()).then(|| tag.to_string()),
                    digest,
                }
            }
            None => Self {
                repository: name.to_string(),
                tag: None,
                digest,
            },
        }
    }

    #[must_use]
    pub fn with_tag(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: Some(tag.into()),
            digest: None,
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(formatter, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(formatter, "@{digest}")?;
        }
        Ok(())
    }
}
