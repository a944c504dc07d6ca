use std::fs;
use std::path::Path;

use porter_domain::ResourceGroup;
use serde::Deserialize;
use tracing::debug;

use crate::env::ApplyEnv;
use crate::error::ManifestError;

mod v2beta1;
mod validate;

pub use v2beta1::downgrade;
pub use validate::validate_manifest;

pub const V1: &str = "v1";
pub const V2BETA1: &str = "v2beta1";

#[derive(Debug, Deserialize)]
struct VersionProbe {
    #[serde(default)]
    version: Option<String>,
}

fn probe_version(contents: &str) -> Result<String, serde_yaml::Error> {
    let probe: VersionProbe = serde_yaml::from_str(contents)?;
    Ok(probe.version.unwrap_or_default())
}

/// Read and parse the manifest at `path`.
///
/// # Errors
///
/// Returns an error when the file cannot be read or [`parse_manifest`] fails.
pub fn load_manifest(path: &Path, env: &ApplyEnv) -> Result<ResourceGroup, ManifestError> {
    let contents = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&contents, env)
}

/// Parse manifest text into a `v1` resource group.
///
/// `v2beta1` documents are downgraded into the namespace named by
/// `PORTER_NAMESPACE`. `v1` documents are validated first when
/// `PORTER_VALIDATE_YAML` is set.
///
/// # Errors
///
/// Returns an error for malformed YAML, an unknown version, a `v2beta1`
/// manifest without a namespace, or a failed validation.
pub fn parse_manifest(contents: &str, env: &ApplyEnv) -> Result<ResourceGroup, ManifestError> {
    let version = probe_version(contents).map_err(|source| ManifestError::Syntax { source })?;
    debug!(version = version.as_str(), "parsing porter.yaml");

    match version.as_str() {
        V2BETA1 => {
            let namespace = env.namespace().ok_or(ManifestError::MissingNamespace)?;
            v2beta1::downgrade(contents, namespace)
        }
        V1 => {
            if env.validate_yaml() {
                let errors: Vec<String> = validate_manifest(contents)
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                if !errors.is_empty() {
                    return Err(ManifestError::Validation {
                        details: porter_report::validation_error_list(&errors),
                    });
                }
            }
            serde_yaml::from_str(contents).map_err(|source| ManifestError::Parse { source })
        }
        _ => Err(ManifestError::UnknownVersion { version }),
    }
}
