use std::collections::BTreeMap;
use std::ffi::OsString;

pub const NAMESPACE_VAR: &str = "PORTER_NAMESPACE";
pub const TAG_VAR: &str = "PORTER_TAG";
pub const VALIDATE_YAML_VAR: &str = "PORTER_VALIDATE_YAML";
pub const PROJECT_VAR: &str = "PORTER_PROJECT";
pub const CLUSTER_VAR: &str = "PORTER_CLUSTER";
pub const GIT_INSTALLATION_ID_VAR: &str = "PORTER_GIT_INSTALLATION_ID";
pub const PULL_REQUEST_ID_VAR: &str = "PORTER_PULL_REQUEST_ID";
pub const BRANCH_FROM_VAR: &str = "PORTER_BRANCH_FROM";
pub const BRANCH_INTO_VAR: &str = "PORTER_BRANCH_INTO";
pub const ACTION_ID_VAR: &str = "PORTER_ACTION_ID";
pub const REPO_NAME_VAR: &str = "PORTER_REPO_NAME";
pub const REPO_OWNER_VAR: &str = "PORTER_REPO_OWNER";
pub const PR_NAME_VAR: &str = "PORTER_PR_NAME";

/// Variables that must all be non-empty for the deployment hook to run.
pub const DEPLOYMENT_VARS: [&str; 8] = [
    GIT_INSTALLATION_ID_VAR,
    PULL_REQUEST_ID_VAR,
    BRANCH_FROM_VAR,
    BRANCH_INTO_VAR,
    ACTION_ID_VAR,
    REPO_NAME_VAR,
    REPO_OWNER_VAR,
    PR_NAME_VAR,
];

/// Snapshot of the process environment taken once per apply.
///
/// Drivers and hooks read configuration from this snapshot instead of the
/// live environment, so tests can construct one from literal pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyEnv {
    vars: BTreeMap<String, String>,
}

impl ApplyEnv {
    #[must_use]
    pub fn from_process() -> Self {
        Self::from_os_pairs(std::env::vars_os())
    }

    /// Like [`ApplyEnv::from_pairs`], dropping entries whose name or value is
    /// not valid UTF-8.
    pub fn from_os_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        Self::from_pairs(pairs.into_iter().filter_map(|(key, value)| {
            Some((key.into_string().ok()?, value.into_string().ok()?))
        }))
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Non-empty value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Whether `name` is set at all, even to an empty string.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    #[must_use]
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.get(NAMESPACE_VAR)
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.get(TAG_VAR)
    }

    #[must_use]
    pub fn validate_yaml(&self) -> bool {
        self.is_set(VALIDATE_YAML_VAR)
    }

    #[must_use]
    pub fn has_deployment_vars(&self) -> bool {
        DEPLOYMENT_VARS.iter().all(|name| self.get(name).is_some())
    }

    /// Image repository suffix derived from the GitHub repository, lowercased
    /// with underscores replaced.
    #[must_use]
    pub fn repo_suffix(&self) -> Option<String> {
        let name = self.get(REPO_NAME_VAR)?;
        let owner = self.get(REPO_OWNER_VAR)?;
        Some(format!("{owner}-{name}").replace('_', "-").to_lowercase())
    }
}
