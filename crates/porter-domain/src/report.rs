use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceOutcome {
    Applied,
    Unchanged,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceResult {
    pub name: String,
    pub driver: String,
    pub outcome: ResourceOutcome,
    pub error: Option<String>,
}

impl ResourceResult {
    #[must_use]
    pub fn applied(name: &str, driver: &str) -> Self {
        Self::new(name, driver, ResourceOutcome::Applied, None)
    }

    #[must_use]
    pub fn unchanged(name: &str, driver: &str) -> Self {
        Self::new(name, driver, ResourceOutcome::Unchanged, None)
    }

    #[must_use]
    pub fn failed(name: &str, driver: &str, error: String) -> Self {
        Self::new(name, driver, ResourceOutcome::Failed, Some(error))
    }

    #[must_use]
    pub fn skipped(name: &str, driver: &str, reason: String) -> Self {
        Self::new(name, driver, ResourceOutcome::Skipped, Some(reason))
    }

    fn new(name: &str, driver: &str, outcome: ResourceOutcome, error: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            driver: driver.to_string(),
            outcome,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    pub execution_order: Vec<String>,
    pub results: Vec<ResourceResult>,
    pub errors: Vec<String>,
    /// Set when a control-plane call was rejected for lack of permission.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forbidden: bool,
}

impl ApplyReport {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
            || self
                .results
                .iter()
                .any(|result| result.outcome == ResourceOutcome::Failed)
    }

    pub fn failed_resources(&self) -> impl Iterator<Item = &ResourceResult> {
        self.results
            .iter()
            .filter(|result| result.outcome == ResourceOutcome::Failed)
    }
}
