use porter_domain::{OutputMap, Resource};
use serde_json::Value;

use crate::env::ApplyEnv;
use crate::error::DriverError;
use crate::resolve::OutputTable;
use crate::worker::{ApplyOutcome, Driver};

/// Exposes the apply environment as output, optionally narrowed to the
/// variables under `config.prefix` with the prefix stripped.
pub struct OsEnvDriver {
    env: ApplyEnv,
    output: OutputMap,
}

impl OsEnvDriver {
    #[must_use]
    pub fn new(env: ApplyEnv) -> Self {
        Self {
            env,
            output: OutputMap::new(),
        }
    }
}

impl Driver for OsEnvDriver {
    fn apply(
        &mut self,
        resource: &Resource,
        _outputs: &OutputTable,
    ) -> Result<ApplyOutcome, DriverError> {
        let prefix = match resource.config.get("prefix") {
            None | Some(Value::Null) => "",
            Some(Value::String(prefix)) => prefix.as_str(),
            Some(other) => {
                return Err(DriverError::Config {
                    resource: resource.name.to_string(),
                    source: <serde_json::Error as serde::de::Error>::custom(format!(
                        "prefix must be a string, got {other}"
                    )),
                });
            }
        };

        self.output = self
            .env
            .vars()
            .iter()
            .filter_map(|(key, value)| {
                let stripped = key.strip_prefix(prefix)?;
                (!stripped.is_empty()).then(|| (stripped.to_string(), Value::String(value.clone())))
            })
            .collect();
        Ok(ApplyOutcome::Unchanged)
    }

    fn output(&self) -> OutputMap {
        self.output.clone()
    }
}
