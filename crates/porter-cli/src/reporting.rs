use std::time::Duration;

use sentry::types::Dsn;
use tracing::{debug, warn};

use crate::config::{CliConfig, ConfigOverrides};
use crate::error::CliError;

/// Runtime DSN; falls back to the value baked in at build time.
pub const SENTRY_DSN_VAR: &str = "PORTER_SENTRY_DSN";

const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Scope tags attached to every reported error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ErrorTags {
    pub host: String,
    pub project: u64,
    pub cluster: u64,
}

impl ErrorTags {
    pub(crate) fn resolve(connection: &crate::ConnectionFlags) -> Self {
        let config = crate::load_config(connection).unwrap_or_else(|error| {
            debug!(%error, "config unavailable for error tags");
            CliConfig::default().with_overrides(ConfigOverrides {
                host: connection.host.clone(),
                token: None,
            })
        });
        Self {
            host: config.host().to_string(),
            project: connection.project.or(config.project).unwrap_or_default(),
            cluster: connection.cluster.or(config.cluster).unwrap_or_default(),
        }
    }
}

/// Sends command errors to Sentry when a DSN is configured.
pub(crate) struct ErrorReporter {
    dsn: Option<Dsn>,
}

impl ErrorReporter {
    pub(crate) fn from_env() -> Self {
        let raw = std::env::var(SENTRY_DSN_VAR)
            .ok()
            .or_else(|| option_env!("PORTER_SENTRY_DSN").map(str::to_string));
        Self::from_dsn(raw.as_deref())
    }

    pub(crate) fn from_dsn(raw: Option<&str>) -> Self {
        let dsn = raw
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| match raw.parse::<Dsn>() {
                Ok(dsn) => Some(dsn),
                Err(error) => {
                    warn!(%error, "ignoring invalid sentry DSN");
                    None
                }
            });
        Self { dsn }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }

    pub(crate) fn capture(&self, error: &CliError, tags: &ErrorTags) {
        let Some(dsn) = self.dsn.clone() else {
            return;
        };
        debug!("reporting error to sentry");
        let _guard = sentry::init(sentry::ClientOptions {
            dsn: Some(dsn),
            release: sentry::release_name!(),
            shutdown_timeout: FLUSH_TIMEOUT,
            ..sentry::ClientOptions::default()
        });
        sentry::with_scope(
            |scope| {
                scope.set_tag("host", &tags.host);
                scope.set_tag("project", tags.project);
                scope.set_tag("cluster", tags.cluster);
            },
            || sentry::capture_error(error),
        );
    }
}
