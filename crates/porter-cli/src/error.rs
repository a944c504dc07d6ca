use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    ArgumentParse(#[from] clap::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Manifest(#[from] porter_engine::ManifestError),
    #[error(transparent)]
    Client(#[from] porter_client::ClientError),
    #[error("error creating deployment hook: {source}")]
    DeploymentHook {
        #[source]
        source: porter_engine::HookError,
    },
    #[error("could not determine the working directory")]
    WorkingDirectory {
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Report(#[from] porter_report::ReportError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
