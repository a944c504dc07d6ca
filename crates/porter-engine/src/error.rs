use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::process::ExitStatus;

use porter_client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("error reading porter.yaml: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error unmarshaling porter.yaml: {source}")]
    Syntax {
        #[source]
        source: serde_yaml::Error,
    },
    #[error("error parsing porter.yaml: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unknown porter.yaml version: {version}")]
    UnknownVersion { version: String },
    #[error("namespace must be set by PORTER_NAMESPACE")]
    MissingNamespace,
    #[error("app {app} references unknown build {build}")]
    UnknownBuild { app: String, build: String },
    #[error("addon {addon} must specify helm_chart.name")]
    MissingChart { addon: String },
    #[error("error encoding build for app {app}: {source}")]
    Encode {
        app: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid resource name in porter.yaml: {name:?}")]
    InvalidResourceName { name: String },
    #[error("the following error(s) were found while validating the porter.yaml file:{details}")]
    Validation { details: String },
}

/// One problem found while validating a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid YAML: {message}")]
    Syntax { message: String },
    #[error("unknown porter.yaml version: {version:?}")]
    UnknownVersion { version: String },
    #[error("invalid manifest structure: {message}")]
    Structure { message: String },
    #[error("resource #{index} has an empty name")]
    EmptyName { index: usize },
    #[error("duplicate resource name: {name}")]
    DuplicateName { name: String },
    #[error("resource {resource} uses unknown driver \"{driver}\"")]
    UnknownDriver { resource: String, driver: String },
    #[error("resource {resource} depends on missing resource {dependency}")]
    MissingDependency { resource: String, dependency: String },
    #[error("dependency cycle detected among: {cycle}")]
    Cycle { cycle: String },
    #[error("resource {resource} must set source.name")]
    MissingSourceName { resource: String },
    #[error("resource {resource} has an invalid config: {message}")]
    InvalidConfig { resource: String, message: String },
    #[error("resource {resource} references an env group without a name")]
    EmptyEnvGroupName { resource: String },
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate resource name: {name}")]
    DuplicateResource { name: String },
    #[error("dependency graph has missing nodes:\n  - {details}")]
    MissingNodes { details: String },
    #[error("{message}")]
    Invariant { message: String },
    #[error("dependency cycle detected among: {cycle}")]
    CycleDetected { cycle: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("invalid query {query:?}: {reason}")]
    InvalidQuery { query: String, reason: &'static str },
    #[error("query {query:?} references {resource}, which is not a declared dependency")]
    UndeclaredDependency { query: String, resource: String },
    #[error("query {query:?} references {resource}, which has no output")]
    UnknownResource { query: String, resource: String },
    #[error("query {query:?}: key {key:?} not found")]
    MissingKey { query: String, key: String },
    #[error("query {query:?}: index {index} out of range")]
    IndexOutOfRange { query: String, index: usize },
    #[error("query {query:?}: cannot index into {found}")]
    TypeMismatch { query: String, found: &'static str },
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("invalid target for resource {resource}: {source}")]
    Decode {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("project id must be set for resource {resource}")]
    MissingProject { resource: String },
    #[error("cluster id must be set for resource {resource}")]
    MissingCluster { resource: String },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid source for resource {resource}: {source}")]
    Decode {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("source name must be set for resource {resource}")]
    MissingName { resource: String },
}

#[derive(Debug, Error)]
pub enum GitError {
    #[error("no git repository found at or above {path}")]
    Discover {
        path: PathBuf,
        #[source]
        source: Box<gix::discover::Error>,
    },
    #[error("failed to resolve HEAD in {path}")]
    Head {
        path: PathBuf,
        #[source]
        source: Box<gix::reference::head_id::Error>,
    },
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("binary \"{binary}\" not found on PATH")]
    BinaryNotFound { binary: &'static str },
    #[error("failed to execute {binary} {args}")]
    CommandSpawn {
        binary: &'static str,
        args: String,
        #[source]
        source: io::Error,
    },
    #[error("command failed: {binary} {args} (exit: {status}): {stderr}")]
    CommandFailed {
        binary: &'static str,
        args: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("build method {method} does not build images")]
    UnsupportedMethod { method: porter_domain::BuildMethod },
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timed out after {seconds}s waiting for job {name}")]
    Timeout { name: String, seconds: u64 },
    #[error("job {name} failed{}", message.as_deref().map(|message| format!(": {message}")).unwrap_or_default())]
    JobFailed {
        name: String,
        message: Option<String>,
    },
    #[error("error reading status of job {name}: {source}")]
    Status {
        name: String,
        #[source]
        source: ClientError,
    },
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("unknown driver \"{kind}\" for resource {resource}")]
    UnknownDriver { resource: String, kind: String },
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("error resolving config for resource {resource}: {source}")]
    Resolve {
        resource: String,
        #[source]
        source: ResolveError,
    },
    #[error("error decoding config for resource {resource}: {source}")]
    Config {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{action} for resource {resource}: {source}")]
    Remote {
        resource: String,
        action: &'static str,
        #[source]
        source: ClientError,
    },
    #[error("for resource {resource}, error getting last git commit: {source}")]
    Git {
        resource: String,
        #[source]
        source: GitError,
    },
    #[error("error building image for resource {resource}: {source}")]
    Build {
        resource: String,
        #[source]
        source: BuildError,
    },
    #[error("env group name cannot be empty (resource {resource})")]
    EmptyEnvGroupName { resource: String },
    #[error("resource {resource} uses build method registry but build.image is not set")]
    MissingImage { resource: String },
    #[error("no registry {} is linked to the project for resource {resource}", url.as_deref().unwrap_or("at all"))]
    NoRegistry {
        resource: String,
        url: Option<String>,
    },
    #[error("error waiting for job {resource}: {source}")]
    Wait {
        resource: String,
        #[source]
        source: WaitError,
    },
    #[error("error deleting job {resource} with waitForJob and onlyCreate set to true: {source}")]
    JobCleanup {
        resource: String,
        #[source]
        source: ClientError,
    },
    #[error("error serializing values for resource {resource}: {source}")]
    Encode {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DriverError {
    /// Whether the underlying control-plane call was rejected as forbidden.
    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        match self {
            Self::Remote { source, .. } | Self::JobCleanup { source, .. } => source.is_forbidden(),
            Self::Wait {
                source: WaitError::Status { source, .. },
                ..
            } => source.is_forbidden(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("namespace must be set by PORTER_NAMESPACE")]
    MissingNamespace,
    #[error("{name} must be an unsigned integer, got {value:?}")]
    InvalidNumber {
        name: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("project id must be set")]
    MissingProject,
    #[error("cluster id must be set")]
    MissingCluster,
    #[error("error getting last git commit: {source}")]
    Git {
        #[source]
        source: GitError,
    },
    #[error("could not find environment for deployment")]
    EnvironmentNotFound,
    #[error(
        "attempting to deploy to system namespace '{namespace}' which does not exist, please create it to continue"
    )]
    SystemNamespaceMissing { namespace: String },
    #[error("{action}: {source}")]
    Remote {
        action: &'static str,
        #[source]
        source: ClientError,
    },
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error("env group name cannot be empty (resource {resource})")]
    EmptyEnvGroupName { resource: String },
    #[error("env group namespace cannot be empty (resource {resource}, group {group})")]
    EmptyEnvGroupNamespace { resource: String, group: String },
    #[error("env group {group} does not exist in namespace {namespace} (resource {resource})")]
    EnvGroupNotFound {
        resource: String,
        group: String,
        namespace: String,
    },
}

impl HookError {
    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        match self {
            Self::Remote { source, .. } => source.is_forbidden(),
            _ => false,
        }
    }
}

/// Run-level failure: the apply could not start or could not finish.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("{hook} hook failed: {source}")]
    Hook {
        hook: String,
        #[source]
        source: HookError,
    },
}

impl ApplyError {
    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        match self {
            Self::Graph(_) => false,
            Self::Driver(error) => error.is_forbidden(),
            Self::Hook { source, .. } => source.is_forbidden(),
        }
    }
}
