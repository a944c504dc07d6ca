mod build;
mod drivers;
mod env;
mod error;
mod git;
mod graph;
mod hooks;
mod manifest;
mod resolve;
mod target;
#[cfg(test)]
mod testing;
mod values;
mod wait;
mod worker;

pub use build::{BuildRequest, CommandImageBuilder, DEFAULT_PACK_BUILDER, ImageBuilder};
pub use drivers::{
    DeployDriver, DriverOptions, EnvGroupDriver, KNOWN_DRIVERS, OS_ENV_DRIVER, OsEnvDriver,
    register_drivers,
};
pub use env::{ApplyEnv, CLUSTER_VAR, NAMESPACE_VAR, PROJECT_VAR, TAG_VAR, VALIDATE_YAML_VAR};
pub use error::{
    ApplyError, BuildError, DriverError, GitError, GraphError, HookError, ManifestError,
    ResolveError, SourceError, TargetError, ValidationError, WaitError,
};
pub use git::{GitRepository, RevisionSource, SHORT_SHA_LEN};
pub use graph::build_execution_order;
pub use hooks::{
    CLONE_ENV_GROUP_HOOK, CloneEnvGroupHook, DEPLOYMENT_HOOK, DeploymentHook, ERROR_EMITTER_HOOK,
    ErrorEmitterHook, SYSTEM_NAMESPACES, is_system_namespace,
};
pub use manifest::{V1, V2BETA1, downgrade, load_manifest, parse_manifest, validate_manifest};
pub use resolve::{OutputTable, Query, Resolver};
pub use target::{DEFAULT_NAMESPACE, TargetDefaults, resolve_source, resolve_target};
pub use wait::{DEFAULT_WAIT_INTERVAL, DEFAULT_WAIT_TIMEOUT, WaitOptions, wait_for_job};
pub use worker::{ApplyOutcome, Driver, DriverFactory, Executor, Hook, Worker};
