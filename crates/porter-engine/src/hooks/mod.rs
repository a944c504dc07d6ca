mod clone_env_group;
mod deployment;
mod error_emitter;

pub use clone_env_group::CloneEnvGroupHook;
pub use deployment::{DeploymentHook, SYSTEM_NAMESPACES, is_system_namespace};
pub use error_emitter::ErrorEmitterHook;

pub const DEPLOYMENT_HOOK: &str = "deployment";
pub const ERROR_EMITTER_HOOK: &str = "erroremitter";
pub const CLONE_ENV_GROUP_HOOK: &str = "cloneenvgroup";
