mod deploy;
mod env_group;
mod os_env;

use std::path::PathBuf;
use std::sync::Arc;

use porter_client::ControlPlane;
use porter_domain::{DEFAULT_DRIVER, ENV_GROUP_DRIVER, Resource};

pub use deploy::DeployDriver;
pub use env_group::EnvGroupDriver;
pub use os_env::OsEnvDriver;

use crate::build::ImageBuilder;
use crate::env::ApplyEnv;
use crate::error::DriverError;
use crate::git::RevisionSource;
use crate::target::TargetDefaults;
use crate::wait::WaitOptions;
use crate::worker::{Driver, Executor};

pub const OS_ENV_DRIVER: &str = "os-env";

/// Driver kinds this crate provides.
pub const KNOWN_DRIVERS: [&str; 3] = [DEFAULT_DRIVER, ENV_GROUP_DRIVER, OS_ENV_DRIVER];

/// Collaborators shared by every driver in a run.
#[derive(Clone)]
pub struct DriverOptions {
    pub client: Arc<dyn ControlPlane>,
    pub builder: Arc<dyn ImageBuilder>,
    pub revisions: Arc<dyn RevisionSource>,
    pub defaults: TargetDefaults,
    /// Working directory of the apply; build contexts resolve against it.
    pub base_path: PathBuf,
    pub env: ApplyEnv,
    pub wait: WaitOptions,
}

/// Register every known driver kind on `executor`, with `deploy` as the
/// default.
pub fn register_drivers(executor: &mut dyn Executor, options: &DriverOptions) {
    let deploy = options.clone();
    executor.register_driver(
        DEFAULT_DRIVER,
        Box::new(move |resource: &Resource| -> Result<Box<dyn Driver>, DriverError> {
            Ok(Box::new(DeployDriver::new(resource, deploy.clone())?))
        }),
    );

    let env_group = options.clone();
    executor.register_driver(
        ENV_GROUP_DRIVER,
        Box::new(move |resource: &Resource| -> Result<Box<dyn Driver>, DriverError> {
            Ok(Box::new(EnvGroupDriver::new(resource, env_group.clone())?))
        }),
    );

    let env = options.env.clone();
    executor.register_driver(
        OS_ENV_DRIVER,
        Box::new(move |_resource: &Resource| -> Result<Box<dyn Driver>, DriverError> {
            Ok(Box::new(OsEnvDriver::new(env.clone())))
        }),
    );

    executor.set_default_driver(DEFAULT_DRIVER);
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use super::DriverOptions;
    use crate::env::ApplyEnv;
    use crate::target::TargetDefaults;
    use crate::testing::{FakeControlPlane, FakeImageBuilder, FixedRevision};
    use crate::wait::WaitOptions;

    pub struct Harness {
        pub client: Arc<FakeControlPlane>,
        pub builder: Arc<FakeImageBuilder>,
        pub options: DriverOptions,
    }

    pub fn harness(client: FakeControlPlane, env: &[(&str, &str)]) -> Harness {
        let client = Arc::new(client);
        let builder = Arc::new(FakeImageBuilder::default());
        let options = DriverOptions {
            client: client.clone(),
            builder: builder.clone(),
            revisions: Arc::new(FixedRevision("abc1234")),
            defaults: TargetDefaults {
                project: Some(1),
                cluster: Some(2),
                ..TargetDefaults::default()
            },
            base_path: PathBuf::from("/repo"),
            env: ApplyEnv::from_pairs(env.iter().copied()),
            wait: WaitOptions {
                interval: Duration::ZERO,
                timeout: Duration::from_secs(5),
            },
        };
        Harness {
            client,
            builder,
            options,
        }
    }
}
