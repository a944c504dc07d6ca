use porter_client::{
    BuildSettings, ClientError, ClusterScope, CreateAddonRequest, CreateRegistryRepositoryRequest,
    CreateReleaseRequest, Registry, Release, UpgradeReleaseRequest,
};
use porter_domain::{
    ApplicationConfig, BuildMethod, ImageRef, OutputMap, Resource, Source, Target,
};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::DriverOptions;
use crate::build::{BuildRequest, DEFAULT_PACK_BUILDER, absolutize, registry_host};
use crate::error::DriverError;
use crate::resolve::{OutputTable, Resolver};
use crate::target::{resolve_source, resolve_target};
use crate::values::{build_env, coalesce, nested_map, set_image};
use crate::wait::wait_for_job;
use crate::worker::{ApplyOutcome, Driver};

const DEFAULT_REGISTRY_TAG: &str = "latest";
const WAIT_FOR_JOB_KEY: &str = "waitForJob";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReleaseAction {
    Created,
    Updated,
    Skipped,
}

/// Creates or upgrades the release behind a resource.
///
/// Application templates (`web`, `worker`, `job`) are built from source and
/// pushed before the release is created or upgraded; everything else is
/// installed as an addon chart with the resolved config as its values.
pub struct DeployDriver {
    options: DriverOptions,
    target: Target,
    source: Source,
    output: OutputMap,
}

impl DeployDriver {
    /// # Errors
    ///
    /// Returns an error when the resource's target or source block cannot be
    /// resolved.
    pub fn new(resource: &Resource, options: DriverOptions) -> Result<Self, DriverError> {
        let target = resolve_target(resource.name.as_str(), &resource.target, &options.defaults)?;
        let source = resolve_source(resource.name.as_str(), &resource.source)?;
        debug!(
            resource = resource.name.as_str(),
            project = target.project,
            cluster = target.cluster,
            namespace = target.namespace.as_str(),
            template = source.name.as_str(),
            "resolved deploy target"
        );
        Ok(Self {
            options,
            target,
            source,
            output: OutputMap::new(),
        })
    }

    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[must_use]
    pub fn source(&self) -> &Source {
        &self.source
    }

    fn scope(&self) -> ClusterScope {
        ClusterScope::new(self.target.project, self.target.cluster)
    }

    fn probe(&self, release: &str) -> Option<Release> {
        match self
            .options
            .client
            .get_release(self.scope(), &self.target.namespace, release)
        {
            Ok(found) => Some(found),
            Err(error) if error.is_not_found() => {
                debug!(release, "release does not exist yet");
                None
            }
            Err(error) => {
                warn!(release, %error, "could not read release, creating it");
                None
            }
        }
    }

    fn apply_addon(
        &self,
        resource: &str,
        release: &str,
        config: &Map<String, Value>,
        exists: bool,
    ) -> Result<(), DriverError> {
        let client = &self.options.client;
        if exists {
            info!(release, "upgrading addon");
            let values = encode(resource, config)?;
            return client
                .upgrade_release(
                    self.scope(),
                    &self.target.namespace,
                    release,
                    &UpgradeReleaseRequest { values },
                )
                .map_err(remote(resource, "error upgrading addon"));
        }

        info!(release, chart = self.source.name.as_str(), "deploying addon");
        client
            .deploy_addon(
                self.scope(),
                &self.target.namespace,
                &CreateAddonRequest {
                    name: release.to_string(),
                    repo_url: self.source.repo.clone(),
                    template_name: self.source.name.clone(),
                    template_version: self.source.version.clone(),
                    values: config.clone(),
                },
            )
            .map_err(remote(resource, "error deploying addon"))
    }

    /// Chart values: the resource's config values over the source defaults.
    fn chart_values(&self, app: &ApplicationConfig) -> Map<String, Value> {
        coalesce(&app.values, &self.source.values)
    }

    fn resolve_tag(&self, resource: &str, app: &ApplicationConfig) -> Result<String, DriverError> {
        if let Some(tag) = self.options.env.tag() {
            return Ok(tag.to_string());
        }
        if app.build.is_registry() {
            let image = registry_image(resource, app)?;
            return Ok(image
                .tag
                .unwrap_or_else(|| DEFAULT_REGISTRY_TAG.to_string()));
        }
        self.options
            .revisions
            .short_sha(&self.options.base_path)
            .map_err(|source| DriverError::Git {
                resource: resource.to_string(),
                source,
            })
    }

    fn find_registry(&self, resource: &str) -> Result<Registry, DriverError> {
        let registries = self
            .options
            .client
            .list_registries(self.target.project)
            .map_err(remote(resource, "error listing registries"))?;

        match self.target.registry_url.as_deref() {
            Some(url) => registries
                .into_iter()
                .find(|registry| registry_host(&registry.url) == registry_host(url))
                .ok_or_else(|| DriverError::NoRegistry {
                    resource: resource.to_string(),
                    url: Some(url.to_string()),
                }),
            None => registries
                .into_iter()
                .next()
                .ok_or_else(|| DriverError::NoRegistry {
                    resource: resource.to_string(),
                    url: None,
                }),
        }
    }

    fn image_repository(&self, registry: &Registry, release: &str) -> String {
        let host = registry_host(&registry.url);
        match self.options.env.repo_suffix() {
            Some(suffix) => format!("{host}/{suffix}-{release}"),
            None => format!("{host}/{release}-{}", self.target.namespace),
        }
    }

    fn login(&self, resource: &str, registry: &Registry) -> Result<(), DriverError> {
        let token = self
            .options
            .client
            .get_registry_token(self.target.project, registry.id)
            .map_err(remote(resource, "error getting registry token"))?;
        self.options
            .builder
            .login(&registry.url, &token)
            .map_err(|source| DriverError::Build {
                resource: resource.to_string(),
                source,
            })
    }

    fn build_and_push(
        &self,
        resource: &str,
        app: &ApplicationConfig,
        values: &Map<String, Value>,
        image: &ImageRef,
    ) -> Result<(), DriverError> {
        let build = &app.build;
        let base = &self.options.base_path;
        let request = BuildRequest {
            method: build.method(),
            context: absolutize(base, build.context()),
            dockerfile: build.dockerfile().map(|path| absolutize(base, path)),
            image: image.clone(),
            builder: build.builder().map(str::to_string),
            buildpacks: build.buildpacks.clone(),
            env: build_env(values, &build.env),
            use_cache: build.use_cache,
        };
        let failed = |source| DriverError::Build {
            resource: resource.to_string(),
            source,
        };

        self.options.builder.build(&request).map_err(failed)?;
        if !build.use_cache {
            self.options.builder.push(image).map_err(failed)?;
        }
        Ok(())
    }

    fn create_application(
        &self,
        resource: &str,
        release: &str,
        app: &ApplicationConfig,
    ) -> Result<(), DriverError> {
        let tag = self.resolve_tag(resource, app)?;
        let values = self.chart_values(app);

        let (repository, build_config) = if app.build.is_registry() {
            (registry_image(resource, app)?.repository, None)
        } else {
            let registry = self.find_registry(resource)?;
            let repository = self.image_repository(&registry, release);
            if app.build.use_cache {
                self.options
                    .client
                    .create_registry_repository(
                        self.target.project,
                        registry.id,
                        &CreateRegistryRepositoryRequest {
                            image_repo_uri: repository.clone(),
                        },
                    )
                    .map_err(remote(resource, "error creating image repository"))?;
                self.login(resource, &registry)?;
            }
            self.build_and_push(resource, app, &values, &ImageRef::with_tag(&repository, &tag))?;

            let settings = (app.build.method() == BuildMethod::Pack).then(|| BuildSettings {
                builder: app
                    .build
                    .builder()
                    .unwrap_or(DEFAULT_PACK_BUILDER)
                    .to_string(),
                buildpacks: app.build.buildpacks.clone(),
            });
            (repository, settings)
        };

        info!(release, image = %ImageRef::with_tag(&repository, &tag), "creating release");
        let response = self
            .options
            .client
            .create_release(
                self.scope(),
                &self.target.namespace,
                &CreateReleaseRequest {
                    name: release.to_string(),
                    repo_url: self.source.repo.clone(),
                    template_name: self.source.name.clone(),
                    template_version: self.source.version.clone(),
                    image_repo_uri: repository,
                    image_tag: tag,
                    values,
                    build_config,
                    synced_env_groups: app
                        .env_groups
                        .iter()
                        .map(|group| group.name.clone())
                        .collect(),
                },
            )
            .map_err(remote(resource, "error creating release"))?;

        if let Some(subdomain) = response.subdomain.filter(|subdomain| !subdomain.is_empty()) {
            info!(release, subdomain = subdomain.as_str(), "release is reachable");
        }
        Ok(())
    }

    fn update_application(
        &self,
        resource: &str,
        release: &str,
        app: &ApplicationConfig,
        existing: &Release,
    ) -> Result<(), DriverError> {
        let tag = self.resolve_tag(resource, app)?;
        let mut values = self.chart_values(app);

        let repository = if app.build.is_registry() {
            registry_image(resource, app)?.repository
        } else {
            let repository = match live_repository(&existing.config) {
                Some(repository) => repository,
                None => self.image_repository(&self.find_registry(resource)?, release),
            };
            if app.build.use_cache {
                let registry = self.find_registry(resource)?;
                self.login(resource, &registry)?;
            }
            self.build_and_push(resource, app, &values, &ImageRef::with_tag(&repository, &tag))?;
            repository
        };

        set_image(&mut values, &repository, &tag);
        info!(release, image = %ImageRef::with_tag(&repository, &tag), "upgrading release");
        let body = encode(resource, &values)?;
        self.options
            .client
            .upgrade_release(
                self.scope(),
                &self.target.namespace,
                release,
                &UpgradeReleaseRequest { values: body },
            )
            .map_err(remote(resource, "error upgrading release"))
    }

    fn assign_output(&mut self, resource: &str, release: &str) -> Result<(), DriverError> {
        let live = self
            .options
            .client
            .get_release(self.scope(), &self.target.namespace, release)
            .map_err(remote(resource, "error fetching release"))?;
        self.output = coalesce(&self.source.values, &live.config);
        Ok(())
    }

    fn wait(&self, resource: &str, release: &str, only_create: bool) -> Result<(), DriverError> {
        let Err(error) = wait_for_job(
            self.options.client.as_ref(),
            self.scope(),
            &self.target.namespace,
            release,
            self.options.wait,
        ) else {
            return Ok(());
        };

        if only_create {
            warn!(release, %error, "deleting job release after failed wait");
            self.options
                .client
                .delete_release(self.scope(), &self.target.namespace, release)
                .map_err(|source| DriverError::JobCleanup {
                    resource: resource.to_string(),
                    source,
                })?;
        }
        Err(DriverError::Wait {
            resource: resource.to_string(),
            source: error,
        })
    }
}

impl Driver for DeployDriver {
    fn apply(
        &mut self,
        resource: &Resource,
        outputs: &OutputTable,
    ) -> Result<ApplyOutcome, DriverError> {
        let name = resource.name.as_str();
        let config = Resolver::for_dependencies(outputs, &resource.depends_on)
            .resolve_map(&resource.config)
            .map_err(|source| DriverError::Resolve {
                resource: name.to_string(),
                source,
            })?;
        let release = self.target.release_name(name).to_string();
        let existing = self.probe(&release);

        if !self.source.is_application() {
            self.apply_addon(name, &release, &config, existing.is_some())?;
            self.assign_output(name, &release)?;
            return Ok(ApplyOutcome::Applied);
        }

        let app = decode_application(name, &config, self.source.is_job())?;
        let action = match existing {
            None => {
                self.create_application(name, &release, &app)?;
                ReleaseAction::Created
            }
            Some(_) if app.only_create => {
                info!(release = release.as_str(), "release exists and onlyCreate is set, skipping update");
                ReleaseAction::Skipped
            }
            Some(existing) => {
                self.update_application(name, &release, &app, &existing)?;
                ReleaseAction::Updated
            }
        };
        debug!(release = release.as_str(), ?action, "release applied");

        self.assign_output(name, &release)?;

        if action == ReleaseAction::Skipped {
            return Ok(ApplyOutcome::Unchanged);
        }
        if self.source.is_job() && app.wait_for_job {
            self.wait(name, &release, app.only_create)?;
        }
        Ok(ApplyOutcome::Applied)
    }

    fn output(&self) -> OutputMap {
        self.output.clone()
    }
}

fn remote<'a>(resource: &'a str, action: &'static str) -> impl FnOnce(ClientError) -> DriverError + 'a {
    move |source| DriverError::Remote {
        resource: resource.to_string(),
        action,
        source,
    }
}

fn encode(resource: &str, values: &Map<String, Value>) -> Result<String, DriverError> {
    serde_json::to_string(values).map_err(|source| DriverError::Encode {
        resource: resource.to_string(),
        source,
    })
}

fn decode_application(
    resource: &str,
    config: &Map<String, Value>,
    is_job: bool,
) -> Result<ApplicationConfig, DriverError> {
    let mut app: ApplicationConfig = serde_json::from_value(Value::Object(config.clone()))
        .map_err(|source| DriverError::Config {
            resource: resource.to_string(),
            source,
        })?;
    if is_job && !config.contains_key(WAIT_FOR_JOB_KEY) {
        app.wait_for_job = true;
    }
    Ok(app)
}

fn registry_image(resource: &str, app: &ApplicationConfig) -> Result<ImageRef, DriverError> {
    app.build.image().ok_or_else(|| DriverError::MissingImage {
        resource: resource.to_string(),
    })
}

/// `image.repository` of a deployed release, if it has one.
fn live_repository(config: &Map<String, Value>) -> Option<String> {
    nested_map(config, &["image"])?
        .get("repository")
        .and_then(Value::as_str)
        .filter(|repository| !repository.is_empty())
        .map(str::to_string)
}
