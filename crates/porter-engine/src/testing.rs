//! In-memory stand-ins for the control plane and local toolchain.

#![allow(clippy::expect_used)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use porter_client::{
    ClientError, ClientResult, CloneEnvGroupRequest, ClusterScope, ControlPlane,
    CreateAddonRequest, CreateDeploymentRequest, CreateEnvGroupRequest, CreateNamespaceRequest,
    CreateRegistryRepositoryRequest, CreateReleaseRequest, CreateReleaseResponse, Deployment,
    DeploymentLookup, DeploymentStatus, EnvGroup, Environment, FinalizeDeploymentRequest,
    FinalizeDeploymentWithErrorsRequest, GetEnvGroupRequest, JobStatus, JobStatusResponse,
    Namespace, Registry, RegistryToken, Release, UpdateDeploymentRequest,
    UpdateDeploymentStatusRequest, UpgradeReleaseRequest,
};
use porter_domain::ImageRef;
use serde_json::{Map, Value};

use crate::build::{BuildRequest, ImageBuilder};
use crate::error::{BuildError, GitError};
use crate::git::RevisionSource;

#[derive(Debug, Default)]
pub struct FakeState {
    pub releases: BTreeMap<(String, String), Release>,
    pub job_statuses: VecDeque<JobStatusResponse>,
    pub namespaces: Vec<String>,
    pub environments: Vec<Environment>,
    pub deployment: Option<Deployment>,
    pub env_groups: BTreeMap<(String, String), EnvGroup>,
    pub registries: Vec<Registry>,
    /// Operations that fail with a generic API error.
    pub failing: BTreeSet<&'static str>,
    /// Operations whose next call fails with a generic API error.
    pub failing_once: BTreeSet<&'static str>,
    /// Operations that fail as forbidden.
    pub forbidden: BTreeSet<&'static str>,

    pub calls: Vec<String>,
    pub addons: Vec<CreateAddonRequest>,
    pub created_releases: Vec<CreateReleaseRequest>,
    pub upgrades: Vec<(String, UpgradeReleaseRequest)>,
    pub deleted: Vec<String>,
    pub created_namespaces: Vec<CreateNamespaceRequest>,
    pub created_deployments: Vec<CreateDeploymentRequest>,
    pub updated_deployments: Vec<UpdateDeploymentRequest>,
    pub status_updates: Vec<UpdateDeploymentStatusRequest>,
    pub finalized: Vec<FinalizeDeploymentRequest>,
    pub finalized_with_errors: Vec<FinalizeDeploymentWithErrorsRequest>,
    pub cloned_env_groups: Vec<(String, CloneEnvGroupRequest)>,
    pub created_env_groups: Vec<(String, CreateEnvGroupRequest)>,
    pub created_repositories: Vec<CreateRegistryRepositoryRequest>,
    pub subdomain: Option<String>,
}

#[derive(Debug, Default)]
pub struct FakeControlPlane {
    state: Mutex<FakeState>,
}

impl FakeControlPlane {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state lock")
    }

    pub fn with_release(self, namespace: &str, name: &str, config: Value) -> Self {
        self.state().releases.insert(
            (namespace.to_string(), name.to_string()),
            Release {
                name: name.to_string(),
                namespace: namespace.to_string(),
                version: 1,
                config: config.as_object().cloned().unwrap_or_default(),
            },
        );
        self
    }

    pub fn with_registry(self, id: u64, url: &str) -> Self {
        self.state().registries.push(Registry {
            id,
            name: format!("registry-{id}"),
            url: url.to_string(),
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    fn enter(&self, operation: &'static str) -> ClientResult<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(operation.to_string());
        if state.forbidden.contains(operation) {
            return Err(ClientError::Forbidden {
                message: format!("{operation}: Forbidden"),
            });
        }
        if state.failing.contains(operation) || state.failing_once.remove(operation) {
            return Err(ClientError::Api {
                status: 500,
                message: format!("{operation} failed"),
            });
        }
        Ok(state)
    }
}

fn release_key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

fn store_release(state: &mut FakeState, namespace: &str, name: &str, values: &Map<String, Value>) {
    state.releases.insert(
        release_key(namespace, name),
        Release {
            name: name.to_string(),
            namespace: namespace.to_string(),
            version: 1,
            config: values.clone(),
        },
    );
}

impl ControlPlane for FakeControlPlane {
    fn get_release(&self, _scope: ClusterScope, namespace: &str, name: &str) -> ClientResult<Release> {
        let state = self.enter("get_release")?;
        state
            .releases
            .get(&release_key(namespace, name))
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                message: format!("release {name} not found"),
            })
    }

    fn deploy_addon(
        &self,
        _scope: ClusterScope,
        namespace: &str,
        request: &CreateAddonRequest,
    ) -> ClientResult<()> {
        let mut state = self.enter("deploy_addon")?;
        store_release(&mut state, namespace, &request.name, &request.values);
        state.addons.push(request.clone());
        Ok(())
    }

    fn create_release(
        &self,
        _scope: ClusterScope,
        namespace: &str,
        request: &CreateReleaseRequest,
    ) -> ClientResult<CreateReleaseResponse> {
        let mut state = self.enter("create_release")?;
        store_release(&mut state, namespace, &request.name, &request.values);
        state.created_releases.push(request.clone());
        Ok(CreateReleaseResponse {
            subdomain: state.subdomain.clone(),
        })
    }

    fn upgrade_release(
        &self,
        _scope: ClusterScope,
        namespace: &str,
        name: &str,
        request: &UpgradeReleaseRequest,
    ) -> ClientResult<()> {
        let mut state = self.enter("upgrade_release")?;
        let values: Map<String, Value> =
            serde_json::from_str(&request.values).expect("upgrade values are a JSON object");
        store_release(&mut state, namespace, name, &values);
        state.upgrades.push((name.to_string(), request.clone()));
        Ok(())
    }

    fn delete_release(&self, _scope: ClusterScope, namespace: &str, name: &str) -> ClientResult<()> {
        let mut state = self.enter("delete_release")?;
        state.releases.remove(&release_key(namespace, name));
        state.deleted.push(name.to_string());
        Ok(())
    }

    fn get_job_status(
        &self,
        _scope: ClusterScope,
        _namespace: &str,
        _name: &str,
    ) -> ClientResult<JobStatusResponse> {
        let mut state = self.enter("get_job_status")?;
        Ok(state.job_statuses.pop_front().unwrap_or(JobStatusResponse {
            status: JobStatus::Running,
            message: None,
        }))
    }

    fn list_namespaces(&self, _scope: ClusterScope) -> ClientResult<Vec<Namespace>> {
        let state = self.enter("list_namespaces")?;
        Ok(state
            .namespaces
            .iter()
            .map(|name| Namespace { name: name.clone() })
            .collect())
    }

    fn create_namespace(
        &self,
        _scope: ClusterScope,
        request: &CreateNamespaceRequest,
    ) -> ClientResult<Namespace> {
        let mut state = self.enter("create_namespace")?;
        state.created_namespaces.push(request.clone());
        if state.namespaces.contains(&request.name) {
            return Err(ClientError::AlreadyExists {
                message: format!("namespace {} already exists", request.name),
            });
        }
        state.namespaces.push(request.name.clone());
        Ok(Namespace {
            name: request.name.clone(),
        })
    }

    fn list_environments(&self, _scope: ClusterScope) -> ClientResult<Vec<Environment>> {
        Ok(self.enter("list_environments")?.environments.clone())
    }

    fn get_deployment(
        &self,
        _scope: ClusterScope,
        _environment_id: u64,
        _lookup: &DeploymentLookup,
    ) -> ClientResult<Deployment> {
        self.enter("get_deployment")?
            .deployment
            .clone()
            .ok_or_else(|| ClientError::NotFound {
                message: "deployment not found".to_string(),
            })
    }

    fn create_deployment(
        &self,
        _scope: ClusterScope,
        request: &CreateDeploymentRequest,
    ) -> ClientResult<Deployment> {
        let mut state = self.enter("create_deployment")?;
        let deployment = Deployment {
            id: 1,
            environment_id: 1,
            namespace: request.namespace.clone(),
            status: DeploymentStatus::Creating,
            subdomain: String::new(),
            pull_request_id: request.pull_request_id.unwrap_or_default(),
            commit_sha: request.github_metadata.commit_sha.clone(),
        };
        state.deployment = Some(deployment.clone());
        state.created_deployments.push(request.clone());
        Ok(deployment)
    }

    fn update_deployment(
        &self,
        _scope: ClusterScope,
        request: &UpdateDeploymentRequest,
    ) -> ClientResult<Deployment> {
        let mut state = self.enter("update_deployment")?;
        state.updated_deployments.push(request.clone());
        state
            .deployment
            .clone()
            .ok_or_else(|| ClientError::NotFound {
                message: "deployment not found".to_string(),
            })
    }

    fn update_deployment_status(
        &self,
        _scope: ClusterScope,
        request: &UpdateDeploymentStatusRequest,
    ) -> ClientResult<Deployment> {
        let mut state = self.enter("update_deployment_status")?;
        state.status_updates.push(request.clone());
        let mut deployment = state.deployment.clone().ok_or_else(|| ClientError::NotFound {
            message: "deployment not found".to_string(),
        })?;
        deployment.status = request.status;
        Ok(deployment)
    }

    fn finalize_deployment(
        &self,
        _scope: ClusterScope,
        request: &FinalizeDeploymentRequest,
    ) -> ClientResult<Deployment> {
        let mut state = self.enter("finalize_deployment")?;
        state.finalized.push(request.clone());
        let mut deployment = state.deployment.clone().ok_or_else(|| ClientError::NotFound {
            message: "deployment not found".to_string(),
        })?;
        deployment.status = DeploymentStatus::Created;
        Ok(deployment)
    }

    fn finalize_deployment_with_errors(
        &self,
        _scope: ClusterScope,
        request: &FinalizeDeploymentWithErrorsRequest,
    ) -> ClientResult<Deployment> {
        let mut state = self.enter("finalize_deployment_with_errors")?;
        state.finalized_with_errors.push(request.clone());
        let mut deployment = state.deployment.clone().ok_or_else(|| ClientError::NotFound {
            message: "deployment not found".to_string(),
        })?;
        deployment.status = DeploymentStatus::Failed;
        Ok(deployment)
    }

    fn get_env_group(
        &self,
        _scope: ClusterScope,
        namespace: &str,
        request: &GetEnvGroupRequest,
    ) -> ClientResult<EnvGroup> {
        self.enter("get_env_group")?
            .env_groups
            .get(&(namespace.to_string(), request.name.clone()))
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                message: format!("env group {} not found", request.name),
            })
    }

    fn clone_env_group(
        &self,
        _scope: ClusterScope,
        source_namespace: &str,
        request: &CloneEnvGroupRequest,
    ) -> ClientResult<EnvGroup> {
        let mut state = self.enter("clone_env_group")?;
        let group = EnvGroup {
            name: request.source_name.clone(),
            namespace: request.target_namespace.clone(),
            version: 1,
            variables: BTreeMap::new(),
        };
        state.env_groups.insert(
            (request.target_namespace.clone(), request.source_name.clone()),
            group.clone(),
        );
        state
            .cloned_env_groups
            .push((source_namespace.to_string(), request.clone()));
        Ok(group)
    }

    fn create_env_group(
        &self,
        _scope: ClusterScope,
        namespace: &str,
        request: &CreateEnvGroupRequest,
    ) -> ClientResult<EnvGroup> {
        let mut state = self.enter("create_env_group")?;
        let group = EnvGroup {
            name: request.name.clone(),
            namespace: namespace.to_string(),
            version: 1,
            variables: request.variables.clone(),
        };
        state
            .env_groups
            .insert((namespace.to_string(), request.name.clone()), group.clone());
        state
            .created_env_groups
            .push((namespace.to_string(), request.clone()));
        Ok(group)
    }

    fn list_registries(&self, _project: u64) -> ClientResult<Vec<Registry>> {
        Ok(self.enter("list_registries")?.registries.clone())
    }

    fn get_registry_token(&self, _project: u64, _registry_id: u64) -> ClientResult<RegistryToken> {
        drop(self.enter("get_registry_token")?);
        Ok(RegistryToken {
            token: "registry-token".to_string(),
            username: None,
        })
    }

    fn create_registry_repository(
        &self,
        _project: u64,
        _registry_id: u64,
        request: &CreateRegistryRepositoryRequest,
    ) -> ClientResult<()> {
        let mut state = self.enter("create_registry_repository")?;
        state.created_repositories.push(request.clone());
        Ok(())
    }
}

/// Records toolchain invocations instead of running them.
#[derive(Debug, Default)]
pub struct FakeImageBuilder {
    events: Mutex<Vec<String>>,
    builds: Mutex<Vec<BuildRequest>>,
}

impl FakeImageBuilder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn builds(&self) -> Vec<BuildRequest> {
        self.builds.lock().expect("builds lock").clone()
    }
}

impl ImageBuilder for FakeImageBuilder {
    fn login(&self, registry: &str, _token: &RegistryToken) -> Result<(), BuildError> {
        self.events
            .lock()
            .expect("events lock")
            .push(format!("login {registry}"));
        Ok(())
    }

    fn build(&self, request: &BuildRequest) -> Result<(), BuildError> {
        self.events
            .lock()
            .expect("events lock")
            .push(format!("build {}", request.image));
        self.builds.lock().expect("builds lock").push(request.clone());
        Ok(())
    }

    fn push(&self, image: &ImageRef) -> Result<(), BuildError> {
        self.events
            .lock()
            .expect("events lock")
            .push(format!("push {image}"));
        Ok(())
    }
}

/// Always reports the same commit.
#[derive(Debug, Clone, Copy)]
pub struct FixedRevision(pub &'static str);

impl RevisionSource for FixedRevision {
    fn short_sha(&self, _path: &Path) -> Result<String, GitError> {
        Ok(self.0.to_string())
    }
}
