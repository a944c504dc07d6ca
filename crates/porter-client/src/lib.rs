mod error;
mod http;
mod types;

pub use error::ClientError;
pub use http::HttpControlPlane;
pub use types::{
    BuildSettings, CloneEnvGroupRequest, ClusterScope, CreateAddonRequest,
    CreateDeploymentRequest, CreateEnvGroupRequest, CreateNamespaceRequest,
    CreateRegistryRepositoryRequest, CreateReleaseRequest, CreateReleaseResponse, Deployment,
    DeploymentLookup, DeploymentStatus, EnvGroup, Environment, FinalizeDeploymentRequest,
    FinalizeDeploymentWithErrorsRequest, GetEnvGroupRequest, GitHubMetadata, JobStatus,
    JobStatusResponse, Namespace, Registry, RegistryToken, Release, SuccessfullyDeployedResource,
    UpdateDeploymentRequest, UpdateDeploymentStatusRequest, UpgradeReleaseRequest,
};

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Operations the apply pipeline needs from the remote control plane.
///
/// Every call is synchronous. Implementations classify failures so callers can
/// distinguish "not found" and "already exists" from other errors.
pub trait ControlPlane: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the release cannot be read.
    fn get_release(&self, scope: ClusterScope, namespace: &str, name: &str)
    -> ClientResult<Release>;

    /// # Errors
    ///
    /// Returns an error when the addon cannot be installed.
    fn deploy_addon(
        &self,
        scope: ClusterScope,
        namespace: &str,
        request: &CreateAddonRequest,
    ) -> ClientResult<()>;

    /// # Errors
    ///
    /// Returns an error when the release cannot be created.
    fn create_release(
        &self,
        scope: ClusterScope,
        namespace: &str,
        request: &CreateReleaseRequest,
    ) -> ClientResult<CreateReleaseResponse>;

    /// # Errors
    ///
    /// Returns an error when the release cannot be upgraded.
    fn upgrade_release(
        &self,
        scope: ClusterScope,
        namespace: &str,
        name: &str,
        request: &UpgradeReleaseRequest,
    ) -> ClientResult<()>;

    /// # Errors
    ///
    /// Returns an error when the release cannot be deleted.
    fn delete_release(&self, scope: ClusterScope, namespace: &str, name: &str) -> ClientResult<()>;

    /// # Errors
    ///
    /// Returns an error when the job status cannot be read.
    fn get_job_status(
        &self,
        scope: ClusterScope,
        namespace: &str,
        name: &str,
    ) -> ClientResult<JobStatusResponse>;

    /// # Errors
    ///
    /// Returns an error when namespaces cannot be listed.
    fn list_namespaces(&self, scope: ClusterScope) -> ClientResult<Vec<Namespace>>;

    /// # Errors
    ///
    /// Returns an error when the namespace cannot be created, including
    /// [`ClientError::AlreadyExists`] when it was created concurrently.
    fn create_namespace(
        &self,
        scope: ClusterScope,
        request: &CreateNamespaceRequest,
    ) -> ClientResult<Namespace>;

    /// # Errors
    ///
    /// Returns an error when environments cannot be listed.
    fn list_environments(&self, scope: ClusterScope) -> ClientResult<Vec<Environment>>;

    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when no deployment matches.
    fn get_deployment(
        &self,
        scope: ClusterScope,
        environment_id: u64,
        lookup: &DeploymentLookup,
    ) -> ClientResult<Deployment>;

    /// # Errors
    ///
    /// Returns an error when the deployment cannot be created.
    fn create_deployment(
        &self,
        scope: ClusterScope,
        request: &CreateDeploymentRequest,
    ) -> ClientResult<Deployment>;

    /// # Errors
    ///
    /// Returns an error when the deployment cannot be updated.
    fn update_deployment(
        &self,
        scope: ClusterScope,
        request: &UpdateDeploymentRequest,
    ) -> ClientResult<Deployment>;

    /// # Errors
    ///
    /// Returns an error when the deployment status cannot be updated.
    fn update_deployment_status(
        &self,
        scope: ClusterScope,
        request: &UpdateDeploymentStatusRequest,
    ) -> ClientResult<Deployment>;

    /// # Errors
    ///
    /// Returns an error when the deployment cannot be finalized.
    fn finalize_deployment(
        &self,
        scope: ClusterScope,
        request: &FinalizeDeploymentRequest,
    ) -> ClientResult<Deployment>;

    /// # Errors
    ///
    /// Returns an error when the deployment cannot be finalized.
    fn finalize_deployment_with_errors(
        &self,
        scope: ClusterScope,
        request: &FinalizeDeploymentWithErrorsRequest,
    ) -> ClientResult<Deployment>;

    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when the group does not exist in
    /// `namespace`.
    fn get_env_group(
        &self,
        scope: ClusterScope,
        namespace: &str,
        request: &GetEnvGroupRequest,
    ) -> ClientResult<EnvGroup>;

    /// # Errors
    ///
    /// Returns an error when the group cannot be cloned.
    fn clone_env_group(
        &self,
        scope: ClusterScope,
        source_namespace: &str,
        request: &CloneEnvGroupRequest,
    ) -> ClientResult<EnvGroup>;

    /// # Errors
    ///
    /// Returns an error when the group cannot be created or updated.
    fn create_env_group(
        &self,
        scope: ClusterScope,
        namespace: &str,
        request: &CreateEnvGroupRequest,
    ) -> ClientResult<EnvGroup>;

    /// # Errors
    ///
    /// Returns an error when registries cannot be listed.
    fn list_registries(&self, project: u64) -> ClientResult<Vec<Registry>>;

    /// # Errors
    ///
    /// Returns an error when no token can be issued for the registry.
    fn get_registry_token(&self, project: u64, registry_id: u64) -> ClientResult<RegistryToken>;

    /// # Errors
    ///
    /// Returns an error when the repository cannot be created.
    fn create_registry_repository(
        &self,
        project: u64,
        registry_id: u64,
        request: &CreateRegistryRepositoryRequest,
    ) -> ClientResult<()>;
}
