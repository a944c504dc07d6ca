use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use porter_client::{
    ClusterScope, ControlPlane, CreateDeploymentRequest, CreateNamespaceRequest, DeploymentLookup,
    DeploymentStatus, FinalizeDeploymentRequest, FinalizeDeploymentWithErrorsRequest,
    GitHubMetadata, SuccessfullyDeployedResource, UpdateDeploymentRequest,
    UpdateDeploymentStatusRequest,
};
use porter_domain::{Resource, ResourceGroup};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::env::{
    ACTION_ID_VAR, ApplyEnv, BRANCH_FROM_VAR, BRANCH_INTO_VAR, GIT_INSTALLATION_ID_VAR,
    PR_NAME_VAR, PULL_REQUEST_ID_VAR, REPO_NAME_VAR, REPO_OWNER_VAR,
};
use crate::error::{ApplyError, DriverError, HookError};
use crate::git::RevisionSource;
use crate::values::nested_map;
use crate::worker::Hook;

/// Namespaces that belong to the cluster itself.
pub const SYSTEM_NAMESPACES: [&str; 9] = [
    "cert-manager",
    "ingress-nginx",
    "kube-node-lease",
    "kube-public",
    "kube-system",
    "monitoring",
    "porter-agent-system",
    "default",
    "ingress-nginx-private",
];

#[must_use]
pub fn is_system_namespace(namespace: &str) -> bool {
    SYSTEM_NAMESPACES.contains(&namespace)
}

/// Keeps the preview-environment deployment record in sync with the run:
/// registers the deployment before anything is applied and finalizes it,
/// successfully or with errors, afterwards.
pub struct DeploymentHook {
    client: Arc<dyn ControlPlane>,
    scope: ClusterScope,
    namespace: String,
    git_installation_id: u64,
    pull_request_id: u64,
    action_id: u64,
    branch_from: String,
    branch_into: String,
    repo_name: String,
    repo_owner: String,
    pr_name: String,
    commit_sha: String,
    environment_id: Option<u64>,
}

fn parse_number(env: &ApplyEnv, name: &'static str) -> Result<u64, HookError> {
    let value = env.get(name).unwrap_or_default();
    value.parse().map_err(|source| HookError::InvalidNumber {
        name,
        value: value.to_string(),
        source,
    })
}

fn text(env: &ApplyEnv, name: &str) -> String {
    env.get(name).unwrap_or_default().to_string()
}

impl DeploymentHook {
    /// Read the deployment context from `env` and the CLI configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when `PORTER_NAMESPACE` is unset, a numeric variable
    /// does not parse, project or cluster is zero or missing, or the current
    /// commit cannot be read from `base_path`.
    pub fn new(
        client: Arc<dyn ControlPlane>,
        env: &ApplyEnv,
        project: Option<u64>,
        cluster: Option<u64>,
        revisions: &dyn RevisionSource,
        base_path: &Path,
    ) -> Result<Self, HookError> {
        let namespace = env
            .namespace()
            .ok_or(HookError::MissingNamespace)?
            .to_string();
        let git_installation_id = parse_number(env, GIT_INSTALLATION_ID_VAR)?;
        let pull_request_id = parse_number(env, PULL_REQUEST_ID_VAR)?;
        let project = project
            .filter(|id| *id != 0)
            .ok_or(HookError::MissingProject)?;
        let cluster = cluster
            .filter(|id| *id != 0)
            .ok_or(HookError::MissingCluster)?;
        let action_id = parse_number(env, ACTION_ID_VAR)?;
        let commit_sha = revisions
            .short_sha(base_path)
            .map_err(|source| HookError::Git { source })?;

        Ok(Self {
            client,
            scope: ClusterScope::new(project, cluster),
            namespace,
            git_installation_id,
            pull_request_id,
            action_id,
            branch_from: text(env, BRANCH_FROM_VAR),
            branch_into: text(env, BRANCH_INTO_VAR),
            repo_name: text(env, REPO_NAME_VAR),
            repo_owner: text(env, REPO_OWNER_VAR),
            pr_name: text(env, PR_NAME_VAR),
            commit_sha,
            environment_id: None,
        })
    }

    /// A branch deploy tracks a branch rather than a pull request.
    #[must_use]
    pub fn is_branch_deploy(&self) -> bool {
        !self.branch_from.is_empty()
            && !self.branch_into.is_empty()
            && self.branch_from == self.branch_into
    }

    fn lookup(&self) -> DeploymentLookup {
        if self.is_branch_deploy() {
            DeploymentLookup::Branch(self.branch_from.clone())
        } else {
            DeploymentLookup::PullRequest(self.pull_request_id)
        }
    }

    fn pr_number(&self) -> Option<u64> {
        (!self.is_branch_deploy()).then_some(self.pull_request_id)
    }

    fn branch_namespace(&self) -> Option<String> {
        self.is_branch_deploy().then(|| self.namespace.clone())
    }

    fn ensure_namespace(&self, labels: BTreeMap<String, String>) -> Result<(), HookError> {
        let namespaces = self
            .client
            .list_namespaces(self.scope)
            .map_err(|source| HookError::Remote {
                action: "error fetching namespaces",
                source,
            })?;
        if namespaces.iter().any(|ns| ns.name == self.namespace) {
            return Ok(());
        }
        if is_system_namespace(&self.namespace) {
            return Err(HookError::SystemNamespaceMissing {
                namespace: self.namespace.clone(),
            });
        }

        info!(namespace = self.namespace.as_str(), "creating namespace");
        match self.client.create_namespace(
            self.scope,
            &CreateNamespaceRequest {
                name: self.namespace.clone(),
                labels,
            },
        ) {
            Ok(_) => Ok(()),
            Err(error) if error.is_already_exists() => {
                debug!(namespace = self.namespace.as_str(), "namespace was created concurrently");
                Ok(())
            }
            Err(source) => Err(HookError::Remote {
                action: "error creating namespace",
                source,
            }),
        }
    }

    fn upsert_deployment(&self, environment_id: u64) -> Result<(), HookError> {
        match self
            .client
            .get_deployment(self.scope, environment_id, &self.lookup())
        {
            Ok(_) => {
                info!(namespace = self.namespace.as_str(), "updating deployment");
                self.client
                    .update_deployment(
                        self.scope,
                        &UpdateDeploymentRequest {
                            repo_owner: self.repo_owner.clone(),
                            repo_name: self.repo_name.clone(),
                            namespace: self.namespace.clone(),
                            pr_number: self.pr_number(),
                            action_id: self.action_id,
                            pr_branch_from: self.branch_from.clone(),
                            commit_sha: self.commit_sha.clone(),
                        },
                    )
                    .map_err(|source| HookError::Remote {
                        action: "error updating deployment",
                        source,
                    })?;
            }
            Err(error) if error.is_not_found() => {
                info!(namespace = self.namespace.as_str(), "creating deployment");
                self.client
                    .create_deployment(
                        self.scope,
                        &CreateDeploymentRequest {
                            namespace: self.namespace.clone(),
                            pull_request_id: self.pr_number(),
                            action_id: self.action_id,
                            github_metadata: GitHubMetadata {
                                pr_name: self.pr_name.clone(),
                                repo_name: self.repo_name.clone(),
                                repo_owner: self.repo_owner.clone(),
                                commit_sha: self.commit_sha.clone(),
                                pr_branch_from: self.branch_from.clone(),
                                pr_branch_into: self.branch_into.clone(),
                            },
                        },
                    )
                    .map_err(|source| HookError::Remote {
                        action: "error creating deployment",
                        source,
                    })?;
            }
            Err(source) => {
                return Err(HookError::Remote {
                    action: "error fetching deployment",
                    source,
                });
            }
        }
        Ok(())
    }

    /// Whether the deployment record exists, for the reporting paths.
    fn deployment_exists(&self) -> bool {
        let Some(environment_id) = self.environment_id else {
            debug!("no environment resolved, skipping deployment status report");
            return false;
        };
        match self
            .client
            .get_deployment(self.scope, environment_id, &self.lookup())
        {
            Ok(_) => true,
            Err(error) => {
                debug!(%error, "deployment not available for status report");
                false
            }
        }
    }
}

/// Release name and type for each resource that deploys a chart.
fn successful_resources<'a>(
    resources: impl Iterator<Item = &'a Resource>,
) -> Vec<SuccessfullyDeployedResource> {
    resources
        .filter_map(|resource| {
            let release_type = resource.source_name()?;
            let release_name = resource
                .target
                .get("app_name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .unwrap_or(resource.name.as_str());
            Some(SuccessfullyDeployedResource {
                release_name: release_name.to_string(),
                release_type: release_type.to_string(),
            })
        })
        .collect()
}

fn has_custom_domain(resource: &Resource) -> bool {
    let Some(ingress) = nested_map(&resource.config, &["values", "ingress"]) else {
        return false;
    };
    let flag = |key: &str| ingress.get(key).and_then(Value::as_bool) == Some(true);
    flag("enabled")
        && flag("custom_domain")
        && ingress
            .get("hosts")
            .and_then(Value::as_array)
            .and_then(|hosts| hosts.first())
            .and_then(Value::as_str)
            .is_some_and(|host| !host.is_empty())
}

impl Hook for DeploymentHook {
    fn pre_apply(&mut self, _group: &ResourceGroup) -> Result<(), HookError> {
        if is_system_namespace(&self.namespace) {
            warn!(namespace = self.namespace.as_str(), "attempting to deploy to system namespace");
        }

        let environments = self
            .client
            .list_environments(self.scope)
            .map_err(|source| HookError::Remote {
                action: "error listing environments",
                source,
            })?;
        let environment = environments
            .into_iter()
            .find(|environment| {
                environment.git_repo_owner.eq_ignore_ascii_case(&self.repo_owner)
                    && environment.git_repo_name.eq_ignore_ascii_case(&self.repo_name)
                    && environment.git_installation_id == self.git_installation_id
            })
            .ok_or(HookError::EnvironmentNotFound)?;
        debug!(environment = environment.id, "resolved preview environment");
        self.environment_id = Some(environment.id);

        self.ensure_namespace(environment.namespace_labels)?;
        self.upsert_deployment(environment.id)
    }

    fn data_queries(&self, group: &ResourceGroup) -> BTreeMap<String, Value> {
        group
            .resources
            .iter()
            .filter(|resource| resource.source_name() == Some("web"))
            .map(|resource| {
                let field = if has_custom_domain(resource) {
                    "hosts"
                } else {
                    "porter_hosts"
                };
                (
                    resource.name.to_string(),
                    Value::String(format!("{{ .{}.ingress.{field}[0] }}", resource.name)),
                )
            })
            .collect()
    }

    fn post_apply(
        &mut self,
        group: &ResourceGroup,
        populated: &BTreeMap<String, Value>,
    ) -> Result<(), HookError> {
        let mut subdomains: Vec<String> = Vec::new();
        for domain in populated.values().filter_map(Value::as_str) {
            let candidate = format!("https://{domain}");
            if Url::parse(&candidate).is_ok() && !subdomains.contains(&candidate) {
                subdomains.push(candidate);
            }
        }

        info!(subdomains = subdomains.len(), "finalizing deployment");
        self.client
            .finalize_deployment(
                self.scope,
                &FinalizeDeploymentRequest {
                    repo_owner: self.repo_owner.clone(),
                    repo_name: self.repo_name.clone(),
                    subdomain: subdomains.join(", "),
                    namespace: self.branch_namespace(),
                    pr_number: self.pr_number(),
                    successful_resources: successful_resources(group.resources.iter()),
                },
            )
            .map_err(|source| HookError::Remote {
                action: "error finalizing deployment",
                source,
            })?;
        Ok(())
    }

    fn on_error(&mut self, _error: &ApplyError) {
        if !self.deployment_exists() {
            return;
        }
        let request = UpdateDeploymentStatusRequest {
            repo_owner: self.repo_owner.clone(),
            repo_name: self.repo_name.clone(),
            action_id: self.action_id,
            pr_branch_from: self.branch_from.clone(),
            status: DeploymentStatus::Failed,
            namespace: self.branch_namespace(),
            pr_number: self.pr_number(),
        };
        if let Err(error) = self.client.update_deployment_status(self.scope, &request) {
            warn!(%error, "could not mark deployment as failed");
        }
    }

    fn on_consolidated_errors(
        &mut self,
        group: &ResourceGroup,
        errors: &BTreeMap<String, DriverError>,
        applied: &BTreeSet<String>,
    ) {
        if !self.deployment_exists() {
            return;
        }
        let request = FinalizeDeploymentWithErrorsRequest {
            repo_owner: self.repo_owner.clone(),
            repo_name: self.repo_name.clone(),
            namespace: self.branch_namespace(),
            pr_number: self.pr_number(),
            successful_resources: successful_resources(
                group
                    .resources
                    .iter()
                    .filter(|resource| applied.contains(resource.name.as_str())),
            ),
            errors: errors
                .iter()
                .map(|(name, error)| (name.clone(), error.to_string()))
                .collect(),
        };
        if let Err(error) = self
            .client
            .finalize_deployment_with_errors(self.scope, &request)
        {
            warn!(%error, "could not finalize deployment with errors");
        }
    }
}
