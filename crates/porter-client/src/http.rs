use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::ClientError;
use crate::types::{
    CloneEnvGroupRequest, ClusterScope, CreateAddonRequest, CreateDeploymentRequest,
    CreateEnvGroupRequest, CreateNamespaceRequest, CreateRegistryRepositoryRequest,
    CreateReleaseRequest, CreateReleaseResponse, Deployment, DeploymentLookup, EnvGroup,
    Environment, FinalizeDeploymentRequest, FinalizeDeploymentWithErrorsRequest,
    GetEnvGroupRequest, JobStatusResponse, Namespace, Registry, RegistryToken, Release,
    UpdateDeploymentRequest, UpdateDeploymentStatusRequest, UpgradeReleaseRequest,
};
use crate::{ClientResult, ControlPlane};

const USER_AGENT: &str = concat!("porter-cli/", env!("CARGO_PKG_VERSION"));

/// [`ControlPlane`] backed by the control plane's JSON REST API.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    base: Url,
    token: Option<String>,
    client: Client,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpControlPlane {
    /// Create a client for the API served at `host`.
    ///
    /// # Errors
    ///
    /// Returns an error when `host` is not an absolute http(s) URL or the HTTP
    /// client cannot be initialised.
    pub fn new(host: &str, token: Option<String>) -> ClientResult<Self> {
        let mut base = Url::parse(host).map_err(|source| ClientError::InvalidHost {
            host: host.to_string(),
            source,
        })?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(ClientError::UnsupportedHost {
                host: host.to_string(),
            });
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| ClientError::HttpClient { source })?;

        Ok(Self {
            base,
            token: token.filter(|token| !token.is_empty()),
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::UnsupportedHost {
                host: self.base.to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        let builder = self.client.request(method, url.clone());
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send `builder` and return the response body, mapping non-success
    /// statuses to classified errors.
    fn send(&self, builder: RequestBuilder, method: &Method, url: &Url) -> ClientResult<String> {
        debug!(%method, %url, "control plane request");
        let response = builder.send().map_err(|source| ClientError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        let body = response.text().map_err(|source| ClientError::Transport {
            url: url.to_string(),
            source,
        })?;

        if status.is_success() {
            return Ok(body);
        }

        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|parsed| parsed.error)
            .ok()
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        debug!(%url, status = status.as_u16(), %message, "control plane error");
        Err(ClientError::from_response(status.as_u16(), message))
    }

    fn decode<T: DeserializeOwned>(url: &Url, body: &str) -> ClientResult<T> {
        serde_json::from_str(body).map_err(|source| ClientError::Decode {
            url: url.to_string(),
            source,
        })
    }

    fn get_json<T: DeserializeOwned>(&self, url: &Url) -> ClientResult<T> {
        let body = self.send(self.request(Method::GET, url), &Method::GET, url)?;
        Self::decode(url, &body)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, url: &Url, payload: &B) -> ClientResult<T> {
        let body = self.send(
            self.request(Method::POST, url).json(payload),
            &Method::POST,
            url,
        )?;
        Self::decode(url, &body)
    }

    fn post_unit<B: Serialize>(&self, url: &Url, payload: &B) -> ClientResult<()> {
        self.send(
            self.request(Method::POST, url).json(payload),
            &Method::POST,
            url,
        )
        .map(|_| ())
    }
}

fn cluster_segments(scope: ClusterScope) -> [String; 5] {
    [
        "api".to_string(),
        "projects".to_string(),
        scope.project.to_string(),
        "clusters".to_string(),
        scope.cluster.to_string(),
    ]
}

fn cluster_path<'a>(prefix: &'a [String; 5], rest: &[&'a str]) -> Vec<&'a str> {
    prefix
        .iter()
        .map(String::as_str)
        .chain(rest.iter().copied())
        .collect()
}

impl ControlPlane for HttpControlPlane {
    fn get_release(
        &self,
        scope: ClusterScope,
        namespace: &str,
        name: &str,
    ) -> ClientResult<Release> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(
            &prefix,
            &["namespaces", namespace, "releases", name, "0"],
        ))?;
        self.get_json(&url)
    }

    fn deploy_addon(
        &self,
        scope: ClusterScope,
        namespace: &str,
        request: &CreateAddonRequest,
    ) -> ClientResult<()> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(&prefix, &["namespaces", namespace, "addons"]))?;
        self.post_unit(&url, request)
    }

    fn create_release(
        &self,
        scope: ClusterScope,
        namespace: &str,
        request: &CreateReleaseRequest,
    ) -> ClientResult<CreateReleaseResponse> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(&prefix, &["namespaces", namespace, "releases"]))?;
        let body = self.send(
            self.request(Method::POST, &url).json(request),
            &Method::POST,
            &url,
        )?;
        if body.trim().is_empty() {
            return Ok(CreateReleaseResponse::default());
        }
        Self::decode(&url, &body)
    }

    fn upgrade_release(
        &self,
        scope: ClusterScope,
        namespace: &str,
        name: &str,
        request: &UpgradeReleaseRequest,
    ) -> ClientResult<()> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(
            &prefix,
            &["namespaces", namespace, "releases", name, "0", "upgrade"],
        ))?;
        self.post_unit(&url, request)
    }

    fn delete_release(&self, scope: ClusterScope, namespace: &str, name: &str) -> ClientResult<()> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(
            &prefix,
            &["namespaces", namespace, "releases", name, "0"],
        ))?;
        self.send(self.request(Method::DELETE, &url), &Method::DELETE, &url)
            .map(|_| ())
    }

    fn get_job_status(
        &self,
        scope: ClusterScope,
        namespace: &str,
        name: &str,
    ) -> ClientResult<JobStatusResponse> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(
            &prefix,
            &["namespaces", namespace, "releases", name, "0", "jobs", "status"],
        ))?;
        self.get_json(&url)
    }

    fn list_namespaces(&self, scope: ClusterScope) -> ClientResult<Vec<Namespace>> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(&prefix, &["namespaces"]))?;
        self.get_json(&url)
    }

    fn create_namespace(
        &self,
        scope: ClusterScope,
        request: &CreateNamespaceRequest,
    ) -> ClientResult<Namespace> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(&prefix, &["namespaces", "create"]))?;
        self.post_json(&url, request)
    }

    fn list_environments(&self, scope: ClusterScope) -> ClientResult<Vec<Environment>> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(&prefix, &["environments"]))?;
        self.get_json(&url)
    }

    fn get_deployment(
        &self,
        scope: ClusterScope,
        environment_id: u64,
        lookup: &DeploymentLookup,
    ) -> ClientResult<Deployment> {
        let prefix = cluster_segments(scope);
        let environment = environment_id.to_string();
        let mut url = self.endpoint(&cluster_path(
            &prefix,
            &["environments", environment.as_str(), "deployment"],
        ))?;
        match lookup {
            DeploymentLookup::Branch(branch) => {
                url.query_pairs_mut().append_pair("branch", branch);
            }
            DeploymentLookup::PullRequest(number) => {
                url.query_pairs_mut()
                    .append_pair("pr_number", &number.to_string());
            }
        }
        self.get_json(&url)
    }

    fn create_deployment(
        &self,
        scope: ClusterScope,
        request: &CreateDeploymentRequest,
    ) -> ClientResult<Deployment> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(&prefix, &["deployments"]))?;
        self.post_json(&url, request)
    }

    fn update_deployment(
        &self,
        scope: ClusterScope,
        request: &UpdateDeploymentRequest,
    ) -> ClientResult<Deployment> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(&prefix, &["deployments", "update"]))?;
        self.post_json(&url, request)
    }

    fn update_deployment_status(
        &self,
        scope: ClusterScope,
        request: &UpdateDeploymentStatusRequest,
    ) -> ClientResult<Deployment> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(
            &prefix,
            &["deployments", "update", "status"],
        ))?;
        self.post_json(&url, request)
    }

    fn finalize_deployment(
        &self,
        scope: ClusterScope,
        request: &FinalizeDeploymentRequest,
    ) -> ClientResult<Deployment> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(&prefix, &["deployments", "finalize"]))?;
        self.post_json(&url, request)
    }

    fn finalize_deployment_with_errors(
        &self,
        scope: ClusterScope,
        request: &FinalizeDeploymentWithErrorsRequest,
    ) -> ClientResult<Deployment> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(
            &prefix,
            &["deployments", "finalize_errors"],
        ))?;
        self.post_json(&url, request)
    }

    fn get_env_group(
        &self,
        scope: ClusterScope,
        namespace: &str,
        request: &GetEnvGroupRequest,
    ) -> ClientResult<EnvGroup> {
        let prefix = cluster_segments(scope);
        let mut url =
            self.endpoint(&cluster_path(&prefix, &["namespaces", namespace, "envgroup"]))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("name", &request.name);
            if let Some(version) = request.version {
                query.append_pair("version", &version.to_string());
            }
        }
        self.get_json(&url)
    }

    fn clone_env_group(
        &self,
        scope: ClusterScope,
        source_namespace: &str,
        request: &CloneEnvGroupRequest,
    ) -> ClientResult<EnvGroup> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(
            &prefix,
            &["namespaces", source_namespace, "envgroup", "clone"],
        ))?;
        self.post_json(&url, request)
    }

    fn create_env_group(
        &self,
        scope: ClusterScope,
        namespace: &str,
        request: &CreateEnvGroupRequest,
    ) -> ClientResult<EnvGroup> {
        let prefix = cluster_segments(scope);
        let url = self.endpoint(&cluster_path(
            &prefix,
            &["namespaces", namespace, "envgroup", "create"],
        ))?;
        self.post_json(&url, request)
    }

    fn list_registries(&self, project: u64) -> ClientResult<Vec<Registry>> {
        let project = project.to_string();
        let url = self.endpoint(&["api", "projects", project.as_str(), "registries"])?;
        self.get_json(&url)
    }

    fn get_registry_token(&self, project: u64, registry_id: u64) -> ClientResult<RegistryToken> {
        let project = project.to_string();
        let registry = registry_id.to_string();
        let url = self.endpoint(&[
            "api",
            "projects",
            project.as_str(),
            "registries",
            registry.as_str(),
            "token",
        ])?;
        self.get_json(&url)
    }

    fn create_registry_repository(
        &self,
        project: u64,
        registry_id: u64,
        request: &CreateRegistryRepositoryRequest,
    ) -> ClientResult<()> {
        let project = project.to_string();
        let registry = registry_id.to_string();
        let url = self.endpoint(&[
            "api",
            "projects",
            project.as_str(),
            "registries",
            registry.as_str(),
            "repository",
        ])?;
        self.post_unit(&url, request)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use mockito::Matcher;
    use serde_json::json;

    use super::HttpControlPlane;
    use crate::types::{
        ClusterScope, CreateNamespaceRequest, DeploymentLookup, DeploymentStatus,
        GetEnvGroupRequest, UpgradeReleaseRequest,
    };
    use crate::{ClientError, ControlPlane};

    const SCOPE: ClusterScope = ClusterScope::new(1, 2);

    fn client(server: &mockito::Server) -> HttpControlPlane {
        HttpControlPlane::new(&server.url(), Some("secret".to_string())).expect("client")
    }

    #[test]
    fn rejects_non_http_hosts() {
        let error = HttpControlPlane::new("not a url", None).expect_err("must fail");
        assert!(matches!(error, ClientError::InvalidHost { .. }));

        let error = HttpControlPlane::new("mailto:ops@example.com", None).expect_err("must fail");
        assert!(matches!(error, ClientError::UnsupportedHost { .. }));
    }

    #[test]
    fn keeps_host_path_prefix() {
        let client = HttpControlPlane::new("https://dashboard.example.com/porter", None)
            .expect("client");
        assert_eq!(
            client.base_url().as_str(),
            "https://dashboard.example.com/porter/"
        );
    }

    #[test]
    fn get_release_sends_bearer_token() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/projects/1/clusters/2/namespaces/default/releases/redis/0")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "name": "redis",
                    "namespace": "default",
                    "version": 3,
                    "config": {"replicas": 1},
                })
                .to_string(),
            )
            .create();

        let release = client(&server)
            .get_release(SCOPE, "default", "redis")
            .expect("release");
        assert_eq!(release.name, "redis");
        assert_eq!(release.version, 3);
        assert_eq!(release.config.get("replicas"), Some(&json!(1)));
        mock.assert();
    }

    #[test]
    fn classifies_error_bodies() {
        let mut server = mockito::Server::new();
        let _missing = server
            .mock("GET", "/api/projects/1/clusters/2/namespaces/default/releases/web/0")
            .with_status(404)
            .with_body(json!({"error": "release not found"}).to_string())
            .create();
        let _denied = server
            .mock("GET", "/api/projects/1/clusters/2/namespaces")
            .with_status(403)
            .with_body("token expired")
            .create();

        let client = client(&server);
        let error = client
            .get_release(SCOPE, "default", "web")
            .expect_err("not found");
        assert!(error.is_not_found());
        assert_eq!(error.to_string(), "release not found");

        let error = client.list_namespaces(SCOPE).expect_err("forbidden");
        assert!(error.is_forbidden());
        assert_eq!(error.to_string(), "Forbidden: token expired");
    }

    #[test]
    fn upgrade_posts_values_string() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock(
                "POST",
                "/api/projects/1/clusters/2/namespaces/default/releases/redis/0/upgrade",
            )
            .match_body(Matcher::Json(json!({"values": "{\"replicas\":2}"})))
            .with_status(200)
            .create();

        client(&server)
            .upgrade_release(
                SCOPE,
                "default",
                "redis",
                &UpgradeReleaseRequest {
                    values: "{\"replicas\":2}".to_string(),
                },
            )
            .expect("upgrade");
        mock.assert();
    }

    #[test]
    fn deployment_lookup_uses_query_parameters() {
        let mut server = mockito::Server::new();
        let deployment = json!({
            "id": 9,
            "environment_id": 4,
            "namespace": "pr-7",
            "status": "created",
            "subdomain": "https://pr-7.example.com",
        });
        let by_branch = server
            .mock("GET", "/api/projects/1/clusters/2/environments/4/deployment")
            .match_query(Matcher::UrlEncoded("branch".into(), "main".into()))
            .with_status(200)
            .with_body(deployment.to_string())
            .create();
        let by_pr = server
            .mock("GET", "/api/projects/1/clusters/2/environments/4/deployment")
            .match_query(Matcher::UrlEncoded("pr_number".into(), "7".into()))
            .with_status(200)
            .with_body(deployment.to_string())
            .create();

        let client = client(&server);
        let found = client
            .get_deployment(SCOPE, 4, &DeploymentLookup::Branch("main".to_string()))
            .expect("by branch");
        assert_eq!(found.status, DeploymentStatus::Created);
        client
            .get_deployment(SCOPE, 4, &DeploymentLookup::PullRequest(7))
            .expect("by pr");

        by_branch.assert();
        by_pr.assert();
    }

    #[test]
    fn namespace_conflict_is_already_exists() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/api/projects/1/clusters/2/namespaces/create")
            .with_status(409)
            .with_body(json!({"error": "namespace pr-7 already exists"}).to_string())
            .create();

        let error = client(&server)
            .create_namespace(
                SCOPE,
                &CreateNamespaceRequest {
                    name: "pr-7".to_string(),
                    labels: std::collections::BTreeMap::new(),
                },
            )
            .expect_err("conflict");
        assert!(error.is_already_exists());
    }

    #[test]
    fn env_group_lookup_passes_name_and_version() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/projects/1/clusters/2/namespaces/pr-7/envgroup")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("name".into(), "shared".into()),
                Matcher::UrlEncoded("version".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({"name": "shared", "namespace": "pr-7", "version": 2, "variables": {"A": "1"}})
                    .to_string(),
            )
            .create();

        let group = client(&server)
            .get_env_group(
                SCOPE,
                "pr-7",
                &GetEnvGroupRequest {
                    name: "shared".to_string(),
                    version: Some(2),
                },
            )
            .expect("env group");
        assert_eq!(group.variables.get("A").map(String::as_str), Some("1"));
        mock.assert();
    }

    #[test]
    fn empty_create_release_body_has_no_subdomain() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/api/projects/1/clusters/2/namespaces/default/releases")
            .with_status(201)
            .create();

        let response = client(&server)
            .create_release(
                SCOPE,
                "default",
                &crate::types::CreateReleaseRequest {
                    name: "web".to_string(),
                    repo_url: "https://charts.getporter.dev".to_string(),
                    template_name: "web".to_string(),
                    template_version: None,
                    image_repo_uri: "registry.example.com/web".to_string(),
                    image_tag: "abc1234".to_string(),
                    values: serde_json::Map::new(),
                    build_config: None,
                    synced_env_groups: vec![],
                },
            )
            .expect("created");
        assert_eq!(response.subdomain, None);
    }
}
