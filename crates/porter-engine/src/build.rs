use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use porter_client::RegistryToken;
use porter_domain::{BuildMethod, ImageRef};
use tracing::{debug, info};

use crate::error::BuildError;

pub const DEFAULT_PACK_BUILDER: &str = "heroku/buildpacks:20";

/// Everything needed to produce one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub method: BuildMethod,
    pub context: PathBuf,
    pub dockerfile: Option<PathBuf>,
    pub image: ImageRef,
    pub builder: Option<String>,
    pub buildpacks: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Publish straight to the registry with a cache image instead of
    /// building locally and pushing afterwards.
    pub use_cache: bool,
}

/// Local image toolchain.
pub trait ImageBuilder {
    /// Authenticate the local toolchain against `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error when the login command fails.
    fn login(&self, registry: &str, token: &RegistryToken) -> Result<(), BuildError>;

    /// # Errors
    ///
    /// Returns an error when the build command fails.
    fn build(&self, request: &BuildRequest) -> Result<(), BuildError>;

    /// # Errors
    ///
    /// Returns an error when the push command fails.
    fn push(&self, image: &ImageRef) -> Result<(), BuildError>;
}

/// [`ImageBuilder`] that shells out to `docker` and `pack`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandImageBuilder;

impl CommandImageBuilder {
    fn run(binary: &'static str, args: &[String], stdin: Option<&str>) -> Result<(), BuildError> {
        let path = which::which(binary).map_err(|_| BuildError::BinaryNotFound { binary })?;
        let rendered = redact_args(args);
        debug!(binary, args = %rendered, "running build command");

        let mut child = Command::new(path)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BuildError::CommandSpawn {
                binary,
                args: rendered.clone(),
                source,
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .map_err(|source| BuildError::CommandSpawn {
                    binary,
                    args: rendered.clone(),
                    source,
                })?;
        }

        let output = child
            .wait_with_output()
            .map_err(|source| BuildError::CommandSpawn {
                binary,
                args: rendered.clone(),
                source,
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(BuildError::CommandFailed {
                binary,
                args: rendered,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl ImageBuilder for CommandImageBuilder {
    fn login(&self, registry: &str, token: &RegistryToken) -> Result<(), BuildError> {
        let username = token.username.as_deref().unwrap_or("porter");
        info!(registry, "logging in to registry");
        Self::run(
            "docker",
            &[
                "login".to_string(),
                registry_host(registry).to_string(),
                "--username".to_string(),
                username.to_string(),
                "--password-stdin".to_string(),
            ],
            Some(&token.token),
        )
    }

    fn build(&self, request: &BuildRequest) -> Result<(), BuildError> {
        info!(image = %request.image, method = %request.method, "building image");
        match request.method {
            BuildMethod::Docker => Self::run("docker", &docker_build_args(request), None),
            BuildMethod::Pack => Self::run("pack", &pack_build_args(request), None),
            BuildMethod::Registry => Err(BuildError::UnsupportedMethod {
                method: request.method,
            }),
        }
    }

    fn push(&self, image: &ImageRef) -> Result<(), BuildError> {
        info!(%image, "pushing image");
        Self::run("docker", &["push".to_string(), image.to_string()], None)
    }
}

fn docker_build_args(request: &BuildRequest) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        "--tag".to_string(),
        request.image.to_string(),
    ];
    if let Some(dockerfile) = &request.dockerfile {
        args.push("--file".to_string());
        args.push(dockerfile.display().to_string());
    }
    for (key, value) in &request.env {
        args.push("--build-arg".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(request.context.display().to_string());
    args
}

fn pack_build_args(request: &BuildRequest) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        request.image.to_string(),
        "--path".to_string(),
        request.context.display().to_string(),
        "--builder".to_string(),
        request
            .builder
            .clone()
            .unwrap_or_else(|| DEFAULT_PACK_BUILDER.to_string()),
    ];
    for buildpack in &request.buildpacks {
        args.push("--buildpack".to_string());
        args.push(buildpack.clone());
    }
    for (key, value) in &request.env {
        args.push("--env".to_string());
        args.push(format!("{key}={value}"));
    }
    if request.use_cache {
        args.push("--publish".to_string());
        args.push("--cache-image".to_string());
        args.push(format!("{}:cache", request.image.repository));
    }
    args
}

/// Strip the scheme and trailing slash from a registry URL.
#[must_use]
pub fn registry_host(url: &str) -> &str {
    let host = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    host.trim_end_matches('/')
}

/// Resolve `relative` against `base` unless it is already absolute.
#[must_use]
pub fn absolutize(base: &Path, relative: &str) -> PathBuf {
    let path = Path::new(relative);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn redact_args(args: &[String]) -> String {
    let mut rendered = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            rendered.push("***");
            hide_next = false;
            continue;
        }
        hide_next = arg == "--build-arg" || arg == "--env";
        rendered.push(arg.as_str());
    }
    rendered.join(" ")
}
