use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use porter_client::{ControlPlane, HttpControlPlane};
use porter_engine::{
    ApplyEnv, CLONE_ENV_GROUP_HOOK, CloneEnvGroupHook, CommandImageBuilder, DEPLOYMENT_HOOK,
    DeploymentHook, DriverOptions, ERROR_EMITTER_HOOK, ErrorEmitterHook, Executor, GitRepository,
    ManifestError, TargetDefaults, WaitOptions, Worker, load_manifest, register_drivers,
    validate_manifest,
};
use porter_report::{
    ColorChoice, OutputFormat, RenderOptions, forbidden_hint, render_apply,
    render_valid_manifest, render_validation_errors,
};
use tracing::{debug, info};

mod config;
mod error;
mod logging;
mod reporting;

pub use config::{CliConfig, ConfigOverrides, DEFAULT_HOST};
pub use error::{CliError, ConfigError};
pub use reporting::SENTRY_DSN_VAR;

#[derive(Debug, Parser)]
#[command(name = "porter", about = "Apply porter.yaml resource groups to a Porter cluster")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionFlags,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Args)]
struct ConnectionFlags {
    /// Control-plane URL.
    #[arg(long, global = true, env = "PORTER_HOST")]
    host: Option<String>,
    #[arg(long, global = true, env = "PORTER_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Project id; overrides the manifest target.
    #[arg(long, global = true, env = "PORTER_PROJECT")]
    project: Option<u64>,
    /// Cluster id; overrides the manifest target.
    #[arg(long, global = true, env = "PORTER_CLUSTER")]
    cluster: Option<u64>,
    /// Config file, defaults to ~/.porter/porter.yaml.
    #[arg(long, global = true, env = "PORTER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply the resources declared in a porter.yaml file.
    Apply(ApplyArgs),
}

#[derive(Debug, Args)]
#[command(subcommand_negates_reqs = true)]
struct ApplyArgs {
    #[arg(short = 'f', long = "file", required = true)]
    file: Option<PathBuf>,
    #[command(flatten)]
    render: RenderFlags,
    #[arg(long, value_enum, default_value_t = FormatArg::Text)]
    format: FormatArg,
    #[command(subcommand)]
    command: Option<ApplyCommand>,
}

#[derive(Debug, Subcommand)]
enum ApplyCommand {
    /// Check a porter.yaml file without contacting the control plane.
    Validate {
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = ColorArg::Auto)]
        color: ColorArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Args)]
struct RenderFlags {
    #[arg(long, value_enum, default_value_t = ColorArg::Auto)]
    color: ColorArg,
    #[arg(short, long)]
    verbose: bool,
}

impl RenderFlags {
    fn render_options(&self, target: &str) -> RenderOptions {
        RenderOptions {
            color: self.color.into(),
            verbose: self.verbose,
            target: Some(target.to_string()),
        }
    }
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

impl From<ColorArg> for ColorChoice {
    fn from(value: ColorArg) -> Self {
        match value {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Run the CLI using process arguments.
///
/// # Errors
///
/// Returns an error when argument parsing fails (excluding help/version) or
/// the command cannot be set up.
pub fn run() -> std::result::Result<i32, CliError> {
    run_from(std::env::args_os())
}

fn run_from<I, T>(args: I) -> std::result::Result<i32, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(parsed) => parsed,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(error.into()),
        },
    };

    let reporter = reporting::ErrorReporter::from_env();
    let result = dispatch(cli.command, &cli.connection);
    if let (Err(error), true) = (&result, reporter.is_enabled()) {
        reporter.capture(error, &reporting::ErrorTags::resolve(&cli.connection));
    }
    result
}

fn dispatch(command: Commands, connection: &ConnectionFlags) -> std::result::Result<i32, CliError> {
    match command {
        Commands::Apply(ApplyArgs {
            command: Some(ApplyCommand::Validate { file, color }),
            ..
        }) => {
            logging::init(false);
            run_validate(&file, color.into())
        }
        Commands::Apply(ApplyArgs {
            file: Some(file),
            render,
            format,
            command: None,
        }) => {
            logging::init(render.verbose);
            run_apply(&file, &render, format.into(), connection)
        }
        Commands::Apply(ApplyArgs {
            file: None,
            command: None,
            ..
        }) => Err(clap::Error::raw(
            ErrorKind::MissingRequiredArgument,
            "the following required arguments were not provided: --file <FILE>\n",
        )
        .into()),
    }
}

fn run_validate(file: &Path, color: ColorChoice) -> std::result::Result<i32, CliError> {
    let contents = fs::read_to_string(file).map_err(|source| ManifestError::Read {
        path: file.to_path_buf(),
        source,
    })?;

    let errors: Vec<String> = validate_manifest(&contents)
        .iter()
        .map(ToString::to_string)
        .collect();
    if errors.is_empty() {
        print!("{}", render_valid_manifest(color.for_stdout()));
        return Ok(0);
    }

    eprint!("{}", render_validation_errors(&errors, color.for_stderr()));
    Ok(1)
}

fn run_apply(
    file: &Path,
    render: &RenderFlags,
    format: OutputFormat,
    connection: &ConnectionFlags,
) -> std::result::Result<i32, CliError> {
    let env = ApplyEnv::from_process();
    let group = load_manifest(file, &env)?;
    info!(
        file = %file.display(),
        resources = group.resources.len(),
        "loaded porter.yaml"
    );

    let config = load_config(connection)?;
    let base_path =
        std::env::current_dir().map_err(|source| CliError::WorkingDirectory { source })?;
    let client: Arc<dyn ControlPlane> =
        Arc::new(HttpControlPlane::new(config.host(), config.token.clone())?);
    let defaults = TargetDefaults {
        override_project: connection.project,
        override_cluster: connection.cluster,
        override_namespace: env.namespace().map(str::to_string),
        project: config.project,
        cluster: config.cluster,
    };

    let mut worker = Worker::new();
    register_drivers(
        &mut worker,
        &DriverOptions {
            client: Arc::clone(&client),
            builder: Arc::new(CommandImageBuilder),
            revisions: Arc::new(GitRepository),
            defaults: defaults.clone(),
            base_path: base_path.clone(),
            env: env.clone(),
            wait: WaitOptions::default(),
        },
    );

    if env.has_deployment_vars() {
        let hook = DeploymentHook::new(
            Arc::clone(&client),
            &env,
            defaults.override_project.or(defaults.project),
            defaults.override_cluster.or(defaults.cluster),
            &GitRepository,
            &base_path,
        )
        .map_err(|source| CliError::DeploymentHook { source })?;
        worker.register_hook(DEPLOYMENT_HOOK, Box::new(hook));
    } else {
        debug!("deployment variables not set, skipping deployment hook");
    }

    let color = ColorChoice::from(render.color);
    worker.register_hook(
        ERROR_EMITTER_HOOK,
        Box::new(ErrorEmitterHook::stderr(color.for_stderr())),
    );
    worker.register_hook(
        CLONE_ENV_GROUP_HOOK,
        Box::new(CloneEnvGroupHook::new(Arc::clone(&client), defaults)),
    );

    let report = worker.apply(&group);
    let rendered = render_apply(
        &report,
        format,
        &render.render_options(&file.display().to_string()),
    )?;
    emit_output(&rendered);

    if report.forbidden {
        eprintln!("{}", forbidden_hint(color.for_stderr()));
    }
    Ok(i32::from(report.has_failures()))
}

fn load_config(connection: &ConnectionFlags) -> std::result::Result<CliConfig, CliError> {
    let path = connection.config.clone().or_else(CliConfig::default_path);
    let config = match path {
        Some(path) => CliConfig::load(&path)?,
        None => CliConfig::default(),
    };
    Ok(config.with_overrides(ConfigOverrides {
        host: connection.host.clone(),
        token: connection.token.clone(),
    }))
}

fn emit_output(rendered: &str) {
    if rendered.ends_with('\n') {
        print!("{rendered}");
    } else {
        println!("{rendered}");
    }
}
