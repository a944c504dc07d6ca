use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

static BUILD_PORTER: OnceLock<Result<(), String>> = OnceLock::new();

/// Environment variables the harness clears so the host's CI settings cannot
/// leak into a run.
const SCRUBBED_VARS: [&str; 17] = [
    "PORTER_HOST",
    "PORTER_TOKEN",
    "PORTER_PROJECT",
    "PORTER_CLUSTER",
    "PORTER_NAMESPACE",
    "PORTER_TAG",
    "PORTER_VALIDATE_YAML",
    "PORTER_GIT_INSTALLATION_ID",
    "PORTER_PULL_REQUEST_ID",
    "PORTER_BRANCH_FROM",
    "PORTER_BRANCH_INTO",
    "PORTER_ACTION_ID",
    "PORTER_REPO_NAME",
    "PORTER_REPO_OWNER",
    "PORTER_PR_NAME",
    "PORTER_SENTRY_DSN",
    "RUST_LOG",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub command_line: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    #[must_use]
    pub fn transcript(&self) -> String {
        format!(
            "$ {}\n[exit: {}]\n[stdout]\n{}[stderr]\n{}",
            self.command_line, self.exit_code, self.stdout, self.stderr
        )
    }
}

/// Run the `porter` binary from `workdir` with `args`.
///
/// `PORTER_CONFIG` points at a file inside `workdir` so a developer's own
/// config is never read.
///
/// # Errors
///
/// Returns an error if building or running the `porter` binary fails.
pub fn run_porter(
    workdir: &Path,
    args: &[&str],
    env_overrides: &[(&str, &str)],
) -> Result<RunResult, String> {
    ensure_porter_built()?;
    let bin = porter_bin()?;

    let mut command = Command::new(bin);
    command.current_dir(workdir);
    for name in SCRUBBED_VARS {
        command.env_remove(name);
    }
    command.env("PORTER_CONFIG", workdir.join("porter-cli.yaml"));
    command.args(args);
    for (name, value) in env_overrides {
        command.env(name, value);
    }

    let mut command_parts = vec!["porter".to_string()];
    command_parts.extend(args.iter().map(|arg| (*arg).to_string()));

    let output = command
        .output()
        .map_err(|error| format!("failed to run porter: {error}"))?;

    Ok(RunResult {
        command_line: command_parts.join(" "),
        exit_code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Write a text file, creating parent directories if needed.
///
/// # Errors
///
/// Returns an error if directories or file contents cannot be written.
pub fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

fn ensure_porter_built() -> Result<(), String> {
    match BUILD_PORTER.get_or_init(|| {
        let status = Command::new("cargo")
            .arg("build")
            .arg("-q")
            .arg("-p")
            .arg("porter")
            .status()
            .map_err(|error| format!("failed to build porter binary: {error}"))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!(
                "failed to build porter binary: cargo exited with status {status}"
            ))
        }
    }) {
        Ok(()) => Ok(()),
        Err(error) => Err(error.clone()),
    }
}

fn porter_bin() -> Result<PathBuf, String> {
    let mut path = std::env::current_exe()
        .map_err(|error| format!("failed to determine current executable: {error}"))?;
    if !path.pop() {
        return Err("failed to resolve test executable directory".to_string());
    }
    if path.ends_with("deps") {
        let _ = path.pop();
    }
    Ok(path.join(format!("porter{}", std::env::consts::EXE_SUFFIX)))
}
