use std::thread;
use std::time::{Duration, Instant};

use porter_client::{ClusterScope, ControlPlane, JobStatus};
use tracing::{debug, info};

use crate::error::WaitError;

pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_WAIT_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// Poll the job release `name` until it succeeds, fails, or `options.timeout`
/// elapses.
///
/// # Errors
///
/// Returns [`WaitError::JobFailed`] when the job reports failure,
/// [`WaitError::Timeout`] when it does not finish in time, and
/// [`WaitError::Status`] when the status cannot be read.
pub fn wait_for_job(
    client: &dyn ControlPlane,
    scope: ClusterScope,
    namespace: &str,
    name: &str,
    options: WaitOptions,
) -> Result<(), WaitError> {
    info!(job = name, namespace, "waiting for job to finish");
    let started = Instant::now();

    loop {
        let status = client
            .get_job_status(scope, namespace, name)
            .map_err(|source| WaitError::Status {
                name: name.to_string(),
                source,
            })?;

        match status.status {
            JobStatus::Succeeded => {
                info!(job = name, "job finished");
                return Ok(());
            }
            JobStatus::Failed => {
                return Err(WaitError::JobFailed {
                    name: name.to_string(),
                    message: status.message,
                });
            }
            JobStatus::Pending | JobStatus::Running => {
                debug!(job = name, status = ?status.status, "job still running");
            }
        }

        if started.elapsed() + options.interval >= options.timeout {
            return Err(WaitError::Timeout {
                name: name.to_string(),
                seconds: options.timeout.as_secs(),
            });
        }
        thread::sleep(options.interval);
    }
}
