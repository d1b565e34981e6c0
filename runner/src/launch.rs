use crate::sweep::JobDescriptor;
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    time::{Duration, Instant},
};
use tracing::{debug, trace, warn};
use wait_timeout::ChildExt;

/// How a single simulator run ended. Never turned into an error, workers only
/// count and log these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Exited(ExitStatus),
    TimedOut,
    SpawnFailed(String),
    // the child was started but could not be waited on
    WaitFailed(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(status) if status.success())
    }
}

/// The two side effects a job has on the outside world.
pub trait Launcher: Sync {
    /// Create the output directory of a job. Best effort, failures (including an
    /// already existing directory) are ignored.
    fn create_dir(&self, directory: &Path);

    /// Run the job to completion.
    fn run(&self, job: &JobDescriptor) -> JobOutcome;
}

/// Launches the simulator as a child process from `workdir`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    pub workdir: PathBuf,
    pub timeout: Option<Duration>,
}

impl ProcessLauncher {
    pub fn new(workdir: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
        }
    }

    fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.workdir.join(relative)
    }
}

impl Launcher for ProcessLauncher {
    fn create_dir(&self, directory: &Path) {
        let path = self.resolve(directory);

        if let Err(e) = fs::create_dir(&path) {
            debug!(path = ?path, "Ignoring failure to create job directory: {e}");
        }
    }

    fn run(&self, job: &JobDescriptor) -> JobOutcome {
        // like a shell redirect, no log file means no run
        let stdout = match File::create(self.resolve(&job.log_file)) {
            Ok(file) => Stdio::from(file),
            Err(e) => {
                warn!(job = job.id, "Failed to open {}: {e}", job.log_file);

                return JobOutcome::SpawnFailed(e.to_string());
            }
        };

        let start = Instant::now();

        let mut child = match Command::new(&job.program)
            .args(job.args.iter())
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return JobOutcome::SpawnFailed(e.to_string()),
        };

        trace!(job = job.id, pid = child.id(), "Spawned simulator");

        let status = match self.timeout {
            Some(timeout) => child.wait_timeout(timeout),
            None => child.wait().map(Some),
        };

        match status {
            Ok(Some(status)) => {
                debug!(
                    job = job.id,
                    "Finished in {} ms | status: {}",
                    start.elapsed().as_millis(),
                    status
                );

                JobOutcome::Exited(status)
            }
            Ok(None) => {
                // child hasn't exited yet
                if let Err(e) = child.kill() {
                    warn!(job = job.id, "Failed to kill timed out simulator: {e}");
                }
                // reap the killed child
                if let Err(e) = child.wait() {
                    debug!(job = job.id, "Failed to reap timed out simulator: {e}");
                }

                JobOutcome::TimedOut
            }
            Err(e) => {
                warn!(job = job.id, "Failed to wait for simulator: {e}");

                JobOutcome::WaitFailed(e.to_string())
            }
        }
    }
}
