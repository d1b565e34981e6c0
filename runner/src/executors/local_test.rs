use super::{
    local::{dispatch, JobQueue},
    ExecutorError, LocalExecutor, SweepSummary,
};
use crate::{
    config::SweepConfig,
    launch::{JobOutcome, Launcher},
    sweep::{self, JobDescriptor},
};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    os::unix::process::ExitStatusExt,
    path::{Path, PathBuf},
    process::ExitStatus,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
    time::{Duration, Instant},
};

/// Records every call instead of touching the outside world.
#[derive(Default)]
struct CountingLauncher {
    runs: Mutex<BTreeMap<usize, usize>>,
    directories: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    // jobs with these ids exit with status 1
    failing: Vec<usize>,
    delay: Duration,
}

impl Launcher for CountingLauncher {
    fn create_dir(&self, directory: &Path) {
        self.directories
            .lock()
            .push(directory.to_string_lossy().into_owned());
    }

    fn run(&self, job: &JobDescriptor) -> JobOutcome {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        thread::sleep(self.delay);
        *self.runs.lock().entry(job.id).or_default() += 1;

        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&job.id) {
            JobOutcome::Exited(ExitStatus::from_raw(1 << 8))
        } else {
            JobOutcome::Exited(ExitStatus::from_raw(0))
        }
    }
}

fn jobs(count: usize) -> Vec<JobDescriptor> {
    (0..count)
        .map(|id| JobDescriptor {
            id,
            directory: format!("job_{id}"),
            program: PathBuf::from("ns"),
            args: Vec::new(),
            log_file: format!("./job_{id}/logFile.tr"),
        })
        .collect()
}

#[test]
fn queue_hands_out_each_job_once() {
    let queue = jobs(3).into_iter().collect::<JobQueue>();

    assert_eq!(queue.len(), 3);
    assert_eq!(queue.take().map(|job| job.id), Some(0));
    assert_eq!(queue.take().map(|job| job.id), Some(1));
    assert_eq!(queue.take().map(|job| job.id), Some(2));
    assert!(queue.take().is_none());
    assert!(queue.is_empty());
}

#[test]
fn every_job_runs_exactly_once() {
    let launcher = CountingLauncher {
        delay: Duration::from_millis(1),
        ..CountingLauncher::default()
    };

    // 103 is not divisible by 7
    let summary = dispatch(jobs(103), 7, &launcher, false).unwrap();

    let runs = launcher.runs.lock();
    assert_eq!(runs.len(), 103);
    assert!(runs.values().all(|count| *count == 1));
    assert_eq!(
        summary,
        SweepSummary {
            total: 103,
            succeeded: 103,
            ..SweepSummary::default()
        }
    );

    let mut directories = launcher.directories.lock().clone();
    directories.sort();
    directories.dedup();
    assert_eq!(directories.len(), 103);
}

#[test]
fn concurrency_is_bounded_by_workers() {
    let launcher = CountingLauncher {
        delay: Duration::from_millis(20),
        ..CountingLauncher::default()
    };

    dispatch(jobs(24), 4, &launcher, false).unwrap();

    let max_active = launcher.max_active.load(Ordering::SeqCst);
    assert!(max_active <= 4, "{max_active} runs overlapped");
    assert!(max_active >= 1);
}

/// Every run blocks until `workers` runs are in flight at the same time, or
/// gives up once the deadline passes.
struct OverlapLauncher {
    workers: usize,
    active: AtomicUsize,
    all_overlapped: AtomicBool,
    deadline: Instant,
}

impl Launcher for OverlapLauncher {
    fn create_dir(&self, _directory: &Path) {}

    fn run(&self, _job: &JobDescriptor) -> JobOutcome {
        if self.active.fetch_add(1, Ordering::SeqCst) + 1 == self.workers {
            self.all_overlapped.store(true, Ordering::SeqCst);
        }

        while !self.all_overlapped.load(Ordering::SeqCst) && Instant::now() < self.deadline {
            thread::sleep(Duration::from_millis(1));
        }

        if self.all_overlapped.load(Ordering::SeqCst) {
            JobOutcome::Exited(ExitStatus::from_raw(0))
        } else {
            JobOutcome::TimedOut
        }
    }
}

#[test]
fn all_workers_run_concurrently() {
    let launcher = OverlapLauncher {
        workers: 6,
        active: AtomicUsize::new(0),
        all_overlapped: AtomicBool::new(false),
        deadline: Instant::now() + Duration::from_secs(10),
    };

    let summary = dispatch(jobs(6), 6, &launcher, false).unwrap();

    assert!(launcher.all_overlapped.load(Ordering::SeqCst));
    assert_eq!(summary.succeeded, 6);
    assert_eq!(summary.timed_out, 0);
}

#[test]
fn more_workers_than_jobs() {
    let launcher = CountingLauncher::default();

    let summary = dispatch(jobs(3), 20, &launcher, false).unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(launcher.runs.lock().len(), 3);
}

#[test]
fn failed_runs_are_counted_not_fatal() {
    let launcher = CountingLauncher {
        failing: vec![1, 4],
        ..CountingLauncher::default()
    };

    let summary = dispatch(jobs(6), 2, &launcher, true).unwrap();

    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 2);
    // no retries
    assert!(launcher.runs.lock().values().all(|count| *count == 1));
}

struct UnwaitableLauncher;

impl Launcher for UnwaitableLauncher {
    fn create_dir(&self, _directory: &Path) {}

    fn run(&self, _job: &JobDescriptor) -> JobOutcome {
        JobOutcome::WaitFailed(String::from("ECHILD"))
    }
}

#[test]
fn wait_failures_are_not_spawn_failures() {
    let summary = dispatch(jobs(5), 2, &UnwaitableLauncher, false).unwrap();

    assert_eq!(
        summary,
        SweepSummary {
            total: 5,
            wait_failed: 5,
            ..SweepSummary::default()
        }
    );
}

#[test]
fn empty_sweep_returns_immediately() {
    let mut config = SweepConfig::default();
    config.sweep.loads.clear();
    let launcher = CountingLauncher::default();

    let summary = dispatch(sweep::enumerate(&config), 20, &launcher, false).unwrap();

    assert_eq!(summary, SweepSummary::default());
    assert!(launcher.runs.lock().is_empty());
    assert!(launcher.directories.lock().is_empty());
}

fn local_config(workdir: &std::path::Path, program: &str) -> SweepConfig {
    let mut config = SweepConfig::default();
    config.simulator.ns_path = PathBuf::from(program);
    config.simulator.workdir = workdir.to_path_buf();
    config.sweep.loads = vec![0.9, 0.5, 0.1];
    config.executor.workers = 4;
    config
}

#[test]
fn local_executor_creates_job_directories() -> Result<(), ExecutorError> {
    let dir = tempfile::tempdir().unwrap();
    let config = local_config(dir.path(), "true");

    let summary = LocalExecutor::load(&config).execute()?;

    assert_eq!(summary.total, 2 * 3 * 2);
    assert_eq!(summary.succeeded, summary.total);
    for job in sweep::enumerate(&config) {
        assert!(dir.path().join(&job.directory).is_dir());
        assert!(dir.path().join(&job.log_file).is_file());
    }

    Ok(())
}

#[test]
fn rerun_over_existing_directories() -> Result<(), ExecutorError> {
    let dir = tempfile::tempdir().unwrap();
    let config = local_config(dir.path(), "true");

    LocalExecutor::load(&config).execute()?;
    let summary = LocalExecutor::load(&config).execute()?;

    assert_eq!(summary.succeeded, summary.total);

    Ok(())
}

#[test]
fn local_executor_survives_failing_simulator() -> Result<(), ExecutorError> {
    let dir = tempfile::tempdir().unwrap();
    let config = local_config(dir.path(), "false");

    let summary = LocalExecutor::load(&config).execute()?;

    assert_eq!(summary.failed, summary.total);
    assert_eq!(summary.succeeded, 0);

    Ok(())
}
