use super::ExecutorError;
use crate::{
    config::SweepConfig,
    launch::{JobOutcome, Launcher, ProcessLauncher},
    sweep::{self, JobDescriptor},
};
use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use std::{
    collections::VecDeque,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Pending jobs of a sweep. Filled once before any worker starts and only
/// drained afterwards, so an empty queue means the sweep is done.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<JobDescriptor>>,
}

impl JobQueue {
    /// take the next job, `None` once the queue is drained
    pub fn take(&self) -> Option<JobDescriptor> {
        self.jobs.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

impl FromIterator<JobDescriptor> for JobQueue {
    fn from_iter<T: IntoIterator<Item = JobDescriptor>>(iter: T) -> Self {
        Self {
            jobs: Mutex::new(iter.into_iter().collect()),
        }
    }
}

/// Counts of how the runs of a sweep ended. Informational only, a sweep with
/// failed runs still succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub spawn_failed: usize,
    pub wait_failed: usize,
}

// shared between all workers of one dispatch
#[derive(Debug, Default)]
struct Progress {
    total: usize,
    processed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    timed_out: AtomicUsize,
    spawn_failed: AtomicUsize,
    wait_failed: AtomicUsize,
    report_failures: bool,
}

impl Progress {
    fn record(&self, job: &JobDescriptor, outcome: &JobOutcome) {
        let counter = match outcome {
            JobOutcome::Exited(status) if status.success() => &self.succeeded,
            JobOutcome::Exited(_) => &self.failed,
            JobOutcome::TimedOut => &self.timed_out,
            JobOutcome::SpawnFailed(_) => &self.spawn_failed,
            JobOutcome::WaitFailed(_) => &self.wait_failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        if !outcome.is_success() {
            if self.report_failures {
                warn!(job = job.id, directory = %job.directory, outcome = ?outcome, "Simulator run failed");
            } else {
                debug!(job = job.id, directory = %job.directory, outcome = ?outcome, "Simulator run failed");
            }
        }

        info!(
            "Done with {}/{}",
            self.processed.fetch_add(1, Ordering::SeqCst) + 1,
            self.total
        );
    }

    fn summary(&self) -> SweepSummary {
        SweepSummary {
            total: self.total,
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            timed_out: self.timed_out.load(Ordering::SeqCst),
            spawn_failed: self.spawn_failed.load(Ordering::SeqCst),
            wait_failed: self.wait_failed.load(Ordering::SeqCst),
        }
    }
}

/// Executor that works on a local thread pool
#[derive(Debug)]
pub struct LocalExecutor<'a> {
    config: &'a SweepConfig,
}

impl<'a> LocalExecutor<'a> {
    /// create a new LocalExecutor instance
    pub fn load(config: &'a SweepConfig) -> Self {
        Self { config }
    }

    /// run every job of the sweep on the configured number of workers
    #[instrument(skip(self), level = "info")]
    pub fn execute(&self) -> Result<SweepSummary, ExecutorError> {
        let launcher = ProcessLauncher::new(
            &self.config.simulator.workdir,
            self.config.executor.timeout.map(Duration::from_secs),
        );

        dispatch(
            sweep::enumerate(self.config),
            self.config.executor.workers,
            &launcher,
            self.config.executor.report_failures,
        )
    }
}

/// Run every job exactly once on `workers` concurrent workers and return once
/// all of them have drained the queue.
pub fn dispatch<L: Launcher>(
    jobs: impl IntoIterator<Item = JobDescriptor>,
    workers: usize,
    launcher: &L,
    report_failures: bool,
) -> Result<SweepSummary, ExecutorError> {
    // every job is queued before the first worker starts
    let queue = jobs.into_iter().collect::<JobQueue>();
    let progress = Progress {
        total: queue.len(),
        report_failures,
        ..Progress::default()
    };

    if queue.is_empty() {
        info!("Sweep contains no jobs, nothing to do");

        return Ok(progress.summary());
    }

    // rayon treats 0 as "one thread per core"
    let workers = workers.max(1);

    debug!("Starting worker pool with {workers} threads");

    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("sweep-worker-{index}"))
        .build()?;

    let start = Instant::now();

    pool.scope(|scope| {
        for worker in 0..workers {
            let queue = &queue;
            let progress = &progress;

            scope.spawn(move |_| work(worker, queue, launcher, progress));
        }
    });

    let summary = progress.summary();
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        timed_out = summary.timed_out,
        spawn_failed = summary.spawn_failed,
        wait_failed = summary.wait_failed,
        "Done with processing {} jobs in {:.2?}",
        summary.total,
        start.elapsed()
    );

    Ok(summary)
}

// one worker: take, create the directory, run, until the queue is drained
fn work<L: Launcher>(worker: usize, queue: &JobQueue, launcher: &L, progress: &Progress) {
    while let Some(job) = queue.take() {
        debug!(worker, job = job.id, "Processing {}", job.directory);

        launcher.create_dir(Path::new(&job.directory));
        let outcome = launcher.run(&job);

        progress.record(&job, &outcome);
    }

    debug!(worker, "Queue drained, worker exits");
}
