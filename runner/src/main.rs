mod config;
mod executors;
mod launch;
mod sweep;

use clap::Parser;
use config::SweepConfig;
use executors::Executors;
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

/// Run a parameter sweep of ns-2 simulations on a local worker pool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML file describing the sweep, the reference sweep is used without it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of concurrent simulator runs
    #[arg(short, long)]
    workers: Option<usize>,

    /// Kill simulator runs after this many seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Print the commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn load_config(&self) -> Result<SweepConfig, config::ConfigErrors> {
        let mut config = match self.config {
            Some(ref path) => SweepConfig::load(path)?,
            None => SweepConfig::default(),
        };

        if let Some(workers) = self.workers {
            config.executor.workers = workers;
        }
        if self.timeout.is_some() {
            config.executor.timeout = self.timeout;
        }
        if self.dry_run {
            config.executor.name = String::from("dry-run");
        }

        config.preflight_checks()?;

        Ok(config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    LevelFilter::DEBUG.into()
                } else {
                    LevelFilter::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {e}");

            return ExitCode::FAILURE;
        }
    };

    if config.sweep.is_empty() {
        info!("Sweep is empty, no simulator will be started");
    } else {
        info!(
            "Sweeping {} jobs with {} workers",
            config.sweep.len(),
            config.executor.workers
        );
    }

    let executor = match Executors::load(&config) {
        Ok(executor) => executor,
        Err(e) => {
            error!("Failed to load executor: {e}");

            return ExitCode::FAILURE;
        }
    };

    // individual runs never fail the sweep
    match executor.execute() {
        Ok(summary) => {
            info!(?summary, "Sweep finished");

            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Sweep aborted: {e}");

            ExitCode::FAILURE
        }
    }
}
