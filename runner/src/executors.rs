mod dry_run;
mod local;
#[cfg(test)]
mod local_test;

pub use dry_run::DryRunExecutor;
pub use local::{LocalExecutor, SweepSummary};

use crate::config::{ConfigErrors, SweepConfig};
use rayon::ThreadPoolBuildError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to start the worker pool")]
    WorkerPool(#[from] ThreadPoolBuildError),
    #[error("Failed to write the dry run output")]
    Output(#[from] std::io::Error),
}

#[derive(Debug)]
pub enum Executors<'a> {
    Local(LocalExecutor<'a>),
    DryRun(DryRunExecutor<'a>),
}

impl<'a> Executors<'a> {
    pub fn load(config: &'a SweepConfig) -> Result<Self, ConfigErrors> {
        match config.executor.name.as_str() {
            "local" => Ok(Self::Local(LocalExecutor::load(config))),
            "dry-run" => Ok(Self::DryRun(DryRunExecutor::load(config))),
            _ => Err(ConfigErrors::UnsupportedExecutor(
                config.executor.name.clone(),
            )),
        }
    }

    pub fn execute(&self) -> Result<SweepSummary, ExecutorError> {
        match self {
            Self::Local(executor) => executor.execute(),
            Self::DryRun(executor) => executor.execute(),
        }
    }
}
