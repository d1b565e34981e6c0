use super::{ExecutorError, SweepSummary};
use crate::{config::SweepConfig, sweep};
use std::io::{self, Write};
use tracing::info;

/// Prints every command of the sweep without creating directories or running
/// anything. The output is a shell script equivalent to the real run.
#[derive(Debug)]
pub struct DryRunExecutor<'a> {
    config: &'a SweepConfig,
}

impl<'a> DryRunExecutor<'a> {
    pub fn load(config: &'a SweepConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<SweepSummary, ExecutorError> {
        self.write_to(&mut io::stdout().lock())
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<SweepSummary, ExecutorError> {
        let jobs = sweep::enumerate(self.config);
        let total = jobs.len();

        // directories and log paths are relative to the workdir
        writeln!(out, "cd {}", self.config.simulator.workdir.to_string_lossy())?;

        for job in jobs {
            writeln!(out, "mkdir {}", job.directory)?;
            writeln!(out, "{}", job.command_line())?;
        }
        out.flush()?;

        info!("Dry run listed {total} jobs");

        Ok(SweepSummary {
            total,
            ..SweepSummary::default()
        })
    }
}
