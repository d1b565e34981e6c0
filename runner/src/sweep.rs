//! Expansion of a [`SweepConfig`] into one [`JobDescriptor`] per combination of
//! switch algorithm, service count, load and ECN scheme.

use crate::config::{Parameters, SweepConfig};
use itertools::{iproduct, Itertools};
use std::path::PathBuf;

/// trace output written by the simulator into the job directory
pub const TRACE_FILE: &str = "flow.tr";
/// stdout of the simulator is redirected here
pub const LOG_FILE: &str = "logFile.tr";

/// A single simulator invocation. Created by [`enumerate`] and consumed exactly
/// once by a worker.
#[derive(Clone, Debug, PartialEq)]
pub struct JobDescriptor {
    /// position in enumeration order
    pub id: usize,
    /// output directory, relative to the sweep's workdir
    pub directory: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// target for the simulator's stdout, relative to the workdir
    pub log_file: String,
}

impl JobDescriptor {
    /// the equivalent shell command line
    pub fn command_line(&self) -> String {
        format!(
            "{} {}  >{}",
            self.program.to_string_lossy(),
            self.args.iter().join(" "),
            self.log_file
        )
    }
}

/// `dctcp` for any DCTCP flavour of the source algorithm, `tcp` otherwise
pub fn transport(source_alg: &str) -> &'static str {
    if source_alg.contains("DCTCP") {
        "dctcp"
    } else {
        "tcp"
    }
}

/// load as a truncated integer percentage, 0.9 -> 90
pub fn load_percent(load: f64) -> i64 {
    (load * 100.0) as i64
}

pub fn directory_name(
    label: &str,
    switch_alg: &str,
    source_alg: &str,
    ecn_scheme: u32,
    load: f64,
    service_num: u32,
) -> String {
    format!(
        "{label}{switch_alg}_{}_scheme_{ecn_scheme}_load_{}_service_{service_num}",
        transport(source_alg),
        load_percent(load)
    )
    .to_lowercase()
}

// shortest round-trip form that keeps a fractional part, e.g. 84.0 or 0.0625
fn fmt_float(value: f64) -> String {
    format!("{value:?}")
}

fn arguments(
    config: &SweepConfig,
    directory: &str,
    switch_alg: &str,
    service_num: u32,
    load: f64,
    ecn_scheme: u32,
) -> Vec<String> {
    let Parameters {
        sim_end,
        link_rate,
        mean_link_delay,
        host_delay,
        queue_size,
        connections_per_pair,
        enable_multi_path,
        perflow_mp,
        source_alg,
        ack_ratio,
        slowstart_restart,
        dctcp_g,
        min_rto,
        pias_thresh,
        dctcp_k,
        topology_spt,
        topology_tors,
        topology_spines,
        topology_x,
    } = &config.parameters;

    // positional, the simulator script reads them by index
    vec![
        config.simulator.sim_script.clone(),
        service_num.to_string(),
        sim_end.to_string(),
        link_rate.to_string(),
        fmt_float(*mean_link_delay),
        fmt_float(*host_delay),
        queue_size.to_string(),
        fmt_float(load),
        connections_per_pair.to_string(),
        enable_multi_path.to_string(),
        perflow_mp.to_string(),
        source_alg.clone(),
        ack_ratio.to_string(),
        slowstart_restart.to_string(),
        fmt_float(*dctcp_g),
        fmt_float(*min_rto),
        ecn_scheme.to_string(),
        pias_thresh.to_string(),
        fmt_float(*dctcp_k),
        switch_alg.to_owned(),
        topology_spt.to_string(),
        topology_tors.to_string(),
        topology_spines.to_string(),
        topology_x.to_string(),
        format!("./{directory}/{TRACE_FILE}"),
    ]
}

/// Lazily enumerate all jobs of the sweep, switch algorithm outermost and ECN
/// scheme innermost. Any empty dimension yields an empty sweep.
pub fn enumerate(config: &SweepConfig) -> impl ExactSizeIterator<Item = JobDescriptor> + '_ {
    let sweep = &config.sweep;
    let total = sweep.len();

    let jobs = iproduct!(
        sweep.switch_algs.iter(),
        sweep.service_nums.iter().copied(),
        sweep.loads.iter().copied(),
        sweep.ecn_schemes.iter().copied()
    )
    .enumerate()
    .map(move |(id, (switch_alg, service_num, load, ecn_scheme))| {
        let directory = directory_name(
            &sweep.label,
            switch_alg,
            &config.parameters.source_alg,
            ecn_scheme,
            load,
            service_num,
        );

        JobDescriptor {
            id,
            args: arguments(config, &directory, switch_alg, service_num, load, ecn_scheme),
            log_file: format!("./{directory}/{LOG_FILE}"),
            program: config.simulator.ns_path.clone(),
            directory,
        }
    });

    SizedJobs { jobs, remaining: total }
}

// iproduct! does not report an exact size, the sweep dimensions do
struct SizedJobs<I> {
    jobs: I,
    remaining: usize,
}

impl<I: Iterator<Item = JobDescriptor>> Iterator for SizedJobs<I> {
    type Item = JobDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.jobs.next();
        if next.is_some() {
            self.remaining -= 1;
        }
        next
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<I: Iterator<Item = JobDescriptor>> ExactSizeIterator for SizedJobs<I> {}
