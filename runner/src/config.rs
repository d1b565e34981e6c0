use crate::sweep;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs::File,
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, warn};

/// executor names accepted in `executor.name`
pub const SUPPORTED_EXECUTORS: [&str; 2] = ["local", "dry-run"];

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file {0:?}")]
    Read(PathBuf, #[source] Error),
    #[error("Config file is not valid")]
    Parse(#[from] serde_yaml::Error),
    #[error("Executor {0} is not supported")]
    UnsupportedExecutor(String),
    #[error("Preflight checks failed, see the log for details")]
    PreflightFailed,
    #[error("File {0:?} not found")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[source] Error),
}

/// Everything needed to describe one sweep. All fields default to the reference
/// PIAS/diffserv sweep, so an empty file (or no file at all) reproduces it.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SweepConfig {
    pub executor: ExecutorConfig,
    pub simulator: SimulatorConfig,
    // scalar parameters, fixed for the whole sweep
    #[serde(alias = "params")]
    pub parameters: Parameters,
    // the four swept dimensions
    pub sweep: SweepDimensions,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ExecutorConfig {
    // Name of the selected executor, see Executors::load for the selection proccess
    pub name: String,
    // number of concurrent workers, bounds the number of simulator processes
    #[serde(alias = "threads")]
    pub workers: usize,
    // per run timeout in seconds, runs are killed once it expires
    pub timeout: Option<u64>,
    // log failed runs as warnings instead of debug messages
    pub report_failures: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: String::from("local"),
            workers: 20,
            timeout: None,
            report_failures: false,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SimulatorConfig {
    #[serde(alias = "path")]
    pub ns_path: PathBuf,
    #[serde(alias = "script")]
    pub sim_script: String,
    // job directories are created here and the simulator runs from here
    pub workdir: PathBuf,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ns_path: PathBuf::from("../ns-allinone-2.34/ns-2.34/ns"),
            sim_script: String::from("spine_empirical_pias_diffserv.tcl"),
            workdir: PathBuf::from("."),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Parameters {
    pub sim_end: u64,
    // Gbps
    pub link_rate: u32,
    // seconds
    pub mean_link_delay: f64,
    // seconds
    pub host_delay: f64,
    // packets
    #[serde(alias = "queueSize")]
    pub queue_size: u32,
    pub connections_per_pair: u32,
    #[serde(alias = "enableMultiPath")]
    pub enable_multi_path: u32,
    #[serde(alias = "perflowMP")]
    pub perflow_mp: u32,
    #[serde(alias = "sourceAlg")]
    pub source_alg: String,
    #[serde(alias = "ackRatio")]
    pub ack_ratio: u32,
    #[serde(alias = "slowstartrestart")]
    pub slowstart_restart: bool,
    #[serde(alias = "DCTCP_g")]
    pub dctcp_g: f64,
    pub min_rto: f64,
    pub pias_thresh: u64,
    #[serde(alias = "DCTCP_K")]
    pub dctcp_k: f64,
    pub topology_spt: u32,
    pub topology_tors: u32,
    pub topology_spines: u32,
    pub topology_x: u32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            sim_end: 100_000,
            link_rate: 10,
            mean_link_delay: 0.000_000_2,
            host_delay: 0.000_020,
            queue_size: 200,
            connections_per_pair: 1,
            enable_multi_path: 1,
            perflow_mp: 1,
            source_alg: String::from("Sack"),
            ack_ratio: 1,
            slowstart_restart: true,
            dctcp_g: 0.0625,
            min_rto: 0.005,
            pias_thresh: 100_000,
            dctcp_k: 84.0,
            topology_spt: 12,
            topology_tors: 12,
            topology_spines: 12,
            topology_x: 1,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SweepDimensions {
    #[serde(alias = "switchAlgs")]
    pub switch_algs: Vec<String>,
    #[serde(alias = "service_num_arr")]
    pub service_nums: Vec<u32>,
    #[serde(alias = "load_arr")]
    pub loads: Vec<f64>,
    // 0: per-queue, 1: per-port, 2: TCN, 3: MQ-ECN
    #[serde(alias = "ECN_scheme_arr")]
    pub ecn_schemes: Vec<u32>,
    // prepended verbatim to every directory name
    #[serde(alias = "specialStr")]
    pub label: String,
}

impl Default for SweepDimensions {
    fn default() -> Self {
        Self {
            switch_algs: vec![String::from("PrioDwrr")],
            service_nums: vec![7, 31],
            loads: vec![0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2, 0.1],
            ecn_schemes: vec![0, 2],
            label: String::new(),
        }
    }
}

impl SweepDimensions {
    /// number of jobs the sweep expands to
    pub fn len(&self) -> usize {
        self.switch_algs.len() * self.service_nums.len() * self.loads.len() * self.ecn_schemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SweepConfig {
    /// read and parse a YAML config file
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let raw =
            std::fs::read_to_string(path).map_err(|e| ConfigErrors::Read(path.to_path_buf(), e))?;

        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigErrors> {
        // serde_yaml refuses an empty document for a struct, treat it as all defaults
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(raw)?)
    }

    /// Check the config for problems before any job is started. Every problem is
    /// logged instead of stopping at the first one, to make fixing configs easier.
    pub fn preflight_checks(&mut self) -> Result<(), ConfigErrors> {
        let mut contains_error = false;

        self.executor.name = self.executor.name.to_lowercase();
        if !SUPPORTED_EXECUTORS.contains(&self.executor.name.as_str()) {
            error!(
                "executor.name ({}) is not supported, use one of {SUPPORTED_EXECUTORS:?}",
                self.executor.name
            );
            contains_error = true;
        }

        if self.executor.workers == 0 {
            error!("executor.workers must be at least 1");
            contains_error = true;
        }

        if self.executor.timeout == Some(0) {
            error!("executor.timeout cannot be 0, leave it unset to wait for every run");
            contains_error = true;
        }

        for load in self.sweep.loads.iter() {
            if !load.is_finite() || *load < 0.0 {
                error!("sweep.loads contains {load}, loads must be finite and not negative");
                contains_error = true;
            }
        }

        // jobs sharing a directory would overwrite each other's traces
        let mut directories = HashSet::new();
        for job in sweep::enumerate(self) {
            if !directories.insert(job.directory.clone()) {
                error!(
                    "Job {} maps to directory {} which is already used by another job, sweep values must stay distinct after lower-casing and truncating loads to percent",
                    job.id, job.directory
                );
                contains_error = true;
            }
        }

        for (name, empty) in [
            ("switch_algs", self.sweep.switch_algs.is_empty()),
            ("service_nums", self.sweep.service_nums.is_empty()),
            ("loads", self.sweep.loads.is_empty()),
            ("ecn_schemes", self.sweep.ecn_schemes.is_empty()),
        ] {
            if empty {
                warn!("sweep.{name} is empty, the sweep will not produce any job");
            }
        }

        // the simulator path is usually relative to the workdir
        let ns_path = self.simulator.workdir.join(&self.simulator.ns_path);
        match check_executable(&ns_path) {
            Ok(true) => debug!("Using simulator at {}", ns_path.to_string_lossy()),
            Ok(false) => warn!(
                "Simulator {} is not executable, every run will fail",
                ns_path.to_string_lossy()
            ),
            Err(e) => warn!("Failed to check simulator.ns_path: {e}"),
        }

        if contains_error {
            Err(ConfigErrors::PreflightFailed)
        } else {
            Ok(())
        }
    }
}
