//! Orchestrator configuration.

use fl_oracle::SolverConfig;
use fl_types::{FlError, FlResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ARTIFACT_ROOT_ENV: &str = "FROSTLINE_ARTIFACT_ROOT";
pub const WORKER_BIN_ENV: &str = "FROSTLINE_WORKER_BIN";
pub const SOLVER_PROGRAM_ENV: &str = "FROSTLINE_SOLVER_PROGRAM";
pub const SOLVER_ARGS_ENV: &str = "FROSTLINE_SOLVER_ARGS";
pub const SOLVER_TIMEOUT_ENV: &str = "FROSTLINE_SOLVER_TIMEOUT_SECS";
pub const JOB_TIMEOUT_ENV: &str = "FROSTLINE_JOB_TIMEOUT_SECS";
pub const MAX_PARALLEL_ENV: &str = "FROSTLINE_MAX_PARALLEL";

const WORKER_BIN_NAME: &str = "fl-worker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Each run gets `<artifact_root>/<run_id>/`.
    pub artifact_root: PathBuf,
    pub worker_bin: PathBuf,
    pub solver: SolverConfig,
    /// Kill a worker that has not reported after this many seconds.
    pub job_timeout_secs: Option<u64>,
    /// Concurrent oracle evaluations within one GA generation.
    pub max_parallel: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("runs"),
            worker_bin: default_worker_bin(),
            solver: SolverConfig::default(),
            job_timeout_secs: None,
            max_parallel: 1,
        }
    }
}

impl EngineConfig {
    pub fn new(artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            artifact_root: artifact_root.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by any `FROSTLINE_*` variables that are set.
    pub fn from_env() -> FlResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> FlResult<Self> {
        let mut config = Self::default();
        if let Some(root) = lookup(ARTIFACT_ROOT_ENV) {
            config.artifact_root = PathBuf::from(root);
        }
        if let Some(bin) = lookup(WORKER_BIN_ENV) {
            config.worker_bin = PathBuf::from(bin);
        }
        if let Some(program) = lookup(SOLVER_PROGRAM_ENV) {
            config.solver.program = program;
        }
        if let Some(args) = lookup(SOLVER_ARGS_ENV) {
            config.solver.args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(secs) = lookup(SOLVER_TIMEOUT_ENV) {
            config.solver.timeout_secs = Some(parse_number(SOLVER_TIMEOUT_ENV, &secs)?);
        }
        if let Some(secs) = lookup(JOB_TIMEOUT_ENV) {
            config.job_timeout_secs = Some(parse_number(JOB_TIMEOUT_ENV, &secs)?);
        }
        if let Some(n) = lookup(MAX_PARALLEL_ENV) {
            config.max_parallel = parse_number(MAX_PARALLEL_ENV, &n)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_worker_bin(mut self, worker_bin: impl Into<PathBuf>) -> Self {
        self.worker_bin = worker_bin.into();
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_job_timeout_secs(mut self, secs: u64) -> Self {
        self.job_timeout_secs = Some(secs);
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn validate(&self) -> FlResult<()> {
        if self.max_parallel == 0 {
            return Err(FlError::Config(format!(
                "{MAX_PARALLEL_ENV} must be at least 1"
            )));
        }
        if self.solver.program.trim().is_empty() {
            return Err(FlError::Config("solver program must not be empty".into()));
        }
        Ok(())
    }
}

/// `fl-worker` next to the running executable, falling back to `$PATH`.
fn default_worker_bin() -> PathBuf {
    std::env::current_exe()
        .ok()
        .map(|exe| exe.with_file_name(WORKER_BIN_NAME))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(WORKER_BIN_NAME))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> FlResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| FlError::Config(format!("{key}={value:?} is not a valid number: {e}")))
}
