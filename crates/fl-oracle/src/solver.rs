//! Oracle adapter around an external solver process.
//!
//! The solver is any program that, started inside the case directory, reads
//! the region list from `regions.json` and writes `results.json` containing
//! `{"max_temperature": <kelvin>}`. Meshing and CFD happen entirely inside that
//! program.

use async_trait::async_trait;
use fl_types::{OracleError, OracleResult, Region};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::oracle::{OracleFactory, SimulationOracle};
use crate::process::ProcessGroup;

/// How to invoke the external solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Kill the solver after this many seconds. `None` waits forever.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_input_file")]
    pub input_file: String,
    #[serde(default = "default_result_file")]
    pub result_file: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_input_file() -> String {
    "regions.json".to_string()
}

fn default_result_file() -> String {
    "results.json".to_string()
}

fn default_log_file() -> String {
    "solver.log".to_string()
}

impl SolverConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout_secs: None,
            input_file: default_input_file(),
            result_file: default_result_file(),
            log_file: default_log_file(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self::new("frostline-solver")
    }
}

/// Contents of the solver's result file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOutput {
    pub max_temperature: f64,
}

/// Opens [`ExternalSolver`] attempts sharing one [`SolverConfig`].
#[derive(Debug, Clone)]
pub struct ExternalSolverFactory {
    config: Arc<SolverConfig>,
}

impl ExternalSolverFactory {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl OracleFactory for ExternalSolverFactory {
    fn open(&self, case_dir: &Path) -> Box<dyn SimulationOracle> {
        Box::new(ExternalSolver {
            config: Arc::clone(&self.config),
            case_dir: case_dir.to_path_buf(),
            objective: None,
        })
    }

    fn name(&self) -> &str {
        "external-solver"
    }
}

/// One attempt of the external solver inside a fixed case directory.
#[derive(Debug)]
pub struct ExternalSolver {
    config: Arc<SolverConfig>,
    case_dir: PathBuf,
    objective: Option<f64>,
}

impl ExternalSolver {
    fn log_path(&self) -> PathBuf {
        self.case_dir.join(&self.config.log_file)
    }

    fn execution_error(&self, status: String) -> OracleError {
        OracleError::Execution {
            command: self.config.command_line(),
            status,
            log: self.log_path().display().to_string(),
        }
    }

    async fn read_output(&self) -> OracleResult<f64> {
        let path = self.case_dir.join(&self.config.result_file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OracleError::MissingOutput {
                    path: path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let output: SolverOutput =
            serde_json::from_slice(&bytes).map_err(|e| OracleError::MalformedOutput {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        if !output.max_temperature.is_finite() {
            return Err(OracleError::MalformedOutput {
                path: path.display().to_string(),
                message: format!("max_temperature is not finite: {}", output.max_temperature),
            });
        }
        Ok(output.max_temperature)
    }
}

#[async_trait]
impl SimulationOracle for ExternalSolver {
    async fn prepare(&mut self, regions: &[Region]) -> OracleResult<()> {
        self.objective = None;
        tokio::fs::create_dir_all(&self.case_dir).await?;

        // A result left over from an earlier attempt must not be mistaken for
        // this one's output.
        let stale = self.case_dir.join(&self.config.result_file);
        if tokio::fs::try_exists(&stale).await? {
            tokio::fs::remove_file(&stale).await?;
        }

        let input = serde_json::to_vec_pretty(regions).map_err(|e| OracleError::MalformedOutput {
            path: self.config.input_file.clone(),
            message: e.to_string(),
        })?;
        tokio::fs::write(self.case_dir.join(&self.config.input_file), input).await?;
        Ok(())
    }

    async fn execute(&mut self) -> OracleResult<()> {
        self.objective = None;

        let log = tokio::fs::File::create(self.log_path())
            .await?
            .into_std()
            .await;
        let log_err = log.try_clone()?;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .current_dir(&self.case_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        info!(
            command = %self.config.command_line(),
            case_dir = %self.case_dir.display(),
            "starting solver"
        );

        let mut solver = ProcessGroup::spawn(&mut command)
            .map_err(|e| self.execution_error(format!("spawn failure: {e}")))?;

        let status = match self.config.timeout_secs {
            Some(secs) => {
                let finished = tokio::time::timeout(Duration::from_secs(secs), solver.wait()).await;
                match finished {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!(
                            command = %self.config.command_line(),
                            timeout_secs = secs,
                            "solver timed out, killing its process group"
                        );
                        if let Err(e) = solver.kill().await {
                            warn!(error = %e, "failed to kill timed-out solver");
                        }
                        return Err(OracleError::Timeout {
                            command: self.config.command_line(),
                            timeout_secs: secs,
                        });
                    }
                }
            }
            None => solver.wait().await?,
        };

        if !status.success() {
            return Err(self.execution_error(status.to_string()));
        }

        self.objective = Some(self.read_output().await?);
        Ok(())
    }

    fn read_objective(&self) -> OracleResult<f64> {
        self.objective.ok_or(OracleError::ResultUnavailable)
    }
}
