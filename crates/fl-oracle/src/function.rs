//! In-process oracle backed by a closure.
//!
//! Useful for dry runs and for exercising the optimizers without a solver
//! installed. The closure sees exactly the regions a real solver would have
//! been given.

use async_trait::async_trait;
use fl_types::{OracleError, OracleResult, Region};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::oracle::{OracleFactory, SimulationOracle};

type ObjectiveFn = dyn Fn(&[Region]) -> OracleResult<f64> + Send + Sync;

#[derive(Clone)]
pub struct FnOracleFactory {
    objective: Arc<ObjectiveFn>,
}

impl FnOracleFactory {
    pub fn new<F>(objective: F) -> Self
    where
        F: Fn(&[Region]) -> OracleResult<f64> + Send + Sync + 'static,
    {
        Self {
            objective: Arc::new(objective),
        }
    }
}

impl std::fmt::Debug for FnOracleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnOracleFactory").finish_non_exhaustive()
    }
}

impl OracleFactory for FnOracleFactory {
    fn open(&self, case_dir: &Path) -> Box<dyn SimulationOracle> {
        Box::new(FnOracle {
            objective: Arc::clone(&self.objective),
            case_dir: case_dir.to_path_buf(),
            regions: None,
            result: None,
        })
    }

    fn name(&self) -> &str {
        "function"
    }
}

struct FnOracle {
    objective: Arc<ObjectiveFn>,
    case_dir: PathBuf,
    regions: Option<Vec<Region>>,
    result: Option<f64>,
}

#[async_trait]
impl SimulationOracle for FnOracle {
    async fn prepare(&mut self, regions: &[Region]) -> OracleResult<()> {
        self.result = None;
        tokio::fs::create_dir_all(&self.case_dir).await?;
        let input = serde_json::to_vec(regions).map_err(|e| OracleError::MalformedOutput {
            path: "regions.json".into(),
            message: e.to_string(),
        })?;
        tokio::fs::write(self.case_dir.join("regions.json"), input).await?;
        self.regions = Some(regions.to_vec());
        Ok(())
    }

    async fn execute(&mut self) -> OracleResult<()> {
        self.result = None;
        let regions = self.regions.as_deref().ok_or_else(|| OracleError::Execution {
            command: "function".into(),
            status: "execute called before prepare".into(),
            log: self.case_dir.display().to_string(),
        })?;
        self.result = Some((self.objective)(regions)?);
        Ok(())
    }

    fn read_objective(&self) -> OracleResult<f64> {
        self.result.ok_or(OracleError::ResultUnavailable)
    }
}
