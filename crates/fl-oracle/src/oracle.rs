//! The simulation oracle contract.

use async_trait::async_trait;
use fl_types::{OracleResult, Region};
use std::path::Path;
use tracing::debug;

/// One simulation attempt against the external solver.
///
/// The three phases are called in order and each runs to completion before the
/// next starts. An oracle never retries on its own.
#[async_trait]
pub trait SimulationOracle: Send {
    /// Write the solver input artifacts for this attempt.
    async fn prepare(&mut self, regions: &[Region]) -> OracleResult<()>;

    /// Run the solver. Fails on non-zero exit, timeout, or missing output.
    async fn execute(&mut self) -> OracleResult<()>;

    /// Peak temperature of the most recent successful execution.
    fn read_objective(&self) -> OracleResult<f64>;
}

/// Opens one oracle per case directory.
///
/// Working directories are always passed explicitly so that attempts can run
/// side by side.
pub trait OracleFactory: Send + Sync {
    fn open(&self, case_dir: &Path) -> Box<dyn SimulationOracle>;

    /// Human-readable oracle name.
    fn name(&self) -> &str;
}

/// Run all three phases for `regions` in `case_dir` and return the objective.
pub async fn evaluate(
    factory: &dyn OracleFactory,
    regions: &[Region],
    case_dir: &Path,
) -> OracleResult<f64> {
    let mut oracle = factory.open(case_dir);
    oracle.prepare(regions).await?;
    oracle.execute().await?;
    let objective = oracle.read_objective()?;
    debug!(
        oracle = factory.name(),
        case_dir = %case_dir.display(),
        objective,
        "oracle evaluation finished"
    );
    Ok(objective)
}
