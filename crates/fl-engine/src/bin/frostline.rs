use anyhow::{bail, Context};
use fl_engine::{init_tracing, EngineConfig, JobOrchestrator};
use fl_types::{
    JobKind, JobSubmission, RunStatus, DIAGNOSTIC_FILE, OPTIMIZATION_RESULT_FILE,
    SIMULATION_RESULT_FILE,
};
use std::time::Duration;
use tracing::info;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const WAIT_LIMIT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Submit a job file, wait for it, and print its result artifact.
///
/// Configuration comes from `FROSTLINE_*` environment variables.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let path = std::env::args()
        .nth(1)
        .context("usage: frostline <submission.json>")?;
    let bytes = std::fs::read(&path).with_context(|| format!("failed to read {path}"))?;
    let submission: JobSubmission =
        serde_json::from_slice(&bytes)
            .with_context(|| format!("{path} is not a valid submission"))?;
    let kind = submission.kind();

    let orchestrator = JobOrchestrator::new(EngineConfig::from_env()?)?;
    let run_id = orchestrator.submit(submission).await?;
    info!(%run_id, %kind, run_dir = %orchestrator.run_dir(run_id).display(), "submitted");

    let status = orchestrator
        .wait_for_terminal(run_id, POLL_INTERVAL, WAIT_LIMIT)
        .await?;
    let artifact = match (status, kind) {
        (RunStatus::Completed, JobKind::Simulation) => SIMULATION_RESULT_FILE,
        (RunStatus::Completed, _) => OPTIMIZATION_RESULT_FILE,
        _ => DIAGNOSTIC_FILE,
    };
    let body = orchestrator.fetch_artifact(run_id, artifact).await?;
    println!("{}", String::from_utf8_lossy(&body));

    if status != RunStatus::Completed {
        bail!("run {run_id} finished as {status}");
    }
    Ok(())
}
