//! The worker boundary: nothing that goes wrong inside a job escapes it.

use fl_oracle::{ExternalSolverFactory, OracleFactory};
use fl_types::{Diagnostic, FlError, FlResult, RunId, DIAGNOSTIC_FILE, JOB_FILE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::events::WorkerEvent;
use crate::pipeline::{run_job, write_artifact, JobPlan, WorkerJob};

/// Load `<run_dir>/job.json`.
pub fn load_job(job_file: &Path) -> FlResult<WorkerJob> {
    let bytes = std::fs::read(job_file)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Run a job against the external solver it names.
pub async fn run_worker(
    job: WorkerJob,
    run_dir: PathBuf,
    events: UnboundedSender<WorkerEvent>,
) -> WorkerEvent {
    let oracle: Arc<dyn OracleFactory> = Arc::new(ExternalSolverFactory::new(job.solver.clone()));
    run_worker_with(job, run_dir, oracle, events).await
}

/// Run a job with the given oracle and return its terminal report, which has
/// also been sent on `events`.
///
/// Errors and panics from the pipeline become a `Failed` report and a
/// `diagnostic.json` in the run directory.
pub async fn run_worker_with(
    job: WorkerJob,
    run_dir: PathBuf,
    oracle: Arc<dyn OracleFactory>,
    events: UnboundedSender<WorkerEvent>,
) -> WorkerEvent {
    let run_id = job.run_id;
    let kind = job.submission.kind();
    send(&events, WorkerEvent::Started { run_id, kind });
    info!(%run_id, %kind, run_dir = %run_dir.display(), "worker started");

    let pipeline = {
        let run_dir = run_dir.clone();
        let events = events.clone();
        tokio::spawn(async move {
            let plan = JobPlan::build(&job.submission, job.max_parallel)?;
            run_job(run_id, plan, &run_dir, oracle, &events).await
        })
    };

    let outcome = match pipeline.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(FlError::Internal(format!("worker pipeline panicked: {e}"))),
        Err(e) => Err(FlError::Internal(format!("worker pipeline was cancelled: {e}"))),
    };

    let report = match outcome {
        Ok(artifact) => {
            info!(%run_id, artifact, "run completed");
            WorkerEvent::Completed {
                run_id,
                artifact: artifact.to_string(),
            }
        }
        Err(e) => {
            error!(%run_id, kind = e.kind(), error = %e, "run failed");
            write_diagnostic(&run_dir, run_id, e.kind(), &e.to_string());
            WorkerEvent::Failed {
                run_id,
                kind: e.kind().to_string(),
                message: e.to_string(),
            }
        }
    };
    send(&events, report.clone());
    report
}

/// Persist a diagnostic, logging rather than failing if that is impossible.
pub fn write_diagnostic(run_dir: &Path, run_id: RunId, kind: &str, message: &str) {
    let diagnostic = Diagnostic::new(run_id, kind, message);
    if let Err(e) = write_artifact(run_dir, DIAGNOSTIC_FILE, &diagnostic) {
        warn!(%run_id, error = %e, "failed to write diagnostic");
    }
}

fn send(events: &UnboundedSender<WorkerEvent>, event: WorkerEvent) {
    if events.send(event).is_err() {
        warn!("worker event stream closed");
    }
}
