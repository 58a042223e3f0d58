//! Job submission, isolation, and supervision.
//!
//! Every accepted submission gets a run directory under the artifact root and
//! its own `fl-worker` process. A supervisor task per run reads the worker's
//! event stream, enforces the job timeout, and records the terminal status.

use fl_oracle::ProcessGroup;
use fl_types::{
    FlError, FlResult, JobSubmission, RunId, RunRecord, RunStatus, JOB_FILE, WORKER_LOG_FILE,
};
use std::path::{Component, Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::events::WorkerEvent;
use crate::pipeline::{write_artifact, JobPlan, WorkerJob};
use crate::registry::StatusRegistry;
use crate::worker::write_diagnostic;

/// How long a timed-out worker gets to stop its solvers after SIGTERM.
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct JobOrchestrator {
    config: Arc<EngineConfig>,
    registry: StatusRegistry,
}

impl JobOrchestrator {
    /// Must be called from within a tokio runtime.
    pub fn new(config: EngineConfig) -> FlResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.artifact_root)?;
        Ok(Self {
            config: Arc::new(config),
            registry: StatusRegistry::spawn(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run_dir(&self, run_id: RunId) -> PathBuf {
        self.config.artifact_root.join(run_id.to_string())
    }

    /// Validate a submission and launch its worker.
    ///
    /// Configuration errors are returned here and nothing is launched. Any
    /// later failure, including failing to start the worker, is recorded
    /// against the returned run.
    pub async fn submit(&self, submission: JobSubmission) -> FlResult<RunId> {
        let plan = JobPlan::build(&submission, self.config.max_parallel)?;
        let kind = plan.kind();
        let run_id = RunId::new();
        let run_dir = self.run_dir(run_id);

        // The run becomes visible only once its job file is on disk.
        tokio::fs::create_dir_all(&run_dir).await?;
        let job = WorkerJob {
            run_id,
            submission,
            solver: self.config.solver.clone(),
            max_parallel: self.config.max_parallel,
        };
        write_artifact(&run_dir, JOB_FILE, &job)?;
        self.registry.register(run_id, kind).await?;

        let worker = match self.launch(&run_dir) {
            Ok(worker) => worker,
            Err(e) => {
                error!(%run_id, error = %e, "failed to launch worker");
                write_diagnostic(&run_dir, run_id, e.kind(), &e.to_string());
                self.registry
                    .mark_failed(run_id, format!("failed to launch worker: {e}"))
                    .await?;
                return Ok(run_id);
            }
        };

        self.registry
            .transition(run_id, kind.running_status(), None)
            .await?;
        info!(%run_id, %kind, pid = worker.id(), "worker launched");

        tokio::spawn(supervise(
            self.registry.clone(),
            run_id,
            run_dir,
            worker,
            self.config.job_timeout_secs,
        ));
        Ok(run_id)
    }

    fn launch(&self, run_dir: &Path) -> FlResult<ProcessGroup> {
        let log = std::fs::File::create(run_dir.join(WORKER_LOG_FILE))?;
        let mut command = Command::new(&self.config.worker_bin);
        command
            .arg(run_dir.join(JOB_FILE))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(log));
        ProcessGroup::spawn(&mut command).map_err(|e| {
            FlError::Internal(format!(
                "cannot start {}: {e}",
                self.config.worker_bin.display()
            ))
        })
    }

    /// Current status of a run; `NotFound` for unknown runs.
    pub async fn poll_status(&self, run_id: RunId) -> RunStatus {
        self.registry.status(run_id).await
    }

    /// Like [`poll_status`](Self::poll_status) for a textual run id. Ids that
    /// do not parse are `NotFound`.
    pub async fn poll_status_str(&self, run_id: &str) -> RunStatus {
        match run_id.parse::<RunId>() {
            Ok(run_id) => self.poll_status(run_id).await,
            Err(_) => RunStatus::NotFound,
        }
    }

    pub async fn run_record(&self, run_id: RunId) -> Option<RunRecord> {
        self.registry.record(run_id).await
    }

    pub async fn runs(&self) -> Vec<RunRecord> {
        self.registry.list().await
    }

    /// Read a file from a run's directory. Only plain file names are served.
    pub async fn fetch_artifact(&self, run_id: RunId, filename: &str) -> FlResult<Vec<u8>> {
        let mut components = Path::new(filename).components();
        let plain = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !plain {
            return Err(FlError::NotFound(format!(
                "{filename} is not an artifact name"
            )));
        }

        let path = self.run_dir(run_id).join(filename);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FlError::NotFound(
                format!("run {run_id} has no artifact {filename}"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Poll until the run reaches a terminal status (or is unknown).
    pub async fn wait_for_terminal(
        &self,
        run_id: RunId,
        poll_interval: Duration,
        timeout: Duration,
    ) -> FlResult<RunStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.poll_status(run_id).await;
            if status.is_terminal() || status == RunStatus::NotFound {
                return Ok(status);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FlError::Internal(format!(
                    "run {run_id} still {status} after {timeout:?}"
                )));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

enum WorkerExit {
    Reported(WorkerEvent),
    Silent(std::io::Result<ExitStatus>),
    TimedOut(u64),
}

async fn supervise(
    registry: StatusRegistry,
    run_id: RunId,
    run_dir: PathBuf,
    mut worker: ProcessGroup,
    job_timeout_secs: Option<u64>,
) {
    let exit = match job_timeout_secs {
        Some(secs) => {
            let watched =
                tokio::time::timeout(Duration::from_secs(secs), watch(run_id, &mut worker)).await;
            match watched {
                Ok(exit) => exit,
                Err(_) => {
                    // SIGTERM lets the worker take its solvers down first.
                    if let Err(e) = worker.terminate(WORKER_SHUTDOWN_GRACE).await {
                        warn!(%run_id, error = %e, "failed to stop timed-out worker");
                    }
                    WorkerExit::TimedOut(secs)
                }
            }
        }
        None => watch(run_id, &mut worker).await,
    };

    let outcome = match exit {
        WorkerExit::Reported(WorkerEvent::Completed { artifact, .. }) => {
            info!(%run_id, %artifact, "run completed");
            registry.transition(run_id, RunStatus::Completed, None).await
        }
        WorkerExit::Reported(WorkerEvent::Failed { kind, message, .. }) => {
            warn!(%run_id, %kind, %message, "run failed");
            registry.mark_failed(run_id, message).await
        }
        WorkerExit::Reported(other) => {
            let message = format!("worker ended on a non-terminal report: {other:?}");
            fail(&registry, &run_dir, run_id, "worker_crash", message).await
        }
        WorkerExit::Silent(status) => {
            let status = match status {
                Ok(status) => status.to_string(),
                Err(e) => format!("unknown status ({e})"),
            };
            let message = format!("worker exited with {status} without reporting a result");
            fail(&registry, &run_dir, run_id, "worker_crash", message).await
        }
        WorkerExit::TimedOut(secs) => {
            let message = format!("job exceeded its {secs}s timeout and was killed");
            fail(&registry, &run_dir, run_id, "job_timeout", message).await
        }
    };

    if let Err(e) = outcome {
        error!(%run_id, error = %e, "could not record run outcome");
    }
}

/// Follow the worker's event stream until it closes, then reap the process.
async fn watch(run_id: RunId, worker: &mut ProcessGroup) -> WorkerExit {
    let mut terminal = None;
    if let Some(stdout) = worker.child_mut().stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match WorkerEvent::from_line(&line) {
                    Ok(event) if event.run_id() != run_id => {
                        warn!(%run_id, reported = %event.run_id(), "event for another run ignored");
                    }
                    Ok(event) if event.is_terminal() => terminal = Some(event),
                    Ok(event) => debug!(%run_id, ?event, "worker progress"),
                    Err(_) => debug!(%run_id, %line, "ignoring non-event worker output"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(%run_id, error = %e, "worker event stream failed");
                    break;
                }
            }
        }
    }

    let status = worker.wait().await;
    match terminal {
        Some(event) => WorkerExit::Reported(event),
        None => WorkerExit::Silent(status),
    }
}

async fn fail(
    registry: &StatusRegistry,
    run_dir: &Path,
    run_id: RunId,
    kind: &str,
    message: String,
) -> FlResult<bool> {
    error!(%run_id, kind, %message, "run failed");
    write_diagnostic(run_dir, run_id, kind, &message);
    registry.mark_failed(run_id, message).await
}
