use anyhow::Context;
use fl_engine::{init_tracing, load_job, run_worker, WorkerEvent};
use std::io::Write;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::warn;

/// Runs one job: `fl-worker <run_dir>/job.json`.
///
/// Reports go to stdout as JSON lines; logs go to stderr. On SIGTERM every
/// solver still running is killed before the worker exits.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let job_file = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: fl-worker <job.json>")?;
    let run_dir = job_file
        .parent()
        .map(PathBuf::from)
        .context("job file has no parent directory")?;
    let job = load_job(&job_file)
        .with_context(|| format!("failed to load {}", job_file.display()))?;

    let (events, mut receiver) = mpsc::unbounded_channel::<WorkerEvent>();
    let forwarder = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let stdout = std::io::stdout();
        while let Some(event) = receiver.blocking_recv() {
            let mut out = stdout.lock();
            writeln!(out, "{}", event.to_line()?)?;
            out.flush()?;
        }
        Ok(())
    });

    let report = tokio::select! {
        report = run_worker(job, run_dir, events) => report,
        _ = terminate.recv() => {
            let groups = fl_oracle::kill_live_groups();
            warn!(solver_groups = groups, "terminated, solvers killed");
            std::process::exit(143);
        }
    };
    forwarder.await.context("event forwarder panicked")??;

    if matches!(report, WorkerEvent::Failed { .. }) {
        std::process::exit(1);
    }
    Ok(())
}
