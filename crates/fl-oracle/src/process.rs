//! Child programs that run as the leader of their own process group.
//!
//! Solvers are usually driver scripts that fork meshing and CFD stages, so a
//! solver is always signalled as a whole group. Groups still alive are tracked
//! process-wide so a worker being shut down can take them with it.

use std::collections::BTreeSet;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

static LIVE_GROUPS: Mutex<BTreeSet<u32>> = Mutex::new(BTreeSet::new());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Term,
    Kill,
}

impl Signal {
    fn name(self) -> &'static str {
        match self {
            Signal::Term => "TERM",
            Signal::Kill => "KILL",
        }
    }
}

/// A spawned child and the process group it leads.
///
/// Dropping the handle kills the whole group.
#[derive(Debug)]
pub struct ProcessGroup {
    child: Child,
    pgid: Option<u32>,
}

impl ProcessGroup {
    pub fn spawn(command: &mut Command) -> io::Result<Self> {
        #[cfg(unix)]
        command.process_group(0);
        let child = command.kill_on_drop(true).spawn()?;
        let pgid = child.id();
        if let Some(pgid) = pgid {
            live_groups().insert(pgid);
        }
        Ok(Self { child, pgid })
    }

    /// Process id of the group leader while it has not been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Wait for the leader to exit, then kill anything it left behind in the
    /// group.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await;
        self.release(Signal::Kill);
        status
    }

    /// Kill the whole group and reap the leader.
    pub async fn kill(&mut self) -> io::Result<()> {
        self.release(Signal::Kill);
        match self.child.try_wait()? {
            Some(_) => Ok(()),
            None => self.child.kill().await,
        }
    }

    /// Ask the group to stop with SIGTERM and kill it if the leader is still
    /// running after `grace`.
    pub async fn terminate(&mut self, grace: Duration) -> io::Result<()> {
        if let Some(pgid) = self.pgid {
            signal_group(pgid, Signal::Term);
        }
        let exited = tokio::time::timeout(grace, self.child.wait()).await;
        if exited.is_err() {
            warn!(
                pgid = ?self.pgid,
                grace_ms = grace.as_millis() as u64,
                "process group ignored SIGTERM"
            );
        }
        self.kill().await
    }

    fn release(&mut self, signal: Signal) {
        if let Some(pgid) = self.pgid.take() {
            signal_group(pgid, signal);
            live_groups().remove(&pgid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.release(Signal::Kill);
    }
}

/// SIGKILL every group started through [`ProcessGroup`] in this process that
/// has not been released yet. Returns how many groups were signalled.
pub fn kill_live_groups() -> usize {
    let groups = std::mem::take(&mut *live_groups());
    for &pgid in &groups {
        signal_group(pgid, Signal::Kill);
    }
    groups.len()
}

fn live_groups() -> MutexGuard<'static, BTreeSet<u32>> {
    LIVE_GROUPS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Send `signal` to every process in group `pgid`.
fn signal_group(pgid: u32, signal: Signal) {
    if cfg!(not(unix)) {
        return;
    }
    let target = format!("-{pgid}");
    let sent = std::process::Command::new("kill")
        .args(["-s", signal.name(), "--", &target])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match sent {
        Ok(status) if status.success() => {
            debug!(pgid, signal = signal.name(), "signalled process group")
        }
        Ok(_) => debug!(pgid, signal = signal.name(), "process group already gone"),
        Err(e) => warn!(pgid, error = %e, "failed to run kill"),
    }
}
