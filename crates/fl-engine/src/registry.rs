//! Run status store owned by a single task.
//!
//! All reads and writes go through [`StatusRegistry`] handles, which send
//! commands to the owning task and await its reply. The task exits once every
//! handle has been dropped.

use fl_types::{internal_error, FlResult, JobKind, RunId, RunRecord, RunStatus};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const COMMAND_BUFFER: usize = 256;

enum Command {
    Register {
        run_id: RunId,
        kind: JobKind,
        reply: oneshot::Sender<RunRecord>,
    },
    Transition {
        run_id: RunId,
        next: RunStatus,
        error: Option<String>,
        reply: oneshot::Sender<bool>,
    },
    Get {
        run_id: RunId,
        reply: oneshot::Sender<Option<RunRecord>>,
    },
    List {
        reply: oneshot::Sender<Vec<RunRecord>>,
    },
}

#[derive(Debug, Clone)]
pub struct StatusRegistry {
    sender: mpsc::Sender<Command>,
}

impl StatusRegistry {
    /// Start the owning task on the current runtime.
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(RegistryActor::new(receiver).run());
        Self { sender }
    }

    /// Add a `queued` record for a fresh run.
    pub async fn register(&self, run_id: RunId, kind: JobKind) -> FlResult<RunRecord> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Register {
            run_id,
            kind,
            reply,
        })
        .await?;
        response
            .await
            .map_err(|_| internal_error!("status registry dropped a reply"))
    }

    /// Move a run to `next`. Returns `false` when the registry refused the
    /// transition, either because the run is unknown or because it would
    /// move backwards.
    pub async fn transition(
        &self,
        run_id: RunId,
        next: RunStatus,
        error: Option<String>,
    ) -> FlResult<bool> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Transition {
            run_id,
            next,
            error,
            reply,
        })
        .await?;
        response
            .await
            .map_err(|_| internal_error!("status registry dropped a reply"))
    }

    pub async fn mark_failed(&self, run_id: RunId, error: impl Into<String>) -> FlResult<bool> {
        self.transition(run_id, RunStatus::Failed, Some(error.into()))
            .await
    }

    pub async fn record(&self, run_id: RunId) -> Option<RunRecord> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Get { run_id, reply }).await.ok()?;
        response.await.ok().flatten()
    }

    /// Current status; `NotFound` for unknown runs. Never fails.
    pub async fn status(&self, run_id: RunId) -> RunStatus {
        self.record(run_id)
            .await
            .map_or(RunStatus::NotFound, |record| record.status)
    }

    pub async fn list(&self) -> Vec<RunRecord> {
        let (reply, response) = oneshot::channel();
        if self.send(Command::List { reply }).await.is_err() {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    async fn send(&self, command: Command) -> FlResult<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| internal_error!("status registry is not running"))
    }
}

struct RegistryActor {
    records: HashMap<RunId, RunRecord>,
    receiver: mpsc::Receiver<Command>,
}

impl RegistryActor {
    fn new(receiver: mpsc::Receiver<Command>) -> Self {
        Self {
            records: HashMap::new(),
            receiver,
        }
    }

    async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            self.handle(command);
        }
        debug!(runs = self.records.len(), "status registry stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                run_id,
                kind,
                reply,
            } => {
                let record = self
                    .records
                    .entry(run_id)
                    .or_insert_with(|| RunRecord::new(run_id, kind))
                    .clone();
                let _ = reply.send(record);
            }
            Command::Transition {
                run_id,
                next,
                error,
                reply,
            } => {
                let applied = match self.records.get_mut(&run_id) {
                    Some(record) => {
                        let from = record.status;
                        let applied = match (next, error) {
                            (RunStatus::Failed, Some(error)) => record.mark_failed(error),
                            (next, _) => record.transition(next),
                        };
                        if applied {
                            debug!(%run_id, %from, to = %next, "run status changed");
                        } else {
                            warn!(%run_id, %from, to = %next, "rejected run status change");
                        }
                        applied
                    }
                    None => {
                        warn!(%run_id, to = %next, "status change for unknown run");
                        false
                    }
                };
                let _ = reply.send(applied);
            }
            Command::Get { run_id, reply } => {
                let _ = reply.send(self.records.get(&run_id).cloned());
            }
            Command::List { reply } => {
                let mut records: Vec<RunRecord> = self.records.values().cloned().collect();
                records.sort_by_key(|r| r.submitted_at);
                let _ = reply.send(records);
            }
        }
    }
}
