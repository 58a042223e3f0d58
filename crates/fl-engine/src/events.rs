//! Worker-to-orchestrator reports, one JSON object per stdout line.

use fl_types::{FlResult, JobKind, RunId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    Started {
        run_id: RunId,
        kind: JobKind,
    },
    Progress {
        run_id: RunId,
        stage: String,
        detail: String,
    },
    Completed {
        run_id: RunId,
        /// File name of the result artifact inside the run directory.
        artifact: String,
    },
    Failed {
        run_id: RunId,
        kind: String,
        message: String,
    },
}

impl WorkerEvent {
    pub fn progress(run_id: RunId, stage: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Progress {
            run_id,
            stage: stage.into(),
            detail: detail.into(),
        }
    }

    pub fn run_id(&self) -> RunId {
        match self {
            Self::Started { run_id, .. }
            | Self::Progress { run_id, .. }
            | Self::Completed { run_id, .. }
            | Self::Failed { run_id, .. } => *run_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    pub fn to_line(&self) -> FlResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_line(line: &str) -> FlResult<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}
