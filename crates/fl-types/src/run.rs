//! Run identity and lifecycle tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::job::JobKind;

/// Opaque, globally unique identity of one submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    RunningOptimization,
    Completed,
    Failed,
    /// Query-only answer for identities the registry has never seen.
    NotFound,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn stage(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running | Self::RunningOptimization => 1,
            Self::Completed | Self::Failed => 2,
            Self::NotFound => u8::MAX,
        }
    }

    /// Forward-only transitions; `Failed` is reachable from any non-terminal
    /// state and `NotFound` is never stored.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        if *self == Self::NotFound || next == Self::NotFound || self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            Self::Completed => self.stage() == 1,
            _ => next.stage() > self.stage(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::RunningOptimization => "running_optimization",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry entry for a submitted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub kind: JobKind,
    pub status: RunStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(run_id: RunId, kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            kind,
            status: RunStatus::Queued,
            submitted_at: now,
            updated_at: now,
            finished_at: None,
            error: None,
        }
    }

    /// Apply a status change. Returns `false` (and leaves the record
    /// untouched) when the transition would move backwards.
    pub fn transition(&mut self, next: RunStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.finished_at = Some(self.updated_at);
        }
        true
    }

    pub fn mark_failed(&mut self, error: String) -> bool {
        let changed = self.transition(RunStatus::Failed);
        if changed {
            self.error = Some(error);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_round_trips_through_string() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<RunId>().is_err());
    }

    #[test]
    fn run_ids_are_unique() {
        let ids: std::collections::HashSet<RunId> = (0..100).map(|_| RunId::new()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn record_lifecycle() {
        let mut record = RunRecord::new(RunId::new(), JobKind::Genetic);
        assert_eq!(record.status, RunStatus::Queued);
        assert!(record.finished_at.is_none());

        assert!(record.transition(record.kind.running_status()));
        assert_eq!(record.status, RunStatus::RunningOptimization);

        assert!(record.transition(RunStatus::Completed));
        assert_eq!(record.status, RunStatus::Completed);
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut record = RunRecord::new(RunId::new(), JobKind::Simulation);
        record.transition(RunStatus::Running);
        assert!(record.mark_failed("solver exited with 1".into()));
        assert!(!record.transition(RunStatus::Completed));
        assert!(!record.transition(RunStatus::Running));
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("solver exited with 1"));
    }

    #[test]
    fn failed_reachable_from_queued() {
        let mut record = RunRecord::new(RunId::new(), JobKind::Bisection);
        assert!(record.mark_failed("worker could not be launched".into()));
    }

    #[test]
    fn no_backwards_or_skipping_transitions() {
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Queued));
        assert!(!RunStatus::Queued.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::RunningOptimization));
        assert!(!RunStatus::Queued.can_transition_to(RunStatus::NotFound));
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Running));
        assert!(RunStatus::RunningOptimization.can_transition_to(RunStatus::Completed));
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&RunStatus::RunningOptimization).unwrap(),
            "\"running_optimization\""
        );
        assert_eq!(RunStatus::NotFound.to_string(), "not_found");
    }
}
