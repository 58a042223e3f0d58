//! Durable per-run artifacts written under `<artifact_root>/<run_id>/`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run::RunId;

pub const JOB_FILE: &str = "job.json";
pub const OPTIMIZATION_RESULT_FILE: &str = "optimization_result.json";
pub const SIMULATION_RESULT_FILE: &str = "simulation_result.json";
pub const DIAGNOSTIC_FILE: &str = "diagnostic.json";
pub const WORKER_LOG_FILE: &str = "worker.log";

/// Result of a CRAC supply temperature bisection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BisectionArtifact {
    pub optimal_control_value: f64,
    pub target_constraint: f64,
}

/// Result of a genetic layout search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneticArtifact {
    /// Always `"GA"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub initial_objective: f64,
    pub minimized_objective: f64,
    pub best_assignment: Vec<usize>,
    /// Every evaluated individual in evaluation order.
    pub all_results: Vec<(Vec<usize>, f64)>,
}

impl GeneticArtifact {
    pub fn new(
        initial_objective: f64,
        minimized_objective: f64,
        best_assignment: Vec<usize>,
        all_results: Vec<(Vec<usize>, f64)>,
    ) -> Self {
        Self {
            kind: "GA".to_string(),
            initial_objective,
            minimized_objective,
            best_assignment,
            all_results,
        }
    }
}

/// Result of a plain simulation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationArtifact {
    pub max_temperature: f64,
}

/// Written whenever a run ends in `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub run_id: RunId,
    /// Error family, e.g. `oracle_execution_error`.
    pub kind: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(run_id: RunId, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            run_id,
            kind: kind.into(),
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }
}
