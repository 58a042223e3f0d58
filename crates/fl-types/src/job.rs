//! Job submissions: a room description plus the algorithm to run on it.

use serde::{Deserialize, Serialize};

use crate::config::DomainConfig;
use crate::errors::{FlError, FlResult};
use crate::region::BoundingBox;
use crate::run::RunStatus;

/// What a submitted job should do with its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Algorithm {
    /// Single simulation of the submitted layout.
    Simulation,
    /// Bisection over the CRAC supply temperature.
    Bisection(BisectionParams),
    /// Genetic search over rack placements.
    Genetic(GeneticParams),
}

impl Algorithm {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Simulation => JobKind::Simulation,
            Self::Bisection(_) => JobKind::Bisection,
            Self::Genetic(_) => JobKind::Genetic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Simulation,
    Bisection,
    Genetic,
}

impl JobKind {
    /// Status a run enters once its worker has been launched.
    pub fn running_status(&self) -> RunStatus {
        match self {
            Self::Simulation => RunStatus::Running,
            Self::Bisection | Self::Genetic => RunStatus::RunningOptimization,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simulation => write!(f, "simulation"),
            Self::Bisection => write!(f, "bisection"),
            Self::Genetic => write!(f, "genetic"),
        }
    }
}

/// Bisection over the CRAC supply temperature: find the warmest supply
/// temperature that keeps the peak room temperature at or below the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BisectionParams {
    #[serde(default = "default_target", alias = "target_max_temp_K")]
    pub target_max_temp_k: f64,
    #[serde(default = "default_low")]
    pub low: f64,
    /// Upper end of the bracket; defaults to the target temperature.
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default = "default_tolerance")]
    pub tolerance: Option<f64>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: Option<usize>,
}

fn default_target() -> f64 {
    308.15
}

fn default_low() -> f64 {
    288.15
}

fn default_tolerance() -> Option<f64> {
    Some(1.0)
}

fn default_max_iterations() -> Option<usize> {
    Some(5)
}

impl Default for BisectionParams {
    fn default() -> Self {
        Self {
            target_max_temp_k: default_target(),
            low: default_low(),
            high: None,
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl BisectionParams {
    pub fn high(&self) -> f64 {
        self.high.unwrap_or(self.target_max_temp_k)
    }

    pub fn validate(&self) -> FlResult<()> {
        if !self.target_max_temp_k.is_finite() || self.target_max_temp_k <= 0.0 {
            return Err(FlError::Config(format!(
                "target_max_temp_k must be a positive temperature, got {}",
                self.target_max_temp_k
            )));
        }
        if self.tolerance.is_none() && self.max_iterations.is_none() {
            return Err(FlError::Config(
                "bisection needs a tolerance or an iteration cap".into(),
            ));
        }
        if let Some(tol) = self.tolerance {
            if !tol.is_finite() || tol <= 0.0 {
                return Err(FlError::Config(format!(
                    "tolerance must be positive, got {tol}"
                )));
            }
        }
        if !(self.low < self.high()) {
            return Err(FlError::Config(format!(
                "bisection bracket is empty: low {} is not below high {}",
                self.low,
                self.high()
            )));
        }
        Ok(())
    }
}

/// Genetic search over rack placements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneticParams {
    #[serde(default = "default_mutation_scale")]
    pub mutation_scale: f64,
    #[serde(default = "default_generations")]
    pub generations: usize,
    #[serde(default = "default_individuals", alias = "num_per_gen")]
    pub individuals_per_generation: usize,
    /// Racks to move; defaults to every rack in the config.
    #[serde(default)]
    pub movable_objects: Option<Vec<String>>,
    /// Candidate placements; generated from the room when absent.
    #[serde(default)]
    pub candidate_positions: Option<Vec<BoundingBox>>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

fn default_mutation_scale() -> f64 {
    10.0
}

fn default_generations() -> usize {
    5
}

fn default_individuals() -> usize {
    4
}

fn default_max_attempts() -> usize {
    1000
}

impl Default for GeneticParams {
    fn default() -> Self {
        Self {
            mutation_scale: default_mutation_scale(),
            generations: default_generations(),
            individuals_per_generation: default_individuals(),
            movable_objects: None,
            candidate_positions: None,
            seed: None,
            max_attempts: default_max_attempts(),
        }
    }
}

/// A caller's request: what room, and what to do with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub config: DomainConfig,
    pub algorithm: Algorithm,
}

impl JobSubmission {
    pub fn new(config: DomainConfig, algorithm: Algorithm) -> Self {
        Self { config, algorithm }
    }

    pub fn kind(&self) -> JobKind {
        self.algorithm.kind()
    }
}
