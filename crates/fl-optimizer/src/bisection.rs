//! Bisection over a scalar control with a monotonic acceptance predicate.

use fl_oracle::{evaluate, CaseDir, OracleFactory};
use fl_types::{BisectionParams, FlError, FlResult, Region};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Bracket and stopping rules for a bisection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BisectionConfig {
    pub low: f64,
    pub high: f64,
    pub tolerance: Option<f64>,
    pub max_iterations: Option<usize>,
}

impl BisectionConfig {
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            low,
            high,
            tolerance: None,
            max_iterations: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn validate(&self) -> FlResult<()> {
        if self.tolerance.is_none() && self.max_iterations.is_none() {
            return Err(FlError::Config(
                "bisection needs a tolerance or an iteration cap".into(),
            ));
        }
        if !self.low.is_finite() || !self.high.is_finite() {
            return Err(FlError::Config(format!(
                "bisection bounds must be finite, got [{}, {}]",
                self.low, self.high
            )));
        }
        if self.low >= self.high {
            return Err(FlError::Config(format!(
                "bisection bracket is empty: low {} is not below high {}",
                self.low, self.high
            )));
        }
        if let Some(tolerance) = self.tolerance {
            if !tolerance.is_finite() || tolerance <= 0.0 {
                return Err(FlError::Config(format!(
                    "tolerance must be positive, got {tolerance}"
                )));
            }
        }
        Ok(())
    }
}

impl From<&BisectionParams> for BisectionConfig {
    fn from(params: &BisectionParams) -> Self {
        Self {
            low: params.low,
            high: params.high(),
            tolerance: params.tolerance,
            max_iterations: params.max_iterations,
        }
    }
}

/// Current bracket and number of completed iterations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BisectionState {
    pub low: f64,
    pub high: f64,
    pub iteration: usize,
}

impl BisectionState {
    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Outcome of one bisection step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub control: f64,
    pub objective: f64,
    /// Whether the predicate held, moving `low` up to `control`.
    pub accepted: bool,
    pub low: f64,
    pub high: f64,
}

/// Searches for the largest control value whose simulated objective still
/// satisfies `predicate`.
///
/// `update` turns the base regions and a control value into the candidate
/// configuration. Each iteration is evaluated in its own scratch case
/// directory under `work_dir`, removed once the iteration ends.
pub struct BisectionOptimizer<U, P> {
    base: Vec<Region>,
    config: BisectionConfig,
    state: BisectionState,
    update: U,
    predicate: P,
    oracle: Arc<dyn OracleFactory>,
    work_dir: PathBuf,
    history: Vec<IterationRecord>,
}

impl<U, P> BisectionOptimizer<U, P>
where
    U: Fn(&[Region], f64) -> Vec<Region> + Send + Sync,
    P: Fn(f64) -> bool + Send + Sync,
{
    pub fn new(
        base: Vec<Region>,
        config: BisectionConfig,
        update: U,
        predicate: P,
        oracle: Arc<dyn OracleFactory>,
        work_dir: impl Into<PathBuf>,
    ) -> FlResult<Self> {
        config.validate()?;
        let state = BisectionState {
            low: config.low,
            high: config.high,
            iteration: 0,
        };
        Ok(Self {
            base,
            config,
            state,
            update,
            predicate,
            oracle,
            work_dir: work_dir.into(),
            history: Vec::new(),
        })
    }

    pub fn state(&self) -> BisectionState {
        self.state
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    pub fn is_converged(&self) -> bool {
        self.config
            .tolerance
            .is_some_and(|tolerance| self.state.width() < tolerance)
    }

    /// Evaluate the bracket midpoint and halve the bracket.
    pub async fn next_iteration(&mut self) -> FlResult<IterationRecord> {
        let iteration = self.state.iteration;
        let control = (self.state.low + self.state.high) / 2.0;
        let candidate = (self.update)(&self.base, control);

        let case = CaseDir::scratch(self.work_dir.join(format!("iter_{iteration}"))).await?;
        let objective = evaluate(self.oracle.as_ref(), &candidate, case.path()).await?;
        drop(case);

        let accepted = (self.predicate)(objective);
        if accepted {
            self.state.low = control;
        } else {
            self.state.high = control;
        }
        self.state.iteration += 1;

        let record = IterationRecord {
            iteration,
            control,
            objective,
            accepted,
            low: self.state.low,
            high: self.state.high,
        };
        info!(
            iteration,
            control,
            objective,
            accepted,
            low = self.state.low,
            high = self.state.high,
            "bisection iteration finished"
        );
        self.history.push(record.clone());
        Ok(record)
    }

    /// Iterate until the bracket is narrower than the tolerance.
    ///
    /// Returns `low`. Hitting the iteration cap is a [`FlError::ConvergenceFailure`]
    /// when a tolerance was requested, and a normal stop otherwise.
    pub async fn run(&mut self) -> FlResult<f64> {
        loop {
            if self.is_converged() {
                debug!(
                    iterations = self.state.iteration,
                    low = self.state.low,
                    high = self.state.high,
                    "bisection converged"
                );
                return Ok(self.state.low);
            }

            if let Some(cap) = self.config.max_iterations {
                if self.state.iteration >= cap {
                    return match self.config.tolerance {
                        Some(tolerance) => Err(FlError::ConvergenceFailure {
                            iterations: self.state.iteration,
                            low: self.state.low,
                            high: self.state.high,
                            tolerance,
                        }),
                        None => Ok(self.state.low),
                    };
                }
            }

            self.next_iteration().await?;
        }
    }
}
