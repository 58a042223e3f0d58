//! What a worker does with a submission.
//!
//! [`JobPlan::build`] performs every check that can be done without running
//! the solver; the orchestrator calls it before launching a worker so that
//! configuration errors are rejected at submission time. [`run_job`] executes
//! a plan inside a run directory.

use fl_oracle::{evaluate, CaseDir, OracleFactory, SolverConfig};
use fl_optimizer::{
    AisleLayout, BisectionConfig, BisectionOptimizer, GeneticConfig, GeneticLayoutOptimizer,
    OptimizationDescriptor,
};
use fl_types::{
    validate_regions, with_cooler_set_temp, Algorithm, BisectionArtifact, ConfigTransformer,
    FlError, FlResult, GeneticArtifact, JobKind, JobSubmission, Region, RegionKind, RunId,
    SimulationArtifact, OPTIMIZATION_RESULT_FILE, SIMULATION_RESULT_FILE,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::events::WorkerEvent;

/// Case directory kept for a plain simulation.
pub const CASE_DIR: &str = "case";
/// Case directory kept for the verification run after an optimization.
pub const FINAL_CASE_DIR: &str = "final_case";
const BISECTION_WORK_DIR: &str = "bs_iterations";
const GENETIC_WORK_DIR: &str = "ga_work";

/// Everything a worker process needs, written to the run's `job.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub run_id: RunId,
    pub submission: JobSubmission,
    pub solver: SolverConfig,
    pub max_parallel: usize,
}

/// A validated submission, ready to execute.
#[derive(Debug, Clone)]
pub enum JobPlan {
    Simulation {
        regions: Vec<Region>,
    },
    Bisection {
        regions: Vec<Region>,
        config: BisectionConfig,
        target: f64,
    },
    Genetic {
        regions: Vec<Region>,
        descriptor: OptimizationDescriptor,
        config: GeneticConfig,
    },
}

impl JobPlan {
    pub fn build(submission: &JobSubmission, max_parallel: usize) -> FlResult<Self> {
        let regions = ConfigTransformer::transform(&submission.config)?;
        validate_regions(&regions)?;

        match &submission.algorithm {
            Algorithm::Simulation => Ok(Self::Simulation { regions }),
            Algorithm::Bisection(params) => {
                params.validate()?;
                if !regions
                    .iter()
                    .any(|r| matches!(r.kind, RegionKind::Cooler { .. }))
                {
                    return Err(FlError::Config(
                        "supply temperature bisection needs at least one CRAC".into(),
                    ));
                }
                let config = BisectionConfig::from(params);
                config.validate()?;
                Ok(Self::Bisection {
                    regions,
                    config,
                    target: params.target_max_temp_k,
                })
            }
            Algorithm::Genetic(params) => {
                let descriptor = AisleLayout::default().descriptor_for(&submission.config, params)?;
                descriptor.validate(&regions)?;
                let config = GeneticConfig::from(params).with_max_parallel(max_parallel);
                config.validate()?;
                Ok(Self::Genetic {
                    regions,
                    descriptor,
                    config,
                })
            }
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::Simulation { .. } => JobKind::Simulation,
            Self::Bisection { .. } => JobKind::Bisection,
            Self::Genetic { .. } => JobKind::Genetic,
        }
    }
}

/// Execute `plan` for `run_id` inside `run_dir` and write its result
/// artifact. Returns the artifact's file name.
pub async fn run_job(
    run_id: RunId,
    plan: JobPlan,
    run_dir: &Path,
    oracle: Arc<dyn OracleFactory>,
    events: &UnboundedSender<WorkerEvent>,
) -> FlResult<&'static str> {
    match plan {
        JobPlan::Simulation { regions } => {
            let case = CaseDir::retained(run_dir.join(CASE_DIR)).await?;
            let max_temperature = evaluate(oracle.as_ref(), &regions, case.path()).await?;
            info!(%run_id, max_temperature, "simulation finished");
            write_artifact(
                run_dir,
                SIMULATION_RESULT_FILE,
                &SimulationArtifact { max_temperature },
            )?;
            Ok(SIMULATION_RESULT_FILE)
        }
        JobPlan::Bisection {
            regions,
            config,
            target,
        } => {
            emit(
                events,
                WorkerEvent::progress(run_id, "bisection", "searching supply temperature"),
            );
            let work_dir = run_dir.join(BISECTION_WORK_DIR);
            let mut optimizer = BisectionOptimizer::new(
                regions.clone(),
                config,
                with_cooler_set_temp,
                move |max_temperature: f64| max_temperature <= target,
                Arc::clone(&oracle),
                &work_dir,
            )?;
            let outcome = optimizer.run().await;
            remove_work_dir(&work_dir);
            let optimal = outcome?;
            info!(
                %run_id,
                optimal_supply_temp = optimal,
                iterations = optimizer.state().iteration,
                "bisection finished"
            );

            let detail = format!("simulating supply temperature {optimal:.2} K");
            emit(events, WorkerEvent::progress(run_id, "verification", detail));
            let verified = verify(
                oracle.as_ref(),
                &with_cooler_set_temp(&regions, optimal),
                run_dir,
            )
            .await?;
            info!(%run_id, max_temperature = verified, target, "verification simulation finished");

            write_artifact(
                run_dir,
                OPTIMIZATION_RESULT_FILE,
                &BisectionArtifact {
                    optimal_control_value: optimal,
                    target_constraint: target,
                },
            )?;
            Ok(OPTIMIZATION_RESULT_FILE)
        }
        JobPlan::Genetic {
            regions,
            descriptor,
            config,
        } => {
            let outcome =
                run_genetic(run_id, regions, descriptor, config, &oracle, run_dir, events).await;
            remove_work_dir(&run_dir.join(GENETIC_WORK_DIR));
            let artifact = outcome?;
            write_artifact(run_dir, OPTIMIZATION_RESULT_FILE, &artifact)?;
            Ok(OPTIMIZATION_RESULT_FILE)
        }
    }
}

async fn run_genetic(
    run_id: RunId,
    regions: Vec<Region>,
    descriptor: OptimizationDescriptor,
    config: GeneticConfig,
    oracle: &Arc<dyn OracleFactory>,
    run_dir: &Path,
    events: &UnboundedSender<WorkerEvent>,
) -> FlResult<GeneticArtifact> {
    let work_dir = run_dir.join(GENETIC_WORK_DIR);
    emit(
        events,
        WorkerEvent::progress(run_id, "baseline", "simulating submitted layout"),
    );
    let baseline = {
        let case = CaseDir::scratch(work_dir.join("baseline")).await?;
        evaluate(oracle.as_ref(), &regions, case.path()).await?
    };
    info!(%run_id, objective = baseline, "baseline simulation finished");

    let detail = format!(
        "{} generations of {} layouts",
        config.generations, config.individuals_per_generation
    );
    emit(events, WorkerEvent::progress(run_id, "genetic", detail));
    let optimizer = GeneticLayoutOptimizer::new(
        regions.clone(),
        descriptor.clone(),
        config,
        Arc::clone(oracle),
        &work_dir,
    )?;
    let outcome = optimizer.run().await?;

    emit(
        events,
        WorkerEvent::progress(run_id, "verification", "simulating best layout"),
    );
    let best_layout = descriptor.apply(&regions, &outcome.best.assignment)?;
    let verified = verify(oracle.as_ref(), &best_layout, run_dir).await?;
    info!(
        %run_id,
        initial = baseline,
        minimized = outcome.best.objective,
        verified,
        evaluated = outcome.archive.len(),
        "genetic layout search finished"
    );

    Ok(GeneticArtifact::new(
        baseline,
        outcome.best.objective,
        outcome.best.assignment,
        outcome.archive.to_pairs(),
    ))
}

/// Simulate the optimized configuration once more in the retained final case.
async fn verify(
    oracle: &dyn OracleFactory,
    regions: &[Region],
    run_dir: &Path,
) -> FlResult<f64> {
    let case = CaseDir::retained(run_dir.join(FINAL_CASE_DIR)).await?;
    Ok(evaluate(oracle, regions, case.path()).await?)
}

pub fn write_artifact<T: Serialize>(run_dir: &Path, name: &str, artifact: &T) -> FlResult<()> {
    let bytes = serde_json::to_vec_pretty(artifact)?;
    std::fs::write(run_dir.join(name), bytes)?;
    Ok(())
}

fn remove_work_dir(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove work directory"),
    }
}

fn emit(events: &UnboundedSender<WorkerEvent>, event: WorkerEvent) {
    if events.send(event).is_err() {
        warn!("worker event stream closed");
    }
}
