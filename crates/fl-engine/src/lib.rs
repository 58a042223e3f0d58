//! # fl-engine
//!
//! Job orchestration for Frostline: run identities, the status registry,
//! one isolated worker process per run, and the worker-side pipeline that
//! turns a submission into a persisted result artifact.

pub mod config;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod worker;

pub use config::EngineConfig;
pub use events::WorkerEvent;
pub use logging::init_tracing;
pub use orchestrator::JobOrchestrator;
pub use pipeline::{run_job, JobPlan, WorkerJob, CASE_DIR, FINAL_CASE_DIR};
pub use registry::StatusRegistry;
pub use worker::{load_job, run_worker, run_worker_with};
