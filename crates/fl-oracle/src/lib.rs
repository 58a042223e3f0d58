//! # fl-oracle
//!
//! The simulation oracle seam for Frostline.
//!
//! Provides the three-phase [`SimulationOracle`] contract, an adapter that
//! drives an external solver process group, a closure-backed oracle for dry runs, and
//! scoped case directories.

mod case_dir;
mod function;
mod oracle;
mod process;
mod solver;

pub use case_dir::CaseDir;
pub use function::FnOracleFactory;
pub use oracle::{evaluate, OracleFactory, SimulationOracle};
pub use process::{kill_live_groups, ProcessGroup};
pub use solver::{ExternalSolver, ExternalSolverFactory, SolverConfig, SolverOutput};
