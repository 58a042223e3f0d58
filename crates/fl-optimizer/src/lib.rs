//! # fl-optimizer
//!
//! Search algorithms for Frostline.
//!
//! Provides supply-temperature bisection against a monotonic acceptance
//! predicate, a genetic search over rack placements with a deterministic
//! results archive, and the aisle-grid planner that proposes candidate
//! positions.

mod archive;
mod bisection;
mod genetic;
mod layout;

pub use archive::{Assignment, Evaluation, ResultsArchive};
pub use bisection::{BisectionConfig, BisectionOptimizer, BisectionState, IterationRecord};
pub use genetic::{crossover, mutate, GeneticConfig, GeneticLayoutOptimizer, GeneticOutcome};
pub use layout::{AisleLayout, OptimizationDescriptor};
