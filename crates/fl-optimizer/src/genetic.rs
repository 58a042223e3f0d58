//! Genetic search over injective rack-to-position assignments.
//!
//! Every individual maps each movable object, in descriptor order, to a
//! distinct candidate position. Individuals are compared as ordered tuples:
//! `[0, 1]` and `[1, 0]` are different layouts.

use fl_oracle::{evaluate, CaseDir, OracleFactory};
use fl_types::{internal_error, BoundingBox, FlError, FlResult, GeneticParams, Region};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Exp;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::archive::{Assignment, Evaluation, ResultsArchive};
use crate::layout::OptimizationDescriptor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneticConfig {
    /// Mean of the exponential mutation radius, in metres.
    pub mutation_scale: f64,
    pub generations: usize,
    pub individuals_per_generation: usize,
    /// Draws allowed per generation before giving up on finding new
    /// individuals.
    pub max_attempts: usize,
    pub seed: Option<u64>,
    /// Oracle evaluations allowed to run at once within a generation.
    pub max_parallel: usize,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self::from(&GeneticParams::default())
    }
}

impl From<&GeneticParams> for GeneticConfig {
    fn from(params: &GeneticParams) -> Self {
        Self {
            mutation_scale: params.mutation_scale,
            generations: params.generations,
            individuals_per_generation: params.individuals_per_generation,
            max_attempts: params.max_attempts,
            seed: params.seed,
            max_parallel: 1,
        }
    }
}

impl GeneticConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn validate(&self) -> FlResult<()> {
        if !self.mutation_scale.is_finite() || self.mutation_scale < 0.0 {
            return Err(FlError::Config(format!(
                "mutation_scale must be a non-negative number, got {}",
                self.mutation_scale
            )));
        }
        if self.generations == 0 {
            return Err(FlError::Config("generations must be at least 1".into()));
        }
        if self.individuals_per_generation == 0 {
            return Err(FlError::Config(
                "individuals_per_generation must be at least 1".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(FlError::Config("max_attempts must be at least 1".into()));
        }
        if self.max_parallel == 0 {
            return Err(FlError::Config("max_parallel must be at least 1".into()));
        }
        Ok(())
    }
}

/// Result of a completed genetic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneticOutcome {
    pub best: Evaluation,
    pub archive: ResultsArchive,
}

pub struct GeneticLayoutOptimizer {
    base: Arc<Vec<Region>>,
    descriptor: Arc<OptimizationDescriptor>,
    config: GeneticConfig,
    oracle: Arc<dyn OracleFactory>,
    work_dir: PathBuf,
    rng: ChaCha8Rng,
    archive: ResultsArchive,
    generation: usize,
}

impl GeneticLayoutOptimizer {
    pub fn new(
        base: Vec<Region>,
        descriptor: OptimizationDescriptor,
        config: GeneticConfig,
        oracle: Arc<dyn OracleFactory>,
        work_dir: impl Into<PathBuf>,
    ) -> FlResult<Self> {
        config.validate()?;
        descriptor.validate(&base)?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Self {
            base: Arc::new(base),
            descriptor: Arc::new(descriptor),
            config,
            oracle,
            work_dir: work_dir.into(),
            rng,
            archive: ResultsArchive::new(),
            generation: 0,
        })
    }

    /// Random distinct assignments for the first generation.
    pub fn initial_population(&mut self) -> FlResult<Vec<Assignment>> {
        let wanted = self.config.individuals_per_generation;
        if let Some(space) = self.descriptor.assignment_space() {
            if space < wanted as u128 {
                return Err(FlError::SearchExhausted {
                    attempts: 0,
                    message: format!(
                        "only {space} distinct layouts exist but a generation needs {wanted}"
                    ),
                });
            }
        }

        let pool = self.descriptor.candidate_positions.len();
        let slots = self.descriptor.movable_objects.len();
        let mut population: Vec<Assignment> = Vec::with_capacity(wanted);
        let mut attempts = 0;
        while population.len() < wanted {
            if attempts >= self.config.max_attempts {
                return Err(FlError::SearchExhausted {
                    attempts,
                    message: format!(
                        "drew {} of {wanted} distinct initial layouts",
                        population.len()
                    ),
                });
            }
            attempts += 1;
            let individual = rand::seq::index::sample(&mut self.rng, pool, slots).into_vec();
            if !population.contains(&individual) {
                population.push(individual);
            }
        }
        debug!(attempts, individuals = population.len(), "initial population drawn");
        Ok(population)
    }

    /// Breed a full generation of children never seen before in this run.
    pub fn breed_generation(&mut self) -> FlResult<Vec<Assignment>> {
        let wanted = self.config.individuals_per_generation;
        let space = self.descriptor.assignment_space();
        let positions = &self.descriptor.candidate_positions;
        let archive = &self.archive;
        let rng = &mut self.rng;

        let ranked = archive.ranked();
        if ranked.is_empty() {
            return Err(internal_error!("cannot breed from an empty archive"));
        }
        let weights = selection_weights(ranked.len());
        let selector = WeightedIndex::new(&weights)
            .map_err(|e| internal_error!("invalid selection weights: {e}"))?;

        let mut population: Vec<Assignment> = Vec::with_capacity(wanted);
        let mut attempts = 0;
        while population.len() < wanted {
            let seen = (archive.len() + population.len()) as u128;
            if space.is_some_and(|space| seen >= space) {
                return Err(FlError::SearchExhausted {
                    attempts,
                    message: format!("all {seen} distinct layouts have already been tried"),
                });
            }
            if attempts >= self.config.max_attempts {
                return Err(FlError::SearchExhausted {
                    attempts,
                    message: format!(
                        "bred {} of {wanted} unseen layouts",
                        population.len()
                    ),
                });
            }
            attempts += 1;

            let first = &ranked[selector.sample(rng)].assignment;
            let second = &ranked[selector.sample(rng)].assignment;
            let mut child = crossover(first, second, positions.len(), rng);
            mutate(&mut child, positions, self.config.mutation_scale, rng);

            if archive.contains(&child) || population.contains(&child) {
                continue;
            }
            population.push(child);
        }
        debug!(
            generation = self.generation,
            attempts,
            individuals = population.len(),
            "generation bred"
        );
        Ok(population)
    }

    /// Evaluate a population and append it to the archive in population
    /// order. The first failing evaluation aborts the generation.
    pub async fn evaluate_generation(&mut self, population: Vec<Assignment>) -> FlResult<()> {
        let generation = self.generation;
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let mut tasks = JoinSet::new();

        for (index, assignment) in population.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let base = Arc::clone(&self.base);
            let descriptor = Arc::clone(&self.descriptor);
            let oracle = Arc::clone(&self.oracle);
            let case_path = self.work_dir.join(format!("gen_{generation}_ind_{index}"));

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| internal_error!("evaluation pool closed: {e}"))?;
                let regions = descriptor.apply(&base, &assignment)?;
                let case = CaseDir::scratch(case_path).await?;
                let objective = evaluate(oracle.as_ref(), &regions, case.path()).await?;
                Ok::<_, FlError>((index, objective))
            });
        }

        let mut objectives = vec![None; population.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, objective) =
                joined.map_err(|e| internal_error!("evaluation task failed: {e}"))??;
            objectives[index] = Some(objective);
        }

        for (assignment, objective) in population.into_iter().zip(objectives) {
            let objective = objective
                .ok_or_else(|| internal_error!("individual {assignment:?} was not evaluated"))?;
            self.archive.push(Evaluation {
                generation,
                assignment,
                objective,
            });
        }

        info!(
            generation,
            evaluated = self.archive.len(),
            best = self.archive.best().map(|e| e.objective),
            "generation evaluated"
        );
        self.generation += 1;
        Ok(())
    }

    /// Run every generation and return the best layout found.
    pub async fn run(mut self) -> FlResult<GeneticOutcome> {
        info!(
            movable = self.descriptor.movable_objects.len(),
            candidates = self.descriptor.candidate_positions.len(),
            generations = self.config.generations,
            per_generation = self.config.individuals_per_generation,
            "starting genetic layout search"
        );

        let population = self.initial_population()?;
        self.evaluate_generation(population).await?;
        for _ in 1..self.config.generations {
            let population = self.breed_generation()?;
            self.evaluate_generation(population).await?;
        }

        let best = self
            .archive
            .best()
            .cloned()
            .ok_or_else(|| internal_error!("genetic search finished with an empty archive"))?;
        info!(
            objective = best.objective,
            assignment = ?best.assignment,
            "genetic layout search finished"
        );
        Ok(GeneticOutcome {
            best,
            archive: self.archive,
        })
    }
}

/// `exp(-rank)` for ranks `0..count`, best first.
fn selection_weights(count: usize) -> Vec<f64> {
    (0..count).map(|rank| (-(rank as f64)).exp()).collect()
}

/// Uniform crossover followed by collision repair.
///
/// A slot whose gene is already held by another slot takes the other
/// parent's gene for that slot when it is free, or else a random free
/// position.
pub fn crossover<R: Rng + ?Sized>(
    first: &[usize],
    second: &[usize],
    pool_size: usize,
    rng: &mut R,
) -> Assignment {
    let mut child: Assignment = first
        .iter()
        .zip(second)
        .map(|(&a, &b)| if rng.gen_bool(0.5) { a } else { b })
        .collect();

    for slot in 0..child.len() {
        let taken = |gene: usize, child: &[usize]| {
            child
                .iter()
                .enumerate()
                .any(|(other, &g)| other != slot && g == gene)
        };
        if !taken(child[slot], &child) {
            continue;
        }
        let alternative = if child[slot] == first[slot] {
            second[slot]
        } else {
            first[slot]
        };
        if !taken(alternative, &child) {
            child[slot] = alternative;
            continue;
        }
        let free: Vec<usize> = (0..pool_size).filter(|&p| !taken(p, &child)).collect();
        if let Some(&position) = free.choose(rng) {
            child[slot] = position;
        }
    }
    child
}

/// Move one random slot to a free position within an exponentially drawn
/// radius of where it is now. Leaves the child unchanged when nothing is in
/// range.
pub fn mutate<R: Rng + ?Sized>(
    child: &mut [usize],
    positions: &[BoundingBox],
    scale: f64,
    rng: &mut R,
) {
    if child.is_empty() {
        return;
    }
    // Exp takes a rate; a zero scale never draws a positive radius.
    let radius = match Exp::new(1.0 / scale) {
        Ok(radius) if scale > 0.0 => radius,
        _ => return,
    };
    let slot = rng.gen_range(0..child.len());
    let current = positions[child[slot]];
    let threshold = radius.sample(rng);

    let used: HashSet<usize> = child
        .iter()
        .enumerate()
        .filter(|&(other, _)| other != slot)
        .map(|(_, &gene)| gene)
        .collect();
    let in_range: Vec<usize> = positions
        .iter()
        .enumerate()
        .filter(|(index, _)| !used.contains(index))
        .filter(|(_, position)| current.corner_distance(position) < threshold)
        .map(|(index, _)| index)
        .collect();

    if let Some(&choice) = in_range.choose(rng) {
        child[slot] = choice;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fl_oracle::FnOracleFactory;
    use fl_types::{Face, OracleError};

    fn base() -> Vec<Region> {
        let rack = |name: &str, x: f64| {
            Region::rack(
                name,
                BoundingBox::new(x, x + 1.0, 8.0, 9.0, 0.0, 2.0).unwrap(),
                3000.0,
                0.5,
                Face::YMin,
                Face::YMax,
            )
            .unwrap()
        };
        vec![
            Region::room("room", BoundingBox::new(0.0, 12.0, 0.0, 10.0, 0.0, 3.0).unwrap())
                .unwrap(),
            rack("rack_a", 0.0),
            rack("rack_b", 2.0),
        ]
    }

    fn positions(count: usize) -> Vec<BoundingBox> {
        (0..count)
            .map(|i| {
                let x = i as f64 * 1.5;
                BoundingBox::new(x, x + 1.0, 1.0, 2.0, 0.0, 2.0).unwrap()
            })
            .collect()
    }

    fn descriptor(count: usize) -> OptimizationDescriptor {
        OptimizationDescriptor::new(vec!["rack_a".into(), "rack_b".into()], positions(count))
    }

    /// Deterministic objective from where the two racks ended up.
    fn layout_oracle() -> Arc<dyn OracleFactory> {
        Arc::new(FnOracleFactory::new(|regions: &[Region]| {
            let x = |name: &str| {
                regions
                    .iter()
                    .find(|r| r.name == name)
                    .map(|r| r.bounds.x_min)
                    .ok_or(OracleError::ResultUnavailable)
            };
            Ok(300.0 + x("rack_a")? + 0.5 * x("rack_b")?)
        }))
    }

    fn config(generations: usize, per_generation: usize) -> GeneticConfig {
        GeneticConfig {
            generations,
            individuals_per_generation: per_generation,
            ..GeneticConfig::default()
        }
        .with_seed(7)
    }

    fn is_injective(assignment: &[usize]) -> bool {
        let distinct: HashSet<_> = assignment.iter().collect();
        distinct.len() == assignment.len()
    }

    #[tokio::test]
    async fn single_generation_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let opt = GeneticLayoutOptimizer::new(
            base(),
            descriptor(4),
            config(1, 2),
            layout_oracle(),
            dir.path(),
        )
        .unwrap();

        let outcome = opt.run().await.unwrap();
        let entries = outcome.archive.entries();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].assignment, entries[1].assignment);
        let min = entries
            .iter()
            .map(|e| e.objective)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(outcome.best.objective, min);
    }

    #[tokio::test]
    async fn individuals_are_valid_and_unique_across_run() {
        let dir = tempfile::tempdir().unwrap();
        let opt = GeneticLayoutOptimizer::new(
            base(),
            descriptor(6),
            config(3, 4).with_max_parallel(3),
            layout_oracle(),
            dir.path(),
        )
        .unwrap();

        let outcome = opt.run().await.unwrap();
        let entries = outcome.archive.entries();
        assert_eq!(entries.len(), 12);

        let mut seen = HashSet::new();
        for entry in entries {
            assert!(is_injective(&entry.assignment), "{:?}", entry.assignment);
            assert!(entry.assignment.iter().all(|&g| g < 6));
            assert!(seen.insert(entry.assignment.clone()), "duplicate {:?}", entry.assignment);
        }
        for generation in 0..3 {
            assert_eq!(entries.iter().filter(|e| e.generation == generation).count(), 4);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn same_seed_gives_same_archive() {
        let run = |dir: PathBuf| async move {
            GeneticLayoutOptimizer::new(
                base(),
                descriptor(6),
                config(3, 3).with_max_parallel(4),
                layout_oracle(),
                dir,
            )
            .unwrap()
            .run()
            .await
            .unwrap()
        };
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        assert_eq!(run(a.path().to_path_buf()).await, run(b.path().to_path_buf()).await);
    }

    #[tokio::test]
    async fn pool_too_small_for_one_generation() {
        let dir = tempfile::tempdir().unwrap();
        let mut opt = GeneticLayoutOptimizer::new(
            base(),
            descriptor(2),
            config(1, 3),
            layout_oracle(),
            dir.path(),
        )
        .unwrap();
        let err = opt.initial_population().unwrap_err();
        assert_eq!(err.kind(), "search_exhausted");
    }

    #[tokio::test]
    async fn exhausted_layout_space_is_reported() {
        // Three positions hold only six ordered layouts for two racks.
        let dir = tempfile::tempdir().unwrap();
        let opt = GeneticLayoutOptimizer::new(
            base(),
            descriptor(3),
            config(2, 4),
            layout_oracle(),
            dir.path(),
        )
        .unwrap();
        match opt.run().await {
            Err(FlError::SearchExhausted { .. }) => {}
            other => panic!("expected search exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_oracle_aborts_generation() {
        let dir = tempfile::tempdir().unwrap();
        let failing: Arc<dyn OracleFactory> = Arc::new(FnOracleFactory::new(|_: &[Region]| {
            Err(OracleError::Execution {
                command: "solver".into(),
                status: "exit status: 2".into(),
                log: String::new(),
            })
        }));
        let opt = GeneticLayoutOptimizer::new(
            base(),
            descriptor(4),
            config(2, 2).with_max_parallel(2),
            failing,
            dir.path(),
        )
        .unwrap();
        let err = opt.run().await.unwrap_err();
        assert_eq!(err.kind(), "oracle_execution_error");
    }

    #[test]
    fn short_candidate_pool_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GeneticLayoutOptimizer::new(
            base(),
            descriptor(1),
            config(1, 1),
            layout_oracle(),
            dir.path(),
        )
        .err()
        .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn crossover_repairs_collisions() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..200 {
            let child = crossover(&[0, 1, 2], &[1, 2, 0], 5, &mut rng);
            assert_eq!(child.len(), 3);
            assert!(is_injective(&child), "{child:?}");
            assert!(child.iter().all(|&g| g < 5));
        }
    }

    #[test]
    fn crossover_of_identical_parents_is_identity() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        assert_eq!(crossover(&[3, 0], &[3, 0], 4, &mut rng), vec![3, 0]);
    }

    #[test]
    fn mutation_never_reuses_another_slots_position() {
        let pool = positions(5);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..200 {
            let mut child = vec![0, 1];
            mutate(&mut child, &pool, 100.0, &mut rng);
            assert!(is_injective(&child), "{child:?}");
        }
    }

    #[test]
    fn zero_scale_mutation_leaves_child_unchanged() {
        let pool = positions(5);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut child = vec![2, 4];
        mutate(&mut child, &pool, 0.0, &mut rng);
        assert_eq!(child, vec![2, 4]);
    }

    #[test]
    fn mutation_radius_scales_with_mutation_scale() {
        let pool = positions(5);
        let moved = |scale: f64| {
            let mut rng = ChaCha8Rng::seed_from_u64(6);
            (0..200)
                .filter(|_| {
                    let mut child = vec![0, 4];
                    mutate(&mut child, &pool, scale, &mut rng);
                    child != vec![0, 4]
                })
                .count()
        };
        // Neighbours sit 1.5 m apart, far outside a millimetre-scale radius.
        assert_eq!(moved(0.001), 0);
        assert!(moved(100.0) > 100);
    }

    #[test]
    fn selection_weights_favour_best_rank() {
        let weights = selection_weights(3);
        assert_eq!(weights[0], 1.0);
        assert!(weights[0] > weights[1] && weights[1] > weights[2]);
    }
}
