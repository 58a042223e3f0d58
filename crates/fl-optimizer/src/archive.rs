//! Evaluated individuals, accumulated across every generation of a run.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Candidate-position index per movable object, in descriptor order.
pub type Assignment = Vec<usize>;

/// One evaluated individual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub generation: usize,
    pub assignment: Assignment,
    /// Peak temperature reported by the oracle. Lower is better.
    pub objective: f64,
}

/// Append-only record of every evaluation in a run, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsArchive {
    entries: Vec<Evaluation>,
}

impl ResultsArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, evaluation: Evaluation) {
        self.entries.push(evaluation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Evaluation] {
        &self.entries
    }

    /// Exact, order-sensitive membership test.
    pub fn contains(&self, assignment: &[usize]) -> bool {
        self.entries.iter().any(|e| e.assignment == assignment)
    }

    /// Entries sorted best (lowest objective) first. Ties keep evaluation
    /// order.
    pub fn ranked(&self) -> Vec<&Evaluation> {
        let mut ranked: Vec<&Evaluation> = self.entries.iter().collect();
        ranked.sort_by(|a, b| compare_objectives(a.objective, b.objective));
        ranked
    }

    /// Lowest objective; the earliest evaluation wins a tie.
    pub fn best(&self) -> Option<&Evaluation> {
        self.entries.iter().reduce(|best, e| {
            if compare_objectives(e.objective, best.objective) == Ordering::Less {
                e
            } else {
                best
            }
        })
    }

    /// `(assignment, objective)` pairs for persistence.
    pub fn to_pairs(&self) -> Vec<(Assignment, f64)> {
        self.entries
            .iter()
            .map(|e| (e.assignment.clone(), e.objective))
            .collect()
    }
}

fn compare_objectives(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}
