use rand::{rng, Rng};

use crate::load_balancing::{Candidate, GroupScheduler};

/// Adaptive group scheduling. Picks a group at random, with probability proportional to its
/// weight (see [`GroupStats::weight`](crate::load_balancing::GroupStats::weight)), so slow or
/// failing groups receive less traffic without being starved. Groups with sufficient coverage
/// are considered first; any group is better than none.
#[derive(Debug, Default)]
pub struct AdaptiveGroupScheduler;

impl AdaptiveGroupScheduler {
    pub fn new() -> Self {
        AdaptiveGroupScheduler
    }

    /// Selects a candidate for a given needle in [0, 1).
    pub fn select_with_needle(&self, candidates: &[Candidate], needle: f64) -> Option<usize> {
        Self::select_weighted(candidates, needle, true)
            .or_else(|| Self::select_weighted(candidates, needle, false))
    }

    fn select_weighted(
        candidates: &[Candidate],
        needle: f64,
        require_coverage: bool,
    ) -> Option<usize> {
        let weights: Vec<_> = candidates
            .iter()
            .enumerate()
            .filter(|(_, candidate)| {
                !require_coverage || candidate.group.has_sufficient_coverage()
            })
            .map(|(index, candidate)| (index, candidate.status.stats().weight()))
            .collect();

        if weights.is_empty() {
            return None;
        }

        let norm: f64 = weights.iter().map(|(_, weight)| weight).sum();
        let mut accumulated = 0.0;
        for (index, weight) in &weights {
            accumulated += weight / norm;
            if needle < accumulated {
                return Some(*index);
            }
        }

        // rounding left the needle past the last bucket
        weights
            .iter()
            .min_by_key(|(index, _)| candidates[*index].status.last_taken())
            .map(|(index, _)| *index)
    }
}

impl GroupScheduler for AdaptiveGroupScheduler {
    fn select(&self, candidates: &[Candidate]) -> Option<usize> {
        self.select_with_needle(candidates, rng().random::<f64>())
    }
}
