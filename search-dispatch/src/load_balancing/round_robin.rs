use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancing::{Candidate, GroupScheduler};

/// Round-robin group scheduling. Groups are visited in cluster order starting at a rotating
/// needle; a group with sufficient coverage is preferred over the ones without.
#[derive(Debug)]
pub struct RoundRobinGroupScheduler {
    group_count: usize,
    needle: AtomicUsize,
}

impl RoundRobinGroupScheduler {
    pub fn new(group_count: usize) -> Self {
        RoundRobinGroupScheduler {
            group_count,
            needle: AtomicUsize::new(0),
        }
    }

    fn distance(&self, position: usize, needle: usize) -> usize {
        (position + self.group_count - needle) % self.group_count
    }
}

impl GroupScheduler for RoundRobinGroupScheduler {
    fn select(&self, candidates: &[Candidate]) -> Option<usize> {
        if self.group_count == 0 {
            return None;
        }

        let needle = self.needle.load(Ordering::Relaxed) % self.group_count;
        let best = candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, candidate)| {
                (
                    !candidate.group.has_sufficient_coverage(),
                    self.distance(candidate.position, needle),
                )
            })
            .map(|(index, _)| index)?;

        self.needle.store(
            (candidates[best].position + 1) % self.group_count,
            Ordering::Relaxed,
        );

        Some(best)
    }
}
