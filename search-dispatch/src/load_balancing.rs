//! Group selection for queries.
//!
//! The [`LoadBalancer`] keeps a scoreboard of adaptive statistics per group and delegates the
//! actual choice to a [`GroupScheduler`]. Selection only reads the scoreboard; statistics change
//! when a group is released, so concurrent queries never wait on each other beyond short
//! per-group locks.

mod adaptive;
mod group_status;
mod round_robin;

pub use self::adaptive::AdaptiveGroupScheduler;
pub use self::group_status::{GroupStats, GroupStatus};
pub use self::round_robin::RoundRobinGroupScheduler;

use derivative::Derivative;
use fxhash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::*;

use crate::cluster::{ClusterMetadata, DistributionPolicy, Group};

/// A group which may be selected for a query.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Position of the group in cluster order.
    pub position: usize,
    pub group: &'a Arc<Group>,
    pub status: &'a GroupStatus,
}

/// Chooses one of the candidate groups.
pub trait GroupScheduler {
    /// Returns the index of the chosen candidate, or `None` if no candidate is acceptable.
    fn select(&self, candidates: &[Candidate]) -> Option<usize>;
}

/// Outcome of asking the load balancer for a group.
#[derive(Debug, Clone)]
pub enum GroupSelection {
    /// A group has been allocated and must be released exactly once.
    Selected(Arc<Group>),
    /// Every group is either excluded or absent.
    Exhausted,
}

/// Selects groups for queries and tracks how they perform.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct LoadBalancer {
    scoreboard: Vec<GroupStatus>,
    positions: FxHashMap<u32, usize>,
    #[derivative(Debug = "ignore")]
    scheduler: Box<dyn GroupScheduler + Send + Sync>,
    sequence: AtomicU64,
}

impl LoadBalancer {
    /// Creates a load balancer for the groups of a cluster. A single group is always scheduled
    /// round-robin, since there is nothing to adapt to.
    pub fn new(cluster: &ClusterMetadata, distribution_policy: DistributionPolicy) -> Self {
        let group_count = cluster.ordered_groups().len();
        let scheduler: Box<dyn GroupScheduler + Send + Sync> =
            if distribution_policy == DistributionPolicy::RoundRobin || group_count == 1 {
                Box::new(RoundRobinGroupScheduler::new(group_count))
            } else {
                Box::new(AdaptiveGroupScheduler::new())
            };

        Self::with_scheduler(cluster, scheduler)
    }

    /// Creates a load balancer with a custom scheduler.
    pub fn with_scheduler(
        cluster: &ClusterMetadata,
        scheduler: Box<dyn GroupScheduler + Send + Sync>,
    ) -> Self {
        let scoreboard: Vec<_> = cluster
            .ordered_groups()
            .iter()
            .map(|group| GroupStatus::new(group.id()))
            .collect();
        let positions = scoreboard
            .iter()
            .enumerate()
            .map(|(position, status)| (status.group_id(), position))
            .collect();

        LoadBalancer {
            scoreboard,
            positions,
            scheduler,
            sequence: AtomicU64::new(0),
        }
    }

    /// Takes a group for a query, skipping `rejected` ones. A selected group must be released
    /// with [`release_group`](LoadBalancer::release_group).
    pub fn take_group(
        &self,
        cluster: &ClusterMetadata,
        rejected: Option<&FxHashSet<u32>>,
    ) -> GroupSelection {
        let candidates: Vec<_> = cluster
            .ordered_groups()
            .iter()
            .filter(|group| rejected.map_or(true, |rejected| !rejected.contains(&group.id())))
            .filter_map(|group| {
                self.positions.get(&group.id()).map(|position| Candidate {
                    position: *position,
                    group,
                    status: &self.scoreboard[*position],
                })
            })
            .collect();

        match self.scheduler.select(&candidates) {
            Some(index) => {
                let candidate = &candidates[index];
                candidate
                    .status
                    .allocate(self.sequence.fetch_add(1, Ordering::Relaxed) + 1);

                debug!(group = candidate.group.id(), "Offering group for query.");
                GroupSelection::Selected(candidate.group.clone())
            }
            None => GroupSelection::Exhausted,
        }
    }

    /// Records the outcome of a query on a group taken by [`take_group`](LoadBalancer::take_group).
    pub fn release_group(&self, group_id: u32, success: bool, search_time: Duration) {
        match self.group_status(group_id) {
            Some(status) => status.release(success, search_time),
            None => warn!(group = group_id, "Releasing unknown group."),
        }
    }

    /// Returns the scoreboard entry of a group.
    pub fn group_status(&self, group_id: u32) -> Option<&GroupStatus> {
        self.positions
            .get(&group_id)
            .map(|position| &self.scoreboard[*position])
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::cluster::{Group, GroupCoverage, Node};
    use crate::load_balancing::{
        AdaptiveGroupScheduler, Candidate, GroupScheduler, GroupStatus,
    };

    /// Groups with ids equal to their positions, with given coverage.
    pub struct Scoreboard {
        groups: Vec<Arc<Group>>,
        statuses: Vec<GroupStatus>,
    }

    impl Scoreboard {
        pub fn new(coverage: &[bool]) -> Self {
            let groups = coverage
                .iter()
                .enumerate()
                .map(|(id, sufficient)| {
                    let id = id as u32;
                    let node = Arc::new(Node::new(id, format!("host{}", id), 1, id, 0));
                    Arc::new(
                        Group::new(id, vec![node])
                            .clone_with_coverage(GroupCoverage::new(1, 100, *sufficient)),
                    )
                })
                .collect();
            let statuses = (0..coverage.len())
                .map(|id| GroupStatus::new(id as u32))
                .collect();

            Scoreboard { groups, statuses }
        }

        pub fn status(&self, id: u32) -> &GroupStatus {
            &self.statuses[id as usize]
        }

        fn candidates(&self, rejected: &[u32]) -> Vec<Candidate> {
            self.groups
                .iter()
                .zip(&self.statuses)
                .enumerate()
                .filter(|(_, (group, _))| !rejected.contains(&group.id()))
                .map(|(position, (group, status))| Candidate {
                    position,
                    group,
                    status,
                })
                .collect()
        }

        pub fn select(&self, scheduler: &dyn GroupScheduler, rejected: &[u32]) -> Option<u32> {
            let candidates = self.candidates(rejected);
            scheduler
                .select(&candidates)
                .map(|index| candidates[index].group.id())
        }

        pub fn select_with_needle(
            &self,
            scheduler: &AdaptiveGroupScheduler,
            rejected: &[u32],
            needle: f64,
        ) -> Option<u32> {
            let candidates = self.candidates(rejected);
            scheduler
                .select_with_needle(&candidates, needle)
                .map(|index| candidates[index].group.id())
        }
    }
}
