use fxhash::FxHashMap;
use std::sync::Arc;

use crate::cluster::topology::{Group, Node};

/// Immutable snapshot of the search cluster topology and coverage. A dispatch decision works on
/// a single snapshot, so group order and coverage stay consistent for its whole duration.
#[derive(Debug, Clone, Default)]
pub struct ClusterMetadata {
    groups: Vec<Arc<Group>>,
    group_index: FxHashMap<u32, usize>,
    groups_with_sufficient_coverage: usize,
    direct_dispatch_candidate: Option<Arc<Node>>,
}

impl ClusterMetadata {
    /// Creates a snapshot from groups, which get ordered by id.
    pub fn new(mut groups: Vec<Arc<Group>>, direct_dispatch_candidate: Option<Arc<Node>>) -> Self {
        groups.sort_unstable_by_key(|group| group.id());

        let group_index = groups
            .iter()
            .enumerate()
            .map(|(index, group)| (group.id(), index))
            .collect();
        let groups_with_sufficient_coverage = groups
            .iter()
            .filter(|group| group.has_sufficient_coverage())
            .count();

        ClusterMetadata {
            groups,
            group_index,
            groups_with_sufficient_coverage,
            direct_dispatch_candidate,
        }
    }

    /// Creates a new snapshot with groups replaced, keeping the direct dispatch candidate.
    #[must_use]
    pub fn clone_with_groups(&self, groups: Vec<Arc<Group>>) -> Self {
        Self::new(groups, self.direct_dispatch_candidate.clone())
    }

    /// Returns groups ordered by id.
    #[inline]
    pub fn ordered_groups(&self) -> &[Arc<Group>] {
        &self.groups
    }

    /// Returns a group with given id, if present.
    #[inline]
    pub fn group(&self, id: u32) -> Option<&Arc<Group>> {
        self.group_index.get(&id).map(|index| &self.groups[*index])
    }

    #[inline]
    pub fn groups_with_sufficient_coverage(&self) -> usize {
        self.groups_with_sufficient_coverage
    }

    /// Returns the total number of nodes.
    pub fn size(&self) -> usize {
        self.groups.iter().map(|group| group.nodes().len()).sum()
    }

    /// Iterates over all nodes, group by group.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.groups.iter().flat_map(|group| group.nodes().iter())
    }

    /// Returns the local node which holds the entire corpus, if it is usable right now: its group
    /// must have sufficient coverage and the node itself must be working.
    pub fn direct_dispatch_target(&self) -> Option<Arc<Node>> {
        let candidate = self.direct_dispatch_candidate.as_ref()?;
        let group = self.group(candidate.group())?;

        if group.has_sufficient_coverage() && candidate.is_working() {
            Some(candidate.clone())
        } else {
            None
        }
    }
}
