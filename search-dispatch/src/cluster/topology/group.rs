use derive_more::Constructor;
use std::sync::Arc;

use crate::cluster::topology::Node;

/// Coverage of a group, computed from node health at the time of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Constructor)]
pub struct GroupCoverage {
    pub working_nodes: usize,
    pub active_documents: u64,
    pub sufficient: bool,
}

/// A replica set of nodes which together hold the whole corpus. A group value is an immutable
/// snapshot: the node list is shared, but the coverage is fixed at creation time.
#[derive(Debug, Clone)]
pub struct Group {
    id: u32,
    nodes: Vec<Arc<Node>>,
    coverage: GroupCoverage,
}

impl Group {
    /// Creates a group with optimistic coverage, i.e. with all nodes treated as working.
    pub fn new(id: u32, nodes: Vec<Arc<Node>>) -> Self {
        let coverage = GroupCoverage::new(nodes.len(), 0, true);
        Group {
            id,
            nodes,
            coverage,
        }
    }

    /// Creates a new snapshot of this group with different coverage.
    #[must_use]
    pub fn clone_with_coverage(&self, coverage: GroupCoverage) -> Self {
        Group {
            id: self.id,
            nodes: self.nodes.clone(),
            coverage,
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    #[inline]
    pub fn has_sufficient_coverage(&self) -> bool {
        self.coverage.sufficient
    }

    #[inline]
    pub fn working_nodes(&self) -> usize {
        self.coverage.working_nodes
    }

    #[inline]
    pub fn active_documents(&self) -> u64 {
        self.coverage.active_documents
    }

    /// Fraction of working nodes, in [0, 1]. An empty group has no coverage.
    pub fn coverage_fraction(&self) -> f64 {
        if self.nodes.is_empty() {
            0.0
        } else {
            self.coverage.working_nodes as f64 / self.nodes.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use float_eq::assert_float_eq;
    use std::sync::Arc;

    use crate::cluster::topology::{Group, GroupCoverage, Node};

    #[test]
    fn should_compute_coverage_fraction() {
        let nodes = (0..4)
            .map(|key| Arc::new(Node::new(key, format!("host{}", key), 1, 0, key as usize)))
            .collect();
        let group = Group::new(0, nodes);
        assert_float_eq!(group.coverage_fraction(), 1.0, abs <= 1e-9);

        let group = group.clone_with_coverage(GroupCoverage::new(3, 300, false));
        assert_float_eq!(group.coverage_fraction(), 0.75, abs <= 1e-9);
        assert!(!group.has_sufficient_coverage());
        assert_eq!(group.active_documents(), 300);
    }

    #[test]
    fn should_report_no_coverage_for_empty_group() {
        let group = Group::new(3, vec![]);
        assert_float_eq!(group.coverage_fraction(), 0.0, abs <= 1e-9);
    }
}
