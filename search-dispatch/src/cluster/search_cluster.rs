use arc_swap::ArcSwap;
use fxhash::FxHashMap;
use itertools::Itertools;
use std::sync::Arc;
use tracing::*;

use crate::cluster::topology::{ClusterMetadata, Group, GroupCoverage, Node};
use crate::cluster::DispatchConfig;

/// A model of the search cluster queries are dispatched to. The topology is fixed by
/// configuration; node health is updated by the cluster monitor, after which [`refresh`] publishes
/// a new coverage snapshot.
///
/// Readers never block writers: every call to [`metadata`] returns a complete snapshot.
///
/// [`refresh`]: SearchCluster::refresh
/// [`metadata`]: SearchCluster::metadata
#[derive(Debug)]
pub struct SearchCluster {
    id: String,
    metadata: ArcSwap<ClusterMetadata>,
    min_activedocs_percentage: f64,
    min_group_coverage: f64,
    max_nodes_down_per_group: usize,
}

impl SearchCluster {
    /// Creates a cluster model. `self_hostname` and `container_cluster_size` describe the
    /// container running the dispatcher and determine whether a local node can be used for direct
    /// dispatch.
    pub fn new(
        id: impl Into<String>,
        config: &DispatchConfig,
        self_hostname: &str,
        container_cluster_size: usize,
    ) -> Self {
        let groups = build_groups(config);
        let direct_dispatch_candidate =
            find_direct_dispatch_candidate(self_hostname, container_cluster_size, &groups);

        let id = id.into();
        if let Some(candidate) = &direct_dispatch_candidate {
            info!(cluster = %id, node = %candidate, "Found direct dispatch candidate.");
        }

        SearchCluster {
            id,
            metadata: ArcSwap::from_pointee(ClusterMetadata::new(
                groups,
                direct_dispatch_candidate,
            )),
            min_activedocs_percentage: config.min_activedocs_percentage,
            min_group_coverage: config.min_group_coverage,
            max_nodes_down_per_group: config.max_nodes_down_per_group,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns current cluster snapshot.
    #[inline]
    pub fn metadata(&self) -> Arc<ClusterMetadata> {
        self.metadata.load_full()
    }

    /// Returns groups ordered by id, as seen in current snapshot.
    pub fn ordered_groups(&self) -> Vec<Arc<Group>> {
        self.metadata.load().ordered_groups().to_vec()
    }

    #[inline]
    pub fn groups_with_sufficient_coverage(&self) -> usize {
        self.metadata.load().groups_with_sufficient_coverage()
    }

    #[inline]
    pub fn direct_dispatch_target(&self) -> Option<Arc<Node>> {
        self.metadata.load().direct_dispatch_target()
    }

    /// Recomputes group coverage from current node states and publishes a new snapshot.
    pub fn refresh(&self) {
        let old_metadata = self.metadata.load_full();
        let groups = old_metadata.ordered_groups();

        let active_documents = groups
            .iter()
            .map(|group| working_active_documents(group.nodes().iter()))
            .collect_vec();
        let sum_of_active_documents: u64 = active_documents.iter().sum();

        let refreshed_groups = groups
            .iter()
            .zip(active_documents)
            .map(|(group, active_documents)| {
                let working_nodes = group.nodes().iter().filter(|node| node.is_working()).count();
                let sufficient = if groups.len() == 1 {
                    // the only group is always the best we have
                    true
                } else {
                    let average_in_other_groups = (sum_of_active_documents - active_documents)
                        / (groups.len() as u64 - 1);
                    self.is_group_coverage_sufficient(
                        working_nodes,
                        group.nodes().len(),
                        active_documents,
                        average_in_other_groups,
                    )
                };

                log_coverage_change(group, working_nodes, sufficient);

                Arc::new(group.clone_with_coverage(GroupCoverage::new(
                    working_nodes,
                    active_documents,
                    sufficient,
                )))
            })
            .collect_vec();

        self.metadata
            .store(Arc::new(old_metadata.clone_with_groups(refreshed_groups)));
    }

    /// Checks if a subset of nodes of a given group is enough to serve a query. Used by invoker
    /// factories when some nodes of a group cannot be reached.
    pub fn is_partial_group_coverage_sufficient(
        &self,
        group_id: Option<u32>,
        nodes: &[Arc<Node>],
    ) -> bool {
        let metadata = self.metadata.load();
        let groups = metadata.ordered_groups();

        if groups.len() == 1 {
            let group_size = groups[0].nodes().len();
            return nodes.len() + self.max_nodes_down_per_group >= group_size;
        }

        let group = match group_id.and_then(|group_id| metadata.group(group_id)) {
            Some(group) => group,
            None => return false,
        };

        let sum_in_other_groups: u64 = groups
            .iter()
            .filter(|other| other.id() != group.id())
            .map(|other| other.active_documents())
            .sum();
        let average_in_other_groups = sum_in_other_groups / (groups.len() as u64 - 1);
        let active_documents = nodes.iter().map(|node| node.active_documents()).sum();

        self.is_group_coverage_sufficient(
            nodes.len(),
            group.nodes().len(),
            active_documents,
            average_in_other_groups,
        )
    }

    fn is_group_coverage_sufficient(
        &self,
        working_nodes: usize,
        nodes_in_group: usize,
        active_documents: u64,
        average_in_other_groups: u64,
    ) -> bool {
        if average_in_other_groups > 0 {
            let coverage = 100.0 * active_documents as f64 / average_in_other_groups as f64;
            if coverage < self.min_activedocs_percentage {
                return false;
            }
        }

        let nodes_allowed_down = self.max_nodes_down_per_group
            + (nodes_in_group as f64 * (100.0 - self.min_group_coverage) / 100.0) as usize;
        working_nodes + nodes_allowed_down >= nodes_in_group
    }
}

fn working_active_documents<'a>(nodes: impl Iterator<Item = &'a Arc<Node>>) -> u64 {
    nodes
        .filter(|node| node.is_working())
        .map(|node| node.active_documents())
        .sum()
}

fn log_coverage_change(group: &Group, working_nodes: usize, sufficient: bool) {
    if group.has_sufficient_coverage() == sufficient {
        return;
    }

    if sufficient {
        info!(group = group.id(), working_nodes, "Group has sufficient coverage again.");
    } else {
        warn!(
            group = group.id(),
            working_nodes,
            nodes = group.nodes().len(),
            "Group has insufficient coverage and will be avoided."
        );
    }
}

fn build_groups(config: &DispatchConfig) -> Vec<Arc<Group>> {
    let mut nodes_by_group: FxHashMap<u32, Vec<Arc<Node>>> = FxHashMap::default();
    for node in &config.nodes {
        let group_nodes = nodes_by_group.entry(node.group).or_default();
        group_nodes.push(Arc::new(Node::new(
            node.key,
            node.hostname.clone(),
            node.port,
            node.group,
            group_nodes.len(),
        )));
    }

    nodes_by_group
        .into_iter()
        .map(|(id, nodes)| Arc::new(Group::new(id, nodes)))
        .collect()
}

fn find_direct_dispatch_candidate(
    self_hostname: &str,
    container_cluster_size: usize,
    groups: &[Arc<Group>],
) -> Option<Arc<Node>> {
    let mut local_nodes = groups
        .iter()
        .flat_map(|group| group.nodes().iter())
        .filter(|node| node.hostname() == self_hostname);

    // exactly one local node is required
    let candidate = local_nodes.next()?;
    if local_nodes.next().is_some() {
        return None;
    }

    // the local node must hold the entire corpus
    let group = groups.iter().find(|group| group.id() == candidate.group())?;
    if group.nodes().len() != 1 {
        return None;
    }

    // avoid load skew when only some search nodes share hosts with containers
    let search_cluster_size: usize = groups.iter().map(|group| group.nodes().len()).sum();
    if container_cluster_size < search_cluster_size {
        return None;
    }

    Some(candidate.clone())
}
