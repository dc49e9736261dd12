use derive_more::{Constructor, Display};
use fxhash::FxHashSet;
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_MIN_ACTIVEDOCS_PERCENTAGE: f64 = 97.0;
const DEFAULT_MIN_GROUP_COVERAGE: f64 = 100.0;
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(1);

/// How the load balancer spreads queries over groups.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, Default)]
pub enum DistributionPolicy {
    /// Visit groups in order, preferring groups with sufficient coverage.
    RoundRobin,
    /// Prefer fast and reliable groups, based on observed search times and outcomes.
    #[default]
    Adaptive,
}

/// Static placement of a single search node.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Constructor)]
pub struct NodeConfig {
    pub key: u32,
    pub group: u32,
    pub hostname: String,
    pub port: u16,
}

/// Dispatch configuration. Use [`DispatchConfigBuilder`] to create one.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub distribution_policy: DistributionPolicy,
    pub use_multilevel_dispatch: bool,
    pub use_legacy_dispatch_by_default: bool,
    pub min_activedocs_percentage: f64,
    pub min_group_coverage: f64,
    pub max_nodes_down_per_group: usize,
    pub ping_interval: Duration,
    pub nodes: Vec<NodeConfig>,
}

impl DispatchConfig {
    /// Internal dispatch is used unless the query says otherwise or legacy dispatch is the
    /// configured default.
    #[inline]
    pub fn internal_dispatch_by_default(&self) -> bool {
        !self.use_legacy_dispatch_by_default
    }
}

/// Builder structure that helps to configure dispatching to a search cluster.
pub struct DispatchConfigBuilder {
    distribution_policy: DistributionPolicy,
    use_multilevel_dispatch: bool,
    use_legacy_dispatch_by_default: bool,
    min_activedocs_percentage: f64,
    min_group_coverage: f64,
    max_nodes_down_per_group: usize,
    ping_interval: Duration,
    nodes: Vec<NodeConfig>,
}

impl Default for DispatchConfigBuilder {
    fn default() -> Self {
        DispatchConfigBuilder {
            distribution_policy: Default::default(),
            use_multilevel_dispatch: false,
            use_legacy_dispatch_by_default: false,
            min_activedocs_percentage: DEFAULT_MIN_ACTIVEDOCS_PERCENTAGE,
            min_group_coverage: DEFAULT_MIN_GROUP_COVERAGE,
            max_nodes_down_per_group: 0,
            ping_interval: DEFAULT_PING_INTERVAL,
            nodes: vec![],
        }
    }
}

impl DispatchConfigBuilder {
    pub fn new() -> DispatchConfigBuilder {
        Default::default()
    }

    /// Sets the group distribution policy.
    pub fn with_distribution_policy(mut self, distribution_policy: DistributionPolicy) -> Self {
        self.distribution_policy = distribution_policy;
        self
    }

    /// Marks the cluster as too large for single-hop dispatch, which disables internal dispatch.
    pub fn with_multilevel_dispatch(mut self, use_multilevel_dispatch: bool) -> Self {
        self.use_multilevel_dispatch = use_multilevel_dispatch;
        self
    }

    /// Makes the legacy dispatch tier the default path. Queries can still opt into internal
    /// dispatch explicitly.
    pub fn with_legacy_dispatch_by_default(mut self, use_legacy_dispatch_by_default: bool) -> Self {
        self.use_legacy_dispatch_by_default = use_legacy_dispatch_by_default;
        self
    }

    /// Minimum percentage of active documents, compared to the other groups, for a group to be
    /// considered sufficiently covered.
    pub fn with_min_activedocs_percentage(mut self, min_activedocs_percentage: f64) -> Self {
        self.min_activedocs_percentage = min_activedocs_percentage;
        self
    }

    /// Minimum percentage of working nodes in a group.
    pub fn with_min_group_coverage(mut self, min_group_coverage: f64) -> Self {
        self.min_group_coverage = min_group_coverage;
        self
    }

    /// Number of nodes which may be down in a group on top of what group coverage allows.
    pub fn with_max_nodes_down_per_group(mut self, max_nodes_down_per_group: usize) -> Self {
        self.max_nodes_down_per_group = max_nodes_down_per_group;
        self
    }

    /// Sets the interval between cluster monitor ping rounds.
    pub fn with_ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }

    /// Adds a search node.
    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds multiple search nodes.
    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = NodeConfig>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// Finalizes building process
    pub fn build(self) -> Result<DispatchConfig> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidConfig("no search nodes configured".into()));
        }

        let mut keys = FxHashSet::default();
        if let Some(duplicate) = self.nodes.iter().find(|node| !keys.insert(node.key)) {
            return Err(Error::InvalidConfig(format!(
                "duplicate node key {}",
                duplicate.key
            )));
        }

        Self::validate_percentage("min_activedocs_percentage", self.min_activedocs_percentage)?;
        Self::validate_percentage("min_group_coverage", self.min_group_coverage)?;

        Ok(DispatchConfig {
            distribution_policy: self.distribution_policy,
            use_multilevel_dispatch: self.use_multilevel_dispatch,
            use_legacy_dispatch_by_default: self.use_legacy_dispatch_by_default,
            min_activedocs_percentage: self.min_activedocs_percentage,
            min_group_coverage: self.min_group_coverage,
            max_nodes_down_per_group: self.max_nodes_down_per_group,
            ping_interval: self.ping_interval,
            nodes: self.nodes,
        })
    }

    fn validate_percentage(name: &str, value: f64) -> Result<()> {
        if (0.0..=100.0).contains(&value) {
            Ok(())
        } else {
            Err(Error::InvalidConfig(format!(
                "{} must be within [0, 100], got {}",
                name, value
            )))
        }
    }
}
