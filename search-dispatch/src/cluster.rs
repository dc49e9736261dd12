pub use self::cluster_monitor::{ClusterMonitor, PingFactory, Pong};
pub use self::config::{DispatchConfig, DispatchConfigBuilder, DistributionPolicy, NodeConfig};
pub use self::search_cluster::SearchCluster;
pub use self::search_path::SearchPath;
pub use self::topology::{ClusterMetadata, Group, GroupCoverage, Node, NodeState};

mod cluster_monitor;
mod config;
mod search_cluster;
pub mod search_path;
pub mod topology;
