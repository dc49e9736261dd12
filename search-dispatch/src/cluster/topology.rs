pub mod cluster_metadata;
mod group;
mod node;
mod node_state;

pub use self::cluster_metadata::ClusterMetadata;
pub use self::group::{Group, GroupCoverage};
pub use self::node::Node;
pub use self::node_state::NodeState;
