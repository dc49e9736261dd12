use atomic::Atomic;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cluster::topology::NodeState;

/// A single backend search process. Identity and placement are fixed by configuration, while
/// health and document counts are updated by the cluster monitor.
pub struct Node {
    key: u32,
    hostname: String,
    port: u16,
    group: u32,
    path_index: usize,
    state: Atomic<NodeState>,
    active_documents: AtomicU64,
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("group", &self.group)
            .field("path_index", &self.path_index)
            .field("state", &self.state())
            .field("active_documents", &self.active_documents())
            .finish()
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "search node key = {} hostname = {} path = {} in group {}",
            self.key, self.hostname, self.path_index, self.group
        )
    }
}

impl Node {
    /// Creates a node in the `Unknown` state, until the cluster monitor has pinged it.
    pub fn new(key: u32, hostname: String, port: u16, group: u32, path_index: usize) -> Self {
        Node {
            key,
            hostname,
            port,
            group,
            path_index,
            state: Atomic::new(NodeState::Unknown),
            active_documents: AtomicU64::new(0),
        }
    }

    /// Distribution key of the node, unique within the cluster.
    #[inline]
    pub fn key(&self) -> u32 {
        self.key
    }

    #[inline]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Id of the group this node belongs to.
    #[inline]
    pub fn group(&self) -> u32 {
        self.group
    }

    /// Position of the node inside its group.
    #[inline]
    pub fn path_index(&self) -> usize {
        self.path_index
    }

    #[inline]
    pub fn state(&self) -> NodeState {
        self.state.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_working(&self) -> bool {
        self.state().is_working()
    }

    #[inline]
    pub fn active_documents(&self) -> u64 {
        self.active_documents.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_state(&self, state: NodeState) {
        self.state.store(state, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set_active_documents(&self, active_documents: u64) {
        self.active_documents
            .store(active_documents, Ordering::Relaxed);
    }
}
