use bytemuck::NoUninit;
use derive_more::Display;

/// The state of a search node, as viewed from the dispatcher.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, NoUninit)]
#[repr(u8)]
pub enum NodeState {
    /// The node has not been pinged yet. Unknown nodes are optimistically treated as working, so
    /// a freshly started dispatcher can serve queries before the first ping round completes.
    Unknown,
    /// The last ping succeeded.
    Up,
    /// The last ping failed.
    Down,
}

impl NodeState {
    /// Checks if the node should receive queries.
    #[inline]
    pub fn is_working(self) -> bool {
        self != NodeState::Down
    }
}

impl Default for NodeState {
    fn default() -> Self {
        NodeState::Unknown
    }
}
