//! Multi-node time coordination.
//!
//! A synchronizer owns a group of nodes, runs them and keeps their clocks
//! causally consistent:
//!
//! - [`Barrier`]: every node stops at each period boundary until all have arrived.
//! - [`Ripple`]: nodes publish their progress; a node blocks only when it asks
//!   to wait for its neighbors to reach a time.
//! - [`StepSync`]: one thread steps every node one instruction per round.
//! - [`Single`]: one node on one thread.
//!
//! Each synchronizer guards its state with exactly one mutex and condition
//! variable. Pause, stop and removal reach running nodes at their next
//! instruction boundary.

pub mod barrier;
pub mod ripple;
pub mod single;
pub mod step;
mod worker;

use thiserror::Error;

pub use barrier::Barrier;
pub use ripple::Ripple;
pub use single::Single;
pub use step::StepSync;

use crate::node::{Node, NodeId};

/// Lifecycle of a synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum SyncState {
    /// Accepting nodes; nothing runs yet.
    Registering,
    /// Nodes are executing.
    Running,
    /// Nodes are held at their next instruction boundary.
    Paused,
    /// Nodes were told to stop or have all finished.
    Stopped,
}

/// Synchronizer operation failures.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A node with this id is already registered.
    #[error("{0} is already registered")]
    DuplicateNode(NodeId),
    /// No node with this id is registered.
    #[error("{0} is not registered")]
    UnknownNode(NodeId),
    /// The operation is not allowed in the current state.
    #[error("operation not allowed while {state:?}")]
    InvalidState {
        /// State at the time of the call.
        state: SyncState,
    },
    /// The synchronizer is full.
    #[error("synchronizer holds at most {capacity} node(s)")]
    Capacity {
        /// Maximum node count.
        capacity: usize,
    },
    /// A node thread panicked.
    #[error("thread {name} panicked")]
    ThreadPanicked {
        /// Thread name.
        name: String,
    },
    /// The operating system refused to create a thread.
    #[error("failed to spawn node thread")]
    Spawn(#[from] std::io::Error),
}

/// Common control surface of all synchronizers.
pub trait Synchronizer: Send + Sync {
    /// Registers `node`. Only allowed before [`Synchronizer::start`].
    ///
    /// # Errors
    ///
    /// [`SyncError::DuplicateNode`], [`SyncError::Capacity`] or
    /// [`SyncError::InvalidState`] after start.
    fn add_node(&self, node: Node) -> Result<(), SyncError>;

    /// Stops node `id` at its next boundary and drops it from the group, so
    /// remaining nodes never wait for it.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownNode`] if `id` is not registered.
    fn remove_node(&self, id: NodeId) -> Result<(), SyncError>;

    /// Starts running the registered nodes.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidState`] unless registering, or [`SyncError::Spawn`].
    fn start(&self) -> Result<(), SyncError>;

    /// Holds all nodes at their next instruction boundary.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidState`] unless running.
    fn pause(&self) -> Result<(), SyncError>;

    /// Releases paused nodes.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidState`] unless paused.
    fn resume(&self) -> Result<(), SyncError>;

    /// Stops every node at its next boundary and wakes anything blocked.
    fn stop(&self);

    /// Waits for every node to finish and returns them, ordered by id.
    ///
    /// # Errors
    ///
    /// [`SyncError::ThreadPanicked`] if a node thread panicked.
    fn join(&self) -> Result<Vec<Node>, SyncError>;

    /// Blocks node `id` until every other active node has reached `time`.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownNode`] if `id` is not registered.
    fn wait_for_neighbors(&self, id: NodeId, time: u64) -> Result<(), SyncError>;

    /// Current lifecycle state.
    fn state(&self) -> SyncState;
}
