//! One node on one thread, no coordination.

use std::sync::Arc;

use super::worker::{spawn, Shared};
use super::{SyncError, SyncState, Synchronizer};
use crate::node::{Node, NodeId};

/// Runs exactly one node.
pub struct Single {
    shared: Arc<Shared<()>>,
}

impl Default for Single {
    fn default() -> Self {
        Self::new()
    }
}

impl Single {
    /// Empty single-node synchronizer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new(())),
        }
    }
}

impl Synchronizer for Single {
    fn add_node(&self, node: Node) -> Result<(), SyncError> {
        self.shared.add_node(node, Some(1), |_, _| {})
    }

    fn remove_node(&self, id: NodeId) -> Result<(), SyncError> {
        self.shared.remove_node(id, |_, _| {})
    }

    fn start(&self) -> Result<(), SyncError> {
        for mut node in self.shared.begin()? {
            let shared = Arc::clone(&self.shared);
            let handle = spawn(node.id().to_string(), move || {
                shared.drive(&mut node);
                vec![node]
            })?;
            self.shared.push_handle(handle);
        }
        Ok(())
    }

    fn pause(&self) -> Result<(), SyncError> {
        self.shared.pause()
    }

    fn resume(&self) -> Result<(), SyncError> {
        self.shared.resume()
    }

    fn stop(&self) {
        self.shared.stop();
    }

    fn join(&self) -> Result<Vec<Node>, SyncError> {
        self.shared.join()
    }

    /// There are no neighbors to wait for.
    fn wait_for_neighbors(&self, id: NodeId, _time: u64) -> Result<(), SyncError> {
        if self.shared.contains(id) {
            Ok(())
        } else {
            Err(SyncError::UnknownNode(id))
        }
    }

    fn state(&self) -> SyncState {
        self.shared.state()
    }
}
