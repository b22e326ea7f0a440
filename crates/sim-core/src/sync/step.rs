//! Round-robin stepping on one controlling thread.

use std::sync::Arc;

use super::worker::{spawn, Shared};
use super::{SyncError, SyncState, Synchronizer};
use crate::node::{Node, NodeId};

type PostRound = Box<dyn FnMut(u64) + Send>;

pub(crate) struct StepState {
    rounds: u64,
    post_round: PostRound,
}

/// Steps every node one instruction per round, in registration order, then
/// runs the post-round action with the round number.
pub struct StepSync {
    shared: Arc<Shared<StepState>>,
}

impl StepSync {
    /// Step synchronizer running `post_round` after every round.
    #[must_use]
    pub fn new(post_round: impl FnMut(u64) + Send + 'static) -> Self {
        Self {
            shared: Arc::new(Shared::new(StepState {
                rounds: 0,
                post_round: Box::new(post_round),
            })),
        }
    }

    /// Rounds completed so far.
    #[must_use]
    pub fn rounds(&self) -> u64 {
        self.shared.lock().extra.rounds
    }
}

fn run_rounds(shared: &Shared<StepState>, nodes: &mut [Node]) {
    loop {
        shared.wait_while_paused(|inner| {
            nodes
                .iter()
                .all(|node| node.is_halted() || !inner.stops.contains_key(&node.id()))
        });
        for node in nodes.iter_mut() {
            node.step();
        }
        let mut inner = shared.lock();
        inner.extra.rounds += 1;
        let round = inner.extra.rounds;
        (inner.extra.post_round)(round);
        drop(inner);
        if nodes.iter().all(Node::is_halted) {
            break;
        }
    }
    tracing::debug!(nodes = nodes.len(), "step rounds finished");
}

impl Synchronizer for StepSync {
    fn add_node(&self, node: Node) -> Result<(), SyncError> {
        self.shared.add_node(node, None, |_, _| {})
    }

    fn remove_node(&self, id: NodeId) -> Result<(), SyncError> {
        self.shared.remove_node(id, |_, _| {})
    }

    fn start(&self) -> Result<(), SyncError> {
        let mut nodes = self.shared.begin()?;
        let shared = Arc::clone(&self.shared);
        let handle = spawn("step-sync".to_owned(), move || {
            run_rounds(&shared, &mut nodes);
            nodes
        })?;
        self.shared.push_handle(handle);
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

    /// Nodes never run ahead of each other by more than one instruction.
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
