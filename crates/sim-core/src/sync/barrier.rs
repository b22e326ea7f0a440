//! Periodic rendezvous of every node.
//!
//! Each node carries a [`BarrierEvent`] on its main clock, firing every
//! period. The event blocks the node thread until every active node has
//! arrived; the last arriver runs the relay action and releases the rest.
//! A node that halts or is removed leaves the group, which can release the
//! nodes already waiting.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::worker::{spawn, Inner, Shared};
use super::{SyncError, SyncState, Synchronizer};
use crate::clock::{Event, MainClock};
use crate::config::SyncConfig;
use crate::node::{Node, NodeId};

type Relay = Box<dyn FnMut(u64) + Send>;

pub(crate) struct BarrierState {
    members: BTreeSet<NodeId>,
    arrived: BTreeSet<NodeId>,
    generation: u64,
    time: u64,
    relay: Relay,
}

impl BarrierState {
    fn leave(&mut self, id: NodeId) -> bool {
        self.members.remove(&id);
        self.arrived.remove(&id);
        self.try_release()
    }

    fn try_release(&mut self) -> bool {
        if self.arrived.is_empty() || self.arrived.len() < self.members.len() {
            return false;
        }
        self.arrived.clear();
        self.generation += 1;
        (self.relay)(self.time);
        tracing::trace!(generation = self.generation, time = self.time, "barrier released");
        true
    }
}

/// Rendezvous event scheduled on one node's clock.
struct BarrierEvent {
    id: NodeId,
    period: u64,
    shared: Arc<Shared<BarrierState>>,
}

impl Event for BarrierEvent {
    fn fire(self: Arc<Self>, clock: &mut MainClock) {
        if arrive(&self.shared, self.id, clock.count()) {
            let period = self.period;
            clock.insert(self, period);
        }
    }
}

fn stay(inner: &Inner<BarrierState>, id: NodeId) -> bool {
    inner.state != SyncState::Stopped && inner.extra.members.contains(&id)
}

/// Blocks until released. False once the node no longer takes part.
fn arrive(shared: &Shared<BarrierState>, id: NodeId, time: u64) -> bool {
    let mut inner = shared.lock();
    if !stay(&inner, id) {
        return false;
    }
    inner.extra.arrived.insert(id);
    inner.extra.time = inner.extra.time.max(time);
    if inner.extra.try_release() {
        drop(inner);
        shared.notify();
        return true;
    }
    let generation = inner.extra.generation;
    while inner.extra.generation == generation && stay(&inner, id) {
        inner = shared.wait(inner);
    }
    stay(&inner, id)
}

/// Barrier synchronizer: one thread per node, rendezvous every period.
pub struct Barrier {
    shared: Arc<Shared<BarrierState>>,
    period: u64,
}

impl Barrier {
    /// Barrier meeting every `config.period` cycles. `relay` runs once per
    /// rendezvous, on the last arriver's thread, with the rendezvous time.
    #[must_use]
    pub fn new(config: SyncConfig, relay: impl FnMut(u64) + Send + 'static) -> Self {
        Self {
            shared: Arc::new(Shared::new(BarrierState {
                members: BTreeSet::new(),
                arrived: BTreeSet::new(),
                generation: 0,
                time: 0,
                relay: Box::new(relay),
            })),
            period: config.period.max(1),
        }
    }

    /// Completed rendezvous so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.shared.lock().extra.generation
    }

    /// Nodes still taking part.
    #[must_use]
    pub fn active(&self) -> usize {
        self.shared.lock().extra.members.len()
    }
}

impl Synchronizer for Barrier {
    fn add_node(&self, node: Node) -> Result<(), SyncError> {
        self.shared.add_node(node, None, |extra, id| {
            extra.members.insert(id);
        })
    }

    fn remove_node(&self, id: NodeId) -> Result<(), SyncError> {
        self.shared.remove_node(id, |extra, id| {
            extra.leave(id);
        })
    }

    fn start(&self) -> Result<(), SyncError> {
        for mut node in self.shared.begin()? {
            let id = node.id();
            let event = Arc::new(BarrierEvent {
                id,
                period: self.period,
                shared: Arc::clone(&self.shared),
            });
            node.clock_mut().insert(event, self.period);
            let shared = Arc::clone(&self.shared);
            let handle = spawn(id.to_string(), move || {
                shared.drive(&mut node);
                let mut inner = shared.lock();
                inner.extra.leave(id);
                drop(inner);
                shared.notify();
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

    /// Rendezvous is implicit at every period, so this only checks `id`.
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
