//! Progress publication with on-demand waiting.
//!
//! Nodes run freely. A periodic notify event publishes each node's reached
//! time. A node that needs its neighbors to catch up registers a checkpoint
//! and blocks until every other active node has published a time at or past
//! it. Checkpoints are kept sorted by time with their waiting nodes. A
//! publication at time `t` walks the checkpoints up to `t` and wakes the
//! waiters only when one of them is now satisfied.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::worker::{spawn, Shared};
use super::{SyncError, SyncState, Synchronizer};
use crate::clock::{Event, MainClock};
use crate::config::SyncConfig;
use crate::node::{Node, NodeId};

#[derive(Default)]
pub(crate) struct RippleState {
    reached: BTreeMap<NodeId, u64>,
    checkpoints: BTreeMap<u64, BTreeSet<NodeId>>,
}

impl RippleState {
    fn neighbors_reached(&self, id: NodeId, time: u64) -> bool {
        self.reached
            .iter()
            .filter(|(other, _)| **other != id)
            .all(|(_, reached)| *reached >= time)
    }

    /// True if a waiter at a checkpoint up to `published` can now go on.
    fn satisfied_up_to(&self, published: u64) -> bool {
        self.checkpoints
            .range(..=published)
            .any(|(time, waiters)| waiters.iter().any(|id| self.neighbors_reached(*id, *time)))
    }

    fn release_checkpoint(&mut self, id: NodeId, time: u64) {
        if let Some(waiters) = self.checkpoints.get_mut(&time) {
            waiters.remove(&id);
            if waiters.is_empty() {
                self.checkpoints.remove(&time);
            }
        }
    }
}

/// Publishes one node's reached time every period.
struct NotifyEvent {
    id: NodeId,
    period: u64,
    shared: Arc<Shared<RippleState>>,
}

impl Event for NotifyEvent {
    fn fire(self: Arc<Self>, clock: &mut MainClock) {
        let time = clock.count();
        let mut inner = self.shared.lock();
        let running = inner.state != SyncState::Stopped;
        let Some(reached) = inner.extra.reached.get_mut(&self.id) else {
            return;
        };
        *reached = time;
        let wake = inner.extra.satisfied_up_to(time);
        drop(inner);
        if wake {
            self.shared.notify();
        }
        if running {
            let period = self.period;
            clock.insert(self, period);
        }
    }
}

/// Ripple synchronizer: one thread per node, waits only where requested.
pub struct Ripple {
    shared: Arc<Shared<RippleState>>,
    period: u64,
}

impl Ripple {
    /// Ripple publishing progress every `config.period` cycles.
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(RippleState::default())),
            period: config.period.max(1),
        }
    }

    /// Last published time of node `id`, while it is active.
    #[must_use]
    pub fn reached(&self, id: NodeId) -> Option<u64> {
        self.shared.lock().extra.reached.get(&id).copied()
    }

    /// Registered checkpoints, earliest first, with their waiter counts.
    #[must_use]
    pub fn checkpoints(&self) -> Vec<(u64, usize)> {
        self.shared
            .lock()
            .extra
            .checkpoints
            .iter()
            .map(|(time, waiters)| (*time, waiters.len()))
            .collect()
    }
}

fn leave(shared: &Shared<RippleState>, id: NodeId) {
    shared.lock().extra.reached.remove(&id);
    shared.notify();
}

impl Synchronizer for Ripple {
    fn add_node(&self, node: Node) -> Result<(), SyncError> {
        self.shared.add_node(node, None, |extra, id| {
            extra.reached.insert(id, 0);
        })
    }

    fn remove_node(&self, id: NodeId) -> Result<(), SyncError> {
        self.shared.remove_node(id, |extra, id| {
            extra.reached.remove(&id);
        })
    }

    fn start(&self) -> Result<(), SyncError> {
        for mut node in self.shared.begin()? {
            let id = node.id();
            let event = Arc::new(NotifyEvent {
                id,
                period: self.period,
                shared: Arc::clone(&self.shared),
            });
            node.clock_mut().insert(event, self.period);
            let shared = Arc::clone(&self.shared);
            let handle = spawn(id.to_string(), move || {
                shared.drive(&mut node);
                leave(&shared, id);
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

    /// The caller has itself reached `time`, so that is published first.
    fn wait_for_neighbors(&self, id: NodeId, time: u64) -> Result<(), SyncError> {
        let mut inner = self.shared.lock();
        if inner.state == SyncState::Registering {
            return Err(SyncError::InvalidState { state: inner.state });
        }
        let Some(reached) = inner.extra.reached.get_mut(&id) else {
            return Err(SyncError::UnknownNode(id));
        };
        *reached = (*reached).max(time);
        inner.extra.checkpoints.entry(time).or_default().insert(id);
        self.shared.notify();
        while inner.state != SyncState::Stopped
            && inner.extra.reached.contains_key(&id)
            && !inner.extra.neighbors_reached(id, time)
        {
            inner = self.shared.wait(inner);
        }
        inner.extra.release_checkpoint(id, time);
        Ok(())
    }

    fn state(&self) -> SyncState {
        self.shared.state()
    }
}
