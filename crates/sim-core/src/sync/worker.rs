//! Shared bookkeeping for synchronizers: one mutex/condvar pair, node
//! registration, lifecycle transitions and the per-thread run loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use super::{SyncError, SyncState};
use crate::fault::FaultCode;
use crate::node::{Node, NodeId};

/// State guarded by the synchronizer's mutex. `S` holds variant-specific data.
pub struct Inner<S> {
    pub state: SyncState,
    pub pending: Vec<Node>,
    pub finished: Vec<Node>,
    pub stops: BTreeMap<NodeId, Arc<AtomicBool>>,
    pub handles: Vec<JoinHandle<Vec<Node>>>,
    pub extra: S,
}

pub struct Shared<S> {
    inner: Mutex<Inner<S>>,
    cond: Condvar,
    paused: AtomicBool,
}

impl<S> Shared<S> {
    pub fn new(extra: S) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SyncState::Registering,
                pending: Vec::new(),
                finished: Vec::new(),
                stops: BTreeMap::new(),
                handles: Vec::new(),
                extra,
            }),
            cond: Condvar::new(),
            paused: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wait<'a>(&self, guard: MutexGuard<'a, Inner<S>>) -> MutexGuard<'a, Inner<S>> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notify(&self) {
        self.cond.notify_all();
    }

    pub fn state(&self) -> SyncState {
        self.lock().state
    }

    /// Registers `node` before start.
    pub fn add_node(
        &self,
        node: Node,
        capacity: Option<usize>,
        register: impl FnOnce(&mut S, NodeId),
    ) -> Result<(), SyncError> {
        let mut inner = self.lock();
        if inner.state != SyncState::Registering {
            return Err(SyncError::InvalidState { state: inner.state });
        }
        let id = node.id();
        if inner.stops.contains_key(&id) {
            return Err(SyncError::DuplicateNode(id));
        }
        if let Some(capacity) = capacity {
            if inner.pending.len() >= capacity {
                return Err(SyncError::Capacity { capacity });
            }
        }
        inner.stops.insert(id, node.stop_handle());
        register(&mut inner.extra, id);
        inner.pending.push(node);
        tracing::debug!(%id, "node registered");
        Ok(())
    }

    /// Stops node `id` at its next boundary and drops it from the group.
    pub fn remove_node(
        &self,
        id: NodeId,
        unregister: impl FnOnce(&mut S, NodeId),
    ) -> Result<(), SyncError> {
        let mut inner = self.lock();
        let Some(stop) = inner.stops.remove(&id) else {
            return Err(SyncError::UnknownNode(id));
        };
        stop.store(true, Ordering::Release);
        if let Some(position) = inner.pending.iter().position(|node| node.id() == id) {
            let mut node = inner.pending.remove(position);
            node.halt(FaultCode::Stopped);
            inner.finished.push(node);
        }
        unregister(&mut inner.extra, id);
        drop(inner);
        self.notify();
        tracing::debug!(%id, "node removed");
        Ok(())
    }

    /// True while `id` is registered.
    pub fn contains(&self, id: NodeId) -> bool {
        self.lock().stops.contains_key(&id)
    }

    /// Moves from `Registering` to `Running` and hands out the registered nodes.
    pub fn begin(&self) -> Result<Vec<Node>, SyncError> {
        let mut inner = self.lock();
        if inner.state != SyncState::Registering {
            return Err(SyncError::InvalidState { state: inner.state });
        }
        inner.state = SyncState::Running;
        tracing::info!(nodes = inner.pending.len(), "synchronizer started");
        Ok(std::mem::take(&mut inner.pending))
    }

    pub fn push_handle(&self, handle: JoinHandle<Vec<Node>>) {
        self.lock().handles.push(handle);
    }

    pub fn pause(&self) -> Result<(), SyncError> {
        let mut inner = self.lock();
        if inner.state != SyncState::Running {
            return Err(SyncError::InvalidState { state: inner.state });
        }
        inner.state = SyncState::Paused;
        self.paused.store(true, Ordering::Release);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), SyncError> {
        let mut inner = self.lock();
        if inner.state != SyncState::Paused {
            return Err(SyncError::InvalidState { state: inner.state });
        }
        inner.state = SyncState::Running;
        self.paused.store(false, Ordering::Release);
        drop(inner);
        self.notify();
        Ok(())
    }

    /// Stops every node at its next boundary and wakes all waiters.
    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.state = SyncState::Stopped;
        for stop in inner.stops.values() {
            stop.store(true, Ordering::Release);
        }
        self.paused.store(false, Ordering::Release);
        drop(inner);
        self.notify();
        tracing::info!("synchronizer stopped");
    }

    /// Blocks until every thread has finished and returns all nodes, ordered by id.
    pub fn join(&self) -> Result<Vec<Node>, SyncError> {
        let (handles, mut nodes) = {
            let mut inner = self.lock();
            let mut nodes = std::mem::take(&mut inner.finished);
            nodes.append(&mut inner.pending);
            (std::mem::take(&mut inner.handles), nodes)
        };
        let mut panicked = None;
        for handle in handles {
            let name = handle.thread().name().unwrap_or("node").to_owned();
            match handle.join() {
                Ok(mut finished) => nodes.append(&mut finished),
                Err(_) => panicked = Some(name),
            }
        }
        self.lock().state = SyncState::Stopped;
        if let Some(name) = panicked {
            return Err(SyncError::ThreadPanicked { name });
        }
        nodes.sort_by_key(Node::id);
        Ok(nodes)
    }

    /// Blocks while paused, until `released` reports that the caller no
    /// longer takes part. Returns immediately otherwise.
    pub fn wait_while_paused(&self, released: impl Fn(&Inner<S>) -> bool) {
        let mut inner = self.lock();
        while inner.state == SyncState::Paused && !released(&inner) {
            inner = self.wait(inner);
        }
    }

    /// Steps `node` until it halts, honoring pause at instruction boundaries.
    /// A node removed while paused leaves at once and halts `Stopped`.
    pub fn drive(&self, node: &mut Node) {
        let id = node.id();
        let cancel = node.stop_handle();
        while !node.is_halted() {
            if self.paused.load(Ordering::Acquire) {
                self.wait_while_paused(|inner| {
                    cancel.load(Ordering::Acquire) || !inner.stops.contains_key(&id)
                });
            }
            node.step();
        }
        tracing::debug!(id = %node.id(), halted = ?node.halted(), "node finished");
    }
}

/// Spawns a named thread.
pub fn spawn(
    name: String,
    body: impl FnOnce() -> Vec<Node> + Send + 'static,
) -> Result<JoinHandle<Vec<Node>>, SyncError> {
    Ok(thread::Builder::new().name(name).spawn(body)?)
}
