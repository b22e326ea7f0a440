//! Multi-threaded synchronizer scenarios.

#![allow(clippy::pedantic, clippy::nursery)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use proptest as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use sim_core::clock::from_fn;
use sim_core::{
    Barrier, FaultCode, Instruction, McuProfile, Node, NodeConfig, NodeId, Probe, Ripple, Single,
    State, StepSync, SyncConfig, SyncError, SyncState, Synchronizer,
};
use thiserror as _;
use tracing as _;

/// `rjmp .-2`: a two-cycle loop on itself.
const SPIN: [u8; 2] = [0xFF, 0xCF];

fn node(id: u32, image: &[u8], cycle_limit: Option<u64>) -> Node {
    let config = NodeConfig {
        cycle_limit,
        ..NodeConfig::for_profile(NodeId(id), McuProfile::Atmega16)
    };
    let mut node = Node::new(&config).expect("valid config");
    node.load_program(image).expect("image fits");
    node
}

fn spinner(id: u32, cycle_limit: Option<u64>) -> Node {
    node(id, &SPIN, cycle_limit)
}

#[derive(Default)]
struct Counter(AtomicU64);

impl Probe for Counter {
    fn before(&self, _state: &State, _instruction: &Instruction) {}

    fn after(&self, _state: &State, _instruction: &Instruction) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Holds its node before the first instruction until opened.
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    fn open(&self) {
        *self.open.lock().expect("gate") = true;
        self.cond.notify_all();
    }
}

impl Probe for Gate {
    fn before(&self, _state: &State, _instruction: &Instruction) {
        let mut open = self.open.lock().expect("gate");
        while !*open {
            open = self.cond.wait(open).expect("gate");
        }
    }

    fn after(&self, _state: &State, _instruction: &Instruction) {}
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn barrier_releases_once_per_period_for_every_node() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let relay = {
        let times = Arc::clone(&times);
        move |time: u64| times.lock().expect("times").push(time)
    };
    let barrier = Barrier::new(SyncConfig { period: 100 }, relay);
    for id in 0..3 {
        barrier.add_node(spinner(id, Some(1000))).expect("registered");
    }
    barrier.start().expect("started");
    let nodes = barrier.join().expect("joined");

    assert_eq!(barrier.generation(), 10);
    assert_eq!(
        *times.lock().expect("times"),
        (1..=10).map(|k| k * 100).collect::<Vec<u64>>()
    );
    assert_eq!(nodes.len(), 3);
    for node in &nodes {
        assert_eq!(node.halted(), Some(FaultCode::CycleLimit));
        assert_eq!(node.clock().count(), 1000);
    }
    assert_eq!(barrier.active(), 0);
    assert_eq!(barrier.state(), SyncState::Stopped);
}

#[test]
fn removing_a_straggler_releases_the_waiting_nodes() {
    let barrier = Barrier::new(SyncConfig { period: 100 }, |_| {});
    let gate = Arc::new(Gate::default());
    let mut straggler = spinner(1, None);
    straggler.add_probe(Arc::clone(&gate) as Arc<dyn Probe>);
    barrier.add_node(spinner(0, Some(1000))).expect("registered");
    barrier.add_node(straggler).expect("registered");
    barrier.start().expect("started");

    thread::sleep(Duration::from_millis(50));
    assert_eq!(barrier.generation(), 0);
    assert_eq!(barrier.active(), 2);

    barrier.remove_node(NodeId(1)).expect("registered");
    wait_until(|| barrier.generation() >= 1);
    gate.open();
    let nodes = barrier.join().expect("joined");

    assert_eq!(barrier.generation(), 10);
    assert_eq!(nodes[0].halted(), Some(FaultCode::CycleLimit));
    assert_eq!(nodes[1].halted(), Some(FaultCode::Stopped));
    assert!(matches!(
        barrier.remove_node(NodeId(1)),
        Err(SyncError::UnknownNode(NodeId(1)))
    ));
}

#[rstest]
#[case(5000)]
#[case(500)]
fn ripple_waits_until_neighbors_catch_up(#[case] neighbor_limit: u64) {
    let ripple = Arc::new(Ripple::new(SyncConfig { period: 100 }));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut waiter = spinner(0, Some(5000));
    {
        let ripple = Arc::clone(&ripple);
        let seen = Arc::clone(&seen);
        waiter.clock_mut().insert(
            from_fn(move |clock| {
                let waited = ripple.wait_for_neighbors(NodeId(0), clock.count());
                let neighbor = ripple.reached(NodeId(1));
                seen.lock()
                    .expect("seen")
                    .push((waited.is_ok(), neighbor));
            }),
            2000,
        );
    }
    assert!(matches!(
        ripple.wait_for_neighbors(NodeId(0), 10),
        Err(SyncError::InvalidState {
            state: SyncState::Registering
        })
    ));
    ripple.add_node(waiter).expect("registered");
    ripple
        .add_node(spinner(1, Some(neighbor_limit)))
        .expect("registered");
    ripple.start().expect("started");
    let nodes = ripple.join().expect("joined");

    let seen = seen.lock().expect("seen").clone();
    assert_eq!(seen.len(), 1);
    let (waited, neighbor) = seen[0];
    assert!(waited);
    assert!(neighbor.map_or(true, |time| time >= 2000), "{neighbor:?}");
    if neighbor_limit < 2000 {
        assert_eq!(neighbor, None);
    }
    assert!(ripple.checkpoints().is_empty());
    assert_eq!(nodes[0].clock().count(), 5000);
    assert_eq!(nodes[1].clock().count(), neighbor_limit);
    assert!(matches!(
        ripple.wait_for_neighbors(NodeId(7), 10),
        Err(SyncError::UnknownNode(NodeId(7)))
    ));
}

#[test]
fn step_runs_rounds_until_every_node_halts() {
    let rounds = Arc::new(Mutex::new(Vec::new()));
    let step = {
        let rounds = Arc::clone(&rounds);
        StepSync::new(move |round: u64| rounds.lock().expect("rounds").push(round))
    };
    step.add_node(node(0, &[0; 64], Some(10))).expect("registered");
    step.add_node(node(1, &[0; 64], Some(20))).expect("registered");
    step.start().expect("started");
    let nodes = step.join().expect("joined");

    assert_eq!(step.rounds(), 21);
    assert_eq!(
        *rounds.lock().expect("rounds"),
        (1..=21).collect::<Vec<u64>>()
    );
    assert_eq!(nodes[0].state().cycles(), 10);
    assert_eq!(nodes[1].state().cycles(), 20);
    assert!(step.wait_for_neighbors(NodeId(1), 0).is_ok());
}

#[test]
fn step_stops_spinning_nodes() {
    let step = StepSync::new(|_| {});
    step.add_node(spinner(0, None)).expect("registered");
    step.add_node(spinner(1, None)).expect("registered");
    step.start().expect("started");
    wait_until(|| step.rounds() > 100);
    step.stop();
    let nodes = step.join().expect("joined");
    assert!(nodes
        .iter()
        .all(|node| node.halted() == Some(FaultCode::Stopped)));
}

#[test]
fn single_holds_exactly_one_node() {
    let single = Single::new();
    single.add_node(spinner(0, Some(100))).expect("registered");
    assert!(matches!(
        single.add_node(spinner(1, None)),
        Err(SyncError::Capacity { capacity: 1 })
    ));
    assert!(matches!(
        single.add_node(spinner(0, None)),
        Err(SyncError::DuplicateNode(NodeId(0)))
    ));
    single.start().expect("started");
    assert!(matches!(
        single.add_node(spinner(2, None)),
        Err(SyncError::InvalidState {
            state: SyncState::Running
        })
    ));
    let nodes = single.join().expect("joined");
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].halted(), Some(FaultCode::CycleLimit));
    assert!(single.start().is_err());
}

#[test]
fn pause_holds_nodes_at_a_boundary_until_resumed() {
    let counter = Arc::new(Counter::default());
    let mut looping = spinner(0, None);
    looping.add_probe(Arc::clone(&counter) as Arc<dyn Probe>);
    let single = Single::new();
    single.add_node(looping).expect("registered");
    single.start().expect("started");

    wait_until(|| counter.0.load(Ordering::Relaxed) > 0);
    single.pause().expect("running");
    assert_eq!(single.state(), SyncState::Paused);
    assert!(single.pause().is_err());
    thread::sleep(Duration::from_millis(20));
    let held = counter.0.load(Ordering::Relaxed);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(counter.0.load(Ordering::Relaxed), held);

    single.resume().expect("paused");
    wait_until(|| counter.0.load(Ordering::Relaxed) > held);
    single.stop();
    assert_eq!(single.state(), SyncState::Stopped);
    let nodes = single.join().expect("joined");
    assert_eq!(nodes[0].halted(), Some(FaultCode::Stopped));
}

#[test]
fn stop_while_paused_releases_the_node() {
    let single = Single::new();
    single.add_node(spinner(0, None)).expect("registered");
    single.start().expect("started");
    single.pause().expect("running");
    single.stop();
    let nodes = single.join().expect("joined");
    assert_eq!(nodes[0].halted(), Some(FaultCode::Stopped));
}

fn remove_all_while_paused(sync: &dyn Synchronizer, ids: &[u32]) -> Vec<Node> {
    for &id in ids {
        sync.add_node(spinner(id, None)).expect("registered");
    }
    sync.start().expect("started");
    sync.pause().expect("running");
    for &id in ids {
        sync.remove_node(NodeId(id)).expect("registered");
    }
    assert_eq!(sync.state(), SyncState::Paused);
    sync.join().expect("removed nodes leave without a resume")
}

#[test]
fn removal_while_paused_lets_single_join() {
    let nodes = remove_all_while_paused(&Single::new(), &[0]);
    assert_eq!(nodes[0].halted(), Some(FaultCode::Stopped));
}

#[rstest]
#[case::barrier(Box::new(Barrier::new(SyncConfig { period: 100 }, |_| {})) as Box<dyn Synchronizer>)]
#[case::ripple(Box::new(Ripple::new(SyncConfig { period: 100 })) as Box<dyn Synchronizer>)]
#[case::step(Box::new(StepSync::new(|_| {})) as Box<dyn Synchronizer>)]
fn removal_while_paused_releases_every_group_member(#[case] sync: Box<dyn Synchronizer>) {
    let nodes = remove_all_while_paused(sync.as_ref(), &[0, 1, 2]);
    assert_eq!(nodes.len(), 3);
    assert!(nodes
        .iter()
        .all(|node| node.halted() == Some(FaultCode::Stopped)));
}
