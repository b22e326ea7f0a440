//! Throughput harness for sim-core.
//!
//! ## Usage
//!
//! ```sh
//! cargo run -p sim-core --release --example performance_harness
//! ```
//!
//! ## Metrics
//!
//! - Instructions per second for free-running nodes, one per thread
//! - Simulated cycles per second, and how many 8 MHz nodes that sustains in real time
//! - Rendezvous per second for a barrier-synchronized group

#![allow(clippy::pedantic)]

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use sim_core::{
    Barrier, McuProfile, Node, NodeConfig, NodeId, StepOutcome, SyncConfig, Synchronizer,
};
use thiserror as _;
use tracing as _;

const NUM_THREADS: u32 = 4;
const SLICE_CYCLES: u64 = 10_000;
const TARGET_HZ: f64 = 8_000_000.0;

/// `ldi r16, 0` ; `inc r16` ; `add r17, r16` ; `rjmp .-6`
const LOOP: [u8; 8] = [0x00, 0xE0, 0x03, 0x95, 0x10, 0x0F, 0xFD, 0xCF];

#[derive(Debug, Clone, Copy)]
struct BenchmarkResult {
    name: &'static str,
    instructions_per_second: f64,
    cycles_per_second: f64,
    realtime_nodes: f64,
}

fn node(id: u32, cycle_limit: Option<u64>) -> Node {
    let config = NodeConfig {
        cycle_limit,
        ..NodeConfig::for_profile(NodeId(id), McuProfile::Atmega16)
    };
    let mut node = Node::new(&config).expect("valid config");
    node.load_program(&LOOP).expect("program fits");
    node
}

fn benchmark_free_running(duration: Duration) -> BenchmarkResult {
    let (tx, rx) = mpsc::channel();
    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|id| {
            let tx = tx.clone();
            thread::spawn(move || {
                let mut node = node(id, None);
                let mut instructions = 0u64;
                let start = Instant::now();
                while start.elapsed() < duration {
                    instructions += node.run_for(SLICE_CYCLES).steps;
                }
                tx.send((instructions, node.clock().count())).ok();
            })
        })
        .collect();
    drop(tx);
    for handle in handles {
        handle.join().expect("benchmark thread");
    }
    let (instructions, cycles) = rx
        .iter()
        .fold((0u64, 0u64), |(i, c), (ni, nc)| (i + ni, c + nc));
    let seconds = duration.as_secs_f64();
    let cycles_per_second = cycles as f64 / seconds;
    BenchmarkResult {
        name: "free-running",
        instructions_per_second: instructions as f64 / seconds,
        cycles_per_second,
        realtime_nodes: cycles_per_second / TARGET_HZ,
    }
}

fn benchmark_barrier(period: u64, cycle_limit: u64) -> (BenchmarkResult, f64) {
    let barrier = Barrier::new(SyncConfig { period }, |_| {});
    for id in 0..NUM_THREADS {
        barrier
            .add_node(node(id, Some(cycle_limit)))
            .expect("register node");
    }
    let start = Instant::now();
    barrier.start().expect("start barrier");
    let nodes = barrier.join().expect("join barrier");
    let seconds = start.elapsed().as_secs_f64();

    let cycles: u64 = nodes.iter().map(|node| node.clock().count()).sum();
    // The loop body retires 3 instructions in 4 cycles.
    let instructions = cycles * 3 / 4;
    let cycles_per_second = cycles as f64 / seconds;
    let result = BenchmarkResult {
        name: "barrier",
        instructions_per_second: instructions as f64 / seconds,
        cycles_per_second,
        realtime_nodes: cycles_per_second / TARGET_HZ,
    };
    (result, barrier.generation() as f64 / seconds)
}

fn print_result(result: &BenchmarkResult) {
    println!("{}:", result.name);
    println!(
        "  instructions/s: {:.2}M",
        result.instructions_per_second / 1e6
    );
    println!("  cycles/s:       {:.2}M", result.cycles_per_second / 1e6);
    println!("  8 MHz nodes:    {:.1}", result.realtime_nodes);
}

fn main() {
    let mut probe = node(0, Some(SLICE_CYCLES));
    let outcome = probe.run_for(SLICE_CYCLES * 2);
    assert_eq!(
        outcome.final_step,
        StepOutcome::Halted(sim_core::FaultCode::CycleLimit),
        "benchmark loop must run to its cycle limit"
    );

    print_result(&benchmark_free_running(Duration::from_secs(2)));
    let (result, rendezvous) = benchmark_barrier(1_000, 20_000_000);
    print_result(&result);
    println!("  rendezvous/s:   {rendezvous:.0}");
}
