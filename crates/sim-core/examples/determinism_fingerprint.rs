//! Deterministic fingerprint of a barrier-synchronized node group, used for
//! cross-host comparison.
//!
//! Each node runs a loop that counts in `r16` and stores the count through
//! `X+` into a 128-byte ring. The fingerprint hashes every node's final
//! architectural state, the ring contents and the barrier rendezvous times.

use std::sync::{Arc, Mutex};

use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use sim_core::{Barrier, McuProfile, Node, NodeConfig, NodeId, SyncConfig, Synchronizer};
use thiserror as _;
use tracing as _;

const NODES: u32 = 3;
const CYCLE_LIMIT: u64 = 20_000;
const PERIOD: u64 = 250;

const PROGRAM: [u8; 18] = [
    0x00, 0xE0, // ldi r16, 0x00
    0xA0, 0xE6, // ldi r26, 0x60
    0xB0, 0xE0, // ldi r27, 0x00
    0x03, 0x95, // inc r16
    0x0D, 0x93, // st X+, r16
    0xA0, 0x3E, // cpi r26, 0xE0
    0x09, 0xF4, // brne .+2
    0xA0, 0xE6, // ldi r26, 0x60
    0xFA, 0xCF, // rjmp .-12
];

fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(0x1000_0000_01B3);
    }
}

fn node(id: u32) -> Node {
    let config = NodeConfig {
        cycle_limit: Some(CYCLE_LIMIT + u64::from(id) * 10),
        ..NodeConfig::for_profile(NodeId(id), McuProfile::Atmega16)
    };
    let mut node = Node::new(&config).expect("valid config");
    node.load_program(&PROGRAM).expect("program fits");
    node
}

fn fingerprint() -> String {
    let times = Arc::new(Mutex::new(Vec::new()));
    let relay = {
        let times = Arc::clone(&times);
        move |time: u64| times.lock().expect("times").push(time)
    };
    let barrier = Barrier::new(SyncConfig { period: PERIOD }, relay);
    for id in 0..NODES {
        barrier.add_node(node(id)).expect("register node");
    }
    barrier.start().expect("start barrier");
    let mut nodes = barrier.join().expect("join barrier");

    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    for time in times.lock().expect("times").iter() {
        hash_bytes(&mut hash, &time.to_le_bytes());
    }
    for node in &mut nodes {
        hash_bytes(&mut hash, &node.id().0.to_le_bytes());
        hash_bytes(&mut hash, &[node.halted().map_or(0, sim_core::FaultCode::as_u8)]);
        let state = node.state_mut();
        hash_bytes(&mut hash, state.registers());
        hash_bytes(&mut hash, &[state.flags().to_byte()]);
        hash_bytes(&mut hash, &state.pc().to_le_bytes());
        hash_bytes(&mut hash, &state.sp().to_le_bytes());
        hash_bytes(&mut hash, &state.cycles().to_le_bytes());
        let ring: Vec<u8> = (0x60..0xE0).map(|address| state.read_data(address)).collect();
        hash_bytes(&mut hash, &ring);
    }

    format!("{hash:016x}")
}

fn main() {
    println!("{}", fingerprint());
}
