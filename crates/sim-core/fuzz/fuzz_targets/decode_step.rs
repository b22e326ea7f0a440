#![no_main]

use libfuzzer_sys::fuzz_target;
use sim_core::{disassemble_range, Decoder, McuProfile, Node, NodeConfig, NodeId};

const STEP_BUDGET: usize = 256;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let word = u16::from_le_bytes([data[0], data[1]]);
    if let Some((instruction, size)) = Decoder::decode(0, 0, data) {
        assert_eq!(size, Decoder::instruction_size(word));
        assert_eq!(instruction.encode().first(), word);
    }
    let end = u32::try_from(data.len().min(64)).unwrap_or(0);
    let _ = disassemble_range(data, 0, end);

    let config = NodeConfig {
        cycle_limit: Some(4096),
        ..NodeConfig::for_profile(NodeId(0), McuProfile::Atmega16)
    };
    let Ok(mut node) = Node::new(&config) else {
        return;
    };
    if node.load_program(data).is_err() {
        return;
    }
    for _ in 0..STEP_BUDGET {
        if node.is_halted() {
            break;
        }
        node.step();
    }
});
