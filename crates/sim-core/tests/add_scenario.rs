//! `add r1, r2` from raw bytes through execution and disassembly.

#![allow(clippy::pedantic, clippy::nursery)]

use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use sim_core::isa::RegReg;
use sim_core::{
    disassemble_one, execute_instruction, Decoder, ExecuteOutcome, Instruction, NodeConfig,
    Register, State,
};
use thiserror as _;
use tracing as _;

#[test]
fn add_r1_r2_decodes_executes_and_lists() {
    let bytes = 0x0C12_u16.to_le_bytes();
    let (instruction, size) = Decoder::decode(0, 0, &bytes).expect("add decodes");
    let r1 = Register::gpr(1).expect("r1");
    let r2 = Register::gpr(2).expect("r2");
    assert_eq!(instruction, Instruction::Add(RegReg { rd: r1, rr: r2 }));
    assert_eq!(size, 2);
    assert_eq!(instruction.min_cycles(), 1);

    let mut state = State::new(&NodeConfig::default()).expect("valid config");
    state.set_reg(r1, 0x10);
    state.set_reg(r2, 0x05);
    assert_eq!(
        execute_instruction(&instruction, &mut state),
        ExecuteOutcome::Retired { cycles: 1 }
    );
    assert_eq!(state.reg(r1), 0x15);
    assert_eq!(state.reg(r2), 0x05);
    assert_eq!(state.pc(), 2);
    let flags = state.flags();
    assert!(!flags.c && !flags.z && !flags.n);

    let row = disassemble_one(0, &bytes).expect("row");
    assert_eq!(row.text(), "add r1, r2");
}
