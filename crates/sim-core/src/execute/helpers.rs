//! Addressing and control-flow helpers shared by the instruction handlers.

use crate::decoder::Decoder;
use crate::isa::Register;
use crate::state::State;
use crate::timing::{cycle_cost, skip_cost, CycleCostKind};

/// Skips the instruction after the current one, returning the extra cycles.
///
/// Only the first word of the skipped instruction is inspected; its size
/// decides whether one or two words are stepped over.
pub(super) fn skip(state: &mut State) -> u16 {
    let next = state.next_pc();
    let size = state
        .program()
        .read_word(next)
        .map_or(2, Decoder::instruction_size);
    state.set_next_pc(next.wrapping_add(u32::from(size)));
    skip_cost(size)
}

/// Takes a conditional branch when `condition` holds, returning the extra cycles.
pub(super) fn branch(state: &mut State, condition: bool, target: u32) -> u16 {
    if !condition {
        return 0;
    }
    state.set_next_pc(target);
    cycle_cost(CycleCostKind::BranchTaken)
}

/// Address in `ptr`, which is then incremented.
pub(super) fn post_increment(state: &mut State, ptr: Register) -> u16 {
    let address = state.reg_pair(ptr);
    state.set_reg_pair(ptr, address.wrapping_add(1));
    address
}

/// Decrements `ptr` and returns the new address.
pub(super) fn pre_decrement(state: &mut State, ptr: Register) -> u16 {
    let address = state.reg_pair(ptr).wrapping_sub(1);
    state.set_reg_pair(ptr, address);
    address
}

/// `Z` as a program byte address, extended by `RAMPZ` when `extended`.
pub(super) fn program_pointer(state: &State, extended: bool) -> u32 {
    let z = u32::from(state.reg_pair(Register::Z));
    if extended {
        z | u32::from(state.rampz()) << 16
    } else {
        z
    }
}

/// Increments `RAMPZ:Z` as one 24-bit pointer.
pub(super) fn increment_program_pointer(state: &mut State) {
    let next = program_pointer(state, true).wrapping_add(1) & 0x00FF_FFFF;
    let [low, high, page, _] = next.to_le_bytes();
    state.set_reg_pair(Register::Z, u16::from_le_bytes([low, high]));
    state.set_rampz(page);
}

/// Indirect jump target: `Z` (extended by `EIND` when `extended`) as a word address.
pub(super) fn indirect_target(state: &State, extended: bool) -> u32 {
    let mut word = u32::from(state.reg_pair(Register::Z));
    if extended {
        word |= u32::from(state.eind()) << 16;
    }
    word << 1
}
