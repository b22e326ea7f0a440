//! Instruction semantics for the AVR core.
//!
//! [`execute_instruction`] applies one decoded instruction to a [`State`]:
//! 1. Set the fall-through address (`pc + size`)
//! 2. Read operands, compute the result and write registers or memory
//! 3. Update status flags
//! 4. Redirect control flow for branches, skips, calls and returns
//! 5. Commit the program counter
//!
//! Memory errors escalated by a reporter surface as [`ExecuteOutcome::Fault`]
//! and leave the program counter on the faulting instruction.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::similar_names
)]

mod flags;
mod helpers;

pub use flags::FlagsUpdate;

use crate::fault::FaultCode;
use crate::isa::{Instruction, Register};
use crate::state::{Flags, InterruptState, State};

use helpers::{
    branch, increment_program_pointer, indirect_target, post_increment, pre_decrement,
    program_pointer, skip,
};

/// Outcome of executing a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Instruction retired.
    Retired {
        /// Cycles consumed, including taken-branch and skip costs.
        cycles: u16,
    },
    /// `sleep` retired; the core idles until an interrupt.
    Sleep {
        /// Cycles consumed by the `sleep` itself.
        cycles: u16,
    },
    /// `break` executed. The program counter stays on it.
    Break,
    /// A reporter escalated a memory error during execution.
    Fault {
        /// Fault code.
        cause: FaultCode,
    },
}

enum Flow {
    Continue(u16),
    Sleep,
    Break,
}

/// Executes `instruction` located at `state.pc()`.
///
/// Cycles are returned, not charged: the caller owns the clock.
pub fn execute_instruction(instruction: &Instruction, state: &mut State) -> ExecuteOutcome {
    let pc = state.pc();
    state.set_next_pc(pc.wrapping_add(u32::from(instruction.size())));
    let base = u16::from(instruction.min_cycles());
    let flow = run(instruction, state);
    if let Some(cause) = state.take_pending_fault() {
        return ExecuteOutcome::Fault { cause };
    }
    match flow {
        Flow::Continue(extra) => {
            state.set_pc(state.next_pc());
            ExecuteOutcome::Retired {
                cycles: base + extra,
            }
        }
        Flow::Sleep => {
            state.set_pc(state.next_pc());
            state.set_sleeping(true);
            ExecuteOutcome::Sleep { cycles: base }
        }
        Flow::Break => ExecuteOutcome::Break,
    }
}

fn apply(state: &mut State, update: FlagsUpdate) {
    update.apply(state.flags_mut());
}

const fn bit_of(value: u8, bit: u8) -> bool {
    (value >> (bit & 7)) & 1 != 0
}

#[allow(clippy::too_many_lines)]
fn run(instruction: &Instruction, state: &mut State) -> Flow {
    let mut extra = 0;
    match *instruction {
        Instruction::Add(f) | Instruction::Adc(f) => {
            let carry = matches!(instruction, Instruction::Adc(_)) && state.flags().c;
            let (r, update) = flags::add(state.reg(f.rd), state.reg(f.rr), carry);
            state.set_reg(f.rd, r);
            apply(state, update);
        }
        Instruction::Sub(f) | Instruction::Cp(f) => {
            let (r, update) = flags::sub(state.reg(f.rd), state.reg(f.rr), false);
            if matches!(instruction, Instruction::Sub(_)) {
                state.set_reg(f.rd, r);
            }
            apply(state, update);
        }
        Instruction::Sbc(f) | Instruction::Cpc(f) => {
            let old = state.flags();
            let (r, update) = flags::sub_with_carry(state.reg(f.rd), state.reg(f.rr), old.c, old.z);
            if matches!(instruction, Instruction::Sbc(_)) {
                state.set_reg(f.rd, r);
            }
            apply(state, update);
        }
        Instruction::Subi(f) | Instruction::Cpi(f) => {
            let (r, update) = flags::sub(state.reg(f.rd), f.k, false);
            if matches!(instruction, Instruction::Subi(_)) {
                state.set_reg(f.rd, r);
            }
            apply(state, update);
        }
        Instruction::Sbci(f) => {
            let old = state.flags();
            let (r, update) = flags::sub_with_carry(state.reg(f.rd), f.k, old.c, old.z);
            state.set_reg(f.rd, r);
            apply(state, update);
        }
        Instruction::And(f) | Instruction::Or(f) | Instruction::Eor(f) => {
            let (rd, rr) = (state.reg(f.rd), state.reg(f.rr));
            let r = match instruction {
                Instruction::And(_) => rd & rr,
                Instruction::Or(_) => rd | rr,
                _ => rd ^ rr,
            };
            state.set_reg(f.rd, r);
            apply(state, flags::logic(r));
        }
        Instruction::Andi(f) | Instruction::Ori(f) => {
            let rd = state.reg(f.rd);
            let r = if matches!(instruction, Instruction::Andi(_)) {
                rd & f.k
            } else {
                rd | f.k
            };
            state.set_reg(f.rd, r);
            apply(state, flags::logic(r));
        }
        Instruction::Ldi(f) => state.set_reg(f.rd, f.k),
        Instruction::Mov(f) => state.set_reg(f.rd, state.reg(f.rr)),
        Instruction::Movw(f) => state.set_reg_pair(f.rd, state.reg_pair(f.rr)),
        Instruction::Cpse(f) => {
            if state.reg(f.rd) == state.reg(f.rr) {
                extra = skip(state);
            }
        }
        Instruction::Adiw(f) => {
            let (r, update) = flags::add_word(state.reg_pair(f.rd), f.k);
            state.set_reg_pair(f.rd, r);
            apply(state, update);
        }
        Instruction::Sbiw(f) => {
            let (r, update) = flags::sub_word(state.reg_pair(f.rd), f.k);
            state.set_reg_pair(f.rd, r);
            apply(state, update);
        }
        Instruction::Mul(f) | Instruction::Muls(f) | Instruction::Mulsu(f) => {
            let (rd, rr) = (state.reg(f.rd), state.reg(f.rr));
            let product = match instruction {
                Instruction::Mul(_) => u16::from(rd) * u16::from(rr),
                Instruction::Muls(_) => (i16::from(rd as i8) * i16::from(rr as i8)) as u16,
                _ => (i16::from(rd as i8) * i16::from(rr)) as u16,
            };
            state.set_reg_pair(Register::R0, product);
            apply(state, flags::multiply(product));
        }
        Instruction::Fmul(f) | Instruction::Fmuls(f) | Instruction::Fmulsu(f) => {
            let (rd, rr) = (state.reg(f.rd), state.reg(f.rr));
            let product = match instruction {
                Instruction::Fmul(_) => u16::from(rd) * u16::from(rr),
                Instruction::Fmuls(_) => (i16::from(rd as i8) * i16::from(rr as i8)) as u16,
                _ => (i16::from(rd as i8) * i16::from(rr)) as u16,
            };
            let (r, update) = flags::fractional(product);
            state.set_reg_pair(Register::R0, r);
            apply(state, update);
        }
        Instruction::Com(f) => unary(state, f.rd, flags::com),
        Instruction::Neg(f) => unary(state, f.rd, flags::neg),
        Instruction::Inc(f) => unary(state, f.rd, flags::inc),
        Instruction::Dec(f) => unary(state, f.rd, flags::dec),
        Instruction::Asr(f) => unary(state, f.rd, flags::asr),
        Instruction::Lsr(f) => unary(state, f.rd, flags::lsr),
        Instruction::Ror(f) => {
            let (r, update) = flags::ror(state.reg(f.rd), state.flags().c);
            state.set_reg(f.rd, r);
            apply(state, update);
        }
        Instruction::Swap(f) => state.set_reg(f.rd, state.reg(f.rd).rotate_left(4)),
        Instruction::Bset(f) => {
            state.flags_mut().set(f.flag, true);
            if f.flag == Flags::I {
                state.set_interrupt_state(InterruptState::SuppressedForOneInstruction);
            }
        }
        Instruction::Bclr(f) => state.flags_mut().set(f.flag, false),
        Instruction::Bld(f) => {
            let mask = 1u8 << (f.bit & 7);
            let value = state.reg(f.reg);
            let value = if state.flags().t {
                value | mask
            } else {
                value & !mask
            };
            state.set_reg(f.reg, value);
        }
        Instruction::Bst(f) => {
            let t = bit_of(state.reg(f.reg), f.bit);
            state.flags_mut().t = t;
        }
        Instruction::Sbrc(f) | Instruction::Sbrs(f) => {
            let set = bit_of(state.reg(f.reg), f.bit);
            if set == matches!(instruction, Instruction::Sbrs(_)) {
                extra = skip(state);
            }
        }
        Instruction::Sbic(f) | Instruction::Sbis(f) => {
            let set = state.read_io_bit(f.io, f.bit);
            if set == matches!(instruction, Instruction::Sbis(_)) {
                extra = skip(state);
            }
        }
        Instruction::Cbi(f) => state.write_io_bit(f.io, f.bit, false),
        Instruction::Sbi(f) => state.write_io_bit(f.io, f.bit, true),
        Instruction::Brbs(f) | Instruction::Brbc(f) => {
            let taken = state.flags().get(f.flag) == matches!(instruction, Instruction::Brbs(_));
            extra = branch(state, taken, f.target);
        }
        Instruction::Jmp(f) => state.set_next_pc(f.target()),
        Instruction::Rjmp(f) => state.set_next_pc(f.target),
        Instruction::Ijmp => state.set_next_pc(indirect_target(state, false)),
        Instruction::Eijmp => state.set_next_pc(indirect_target(state, true)),
        Instruction::Call(f) => call(state, f.target()),
        Instruction::Rcall(f) => call(state, f.target),
        Instruction::Icall | Instruction::Eicall => {
            let target = indirect_target(state, matches!(instruction, Instruction::Eicall));
            call(state, target);
        }
        Instruction::Ret => {
            let target = state.pop_return();
            state.set_next_pc(target);
        }
        Instruction::Reti => {
            let target = state.pop_return();
            state.set_next_pc(target);
            state.flags_mut().i = true;
            state.set_interrupt_state(InterruptState::SuppressedForOneInstruction);
        }
        Instruction::In(f) => {
            let value = state.read_io(f.io);
            state.set_reg(f.reg, value);
        }
        Instruction::Out(f) => state.write_io(f.io, state.reg(f.reg)),
        Instruction::Push(f) => state.push(state.reg(f.rd)),
        Instruction::Pop(f) => {
            let value = state.pop();
            state.set_reg(f.rd, value);
        }
        Instruction::Ld(f) => {
            let value = state.read_data(state.reg_pair(f.ptr));
            state.set_reg(f.reg, value);
        }
        Instruction::LdPi(f) => {
            let address = post_increment(state, f.ptr);
            let value = state.read_data(address);
            state.set_reg(f.reg, value);
        }
        Instruction::LdPd(f) => {
            let address = pre_decrement(state, f.ptr);
            let value = state.read_data(address);
            state.set_reg(f.reg, value);
        }
        Instruction::Ldd(f) => {
            let address = state.reg_pair(f.base).wrapping_add(u16::from(f.offset));
            let value = state.read_data(address);
            state.set_reg(f.reg, value);
        }
        Instruction::Lds(f) => {
            let value = state.read_data(f.address);
            state.set_reg(f.reg, value);
        }
        Instruction::St(f) => state.write_data(state.reg_pair(f.ptr), state.reg(f.reg)),
        Instruction::StPi(f) => {
            let value = state.reg(f.reg);
            let address = post_increment(state, f.ptr);
            state.write_data(address, value);
        }
        Instruction::StPd(f) => {
            let value = state.reg(f.reg);
            let address = pre_decrement(state, f.ptr);
            state.write_data(address, value);
        }
        Instruction::Std(f) => {
            let address = state.reg_pair(f.base).wrapping_add(u16::from(f.offset));
            state.write_data(address, state.reg(f.reg));
        }
        Instruction::Sts(f) => state.write_data(f.address, state.reg(f.reg)),
        Instruction::Lpm => {
            let value = state.read_program(program_pointer(state, false));
            state.set_reg(Register::R0, value);
        }
        Instruction::LpmD(f) | Instruction::LpmPi(f) => {
            let value = state.read_program(program_pointer(state, false));
            state.set_reg(f.reg, value);
            if matches!(instruction, Instruction::LpmPi(_)) {
                post_increment(state, Register::Z);
            }
        }
        Instruction::Elpm => {
            let value = state.read_program(program_pointer(state, true));
            state.set_reg(Register::R0, value);
        }
        Instruction::ElpmD(f) | Instruction::ElpmPi(f) => {
            let value = state.read_program(program_pointer(state, true));
            state.set_reg(f.reg, value);
            if matches!(instruction, Instruction::ElpmPi(_)) {
                increment_program_pointer(state);
            }
        }
        Instruction::Spm => {
            let address = program_pointer(state, true) & !1;
            state.write_program(address, state.reg_pair(Register::R0));
        }
        Instruction::Nop | Instruction::Wdr => {}
        Instruction::Sleep => return Flow::Sleep,
        Instruction::Break => return Flow::Break,
    }
    Flow::Continue(extra)
}

fn unary(state: &mut State, rd: Register, op: fn(u8) -> (u8, FlagsUpdate)) {
    let (r, update) = op(state.reg(rd));
    state.set_reg(rd, r);
    apply(state, update);
}

fn call(state: &mut State, target: u32) {
    state.push_return(state.next_pc());
    state.set_next_pc(target);
}
