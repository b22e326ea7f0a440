//! Operation identities, their fixed properties, and per-variant operand signatures.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::operand::{
    Constraint, BIT3, DADDR16, DISP6, IMM6, IMM8, IO5, IO6, LREL12, PADDR22, SREL7,
};
use super::registers::RegisterSet;

/// Fieldless operation identity, one per encoding variant.
///
/// Aliases (`clr`, `lsl`, `sei`, `breq`, ...) are not separate variants; they decode
/// to their canonical form (`eor`, `add`, `bset`, `brbs`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Opcode {
    /// Add with carry.
    Adc,
    /// Add without carry.
    Add,
    /// Add immediate to a register pair.
    Adiw,
    /// Logical AND.
    And,
    /// Logical AND with immediate.
    Andi,
    /// Arithmetic shift right.
    Asr,
    /// Clear a status flag.
    Bclr,
    /// Load the T flag into a register bit.
    Bld,
    /// Branch if a status flag is clear.
    Brbc,
    /// Branch if a status flag is set.
    Brbs,
    /// Halt for the debugger.
    Break,
    /// Set a status flag.
    Bset,
    /// Store a register bit into the T flag.
    Bst,
    /// Long call to an absolute address.
    Call,
    /// Clear a bit in the low IO space.
    Cbi,
    /// One's complement.
    Com,
    /// Compare.
    Cp,
    /// Compare with carry.
    Cpc,
    /// Compare with immediate.
    Cpi,
    /// Compare and skip if equal.
    Cpse,
    /// Decrement.
    Dec,
    /// Extended indirect call through `Z` and `EIND`.
    Eicall,
    /// Extended indirect jump through `Z` and `EIND`.
    Eijmp,
    /// Extended program memory load into `r0`.
    Elpm,
    /// Extended program memory load into a register.
    ElpmD,
    /// Extended program memory load with `Z` post-increment.
    ElpmPi,
    /// Exclusive OR.
    Eor,
    /// Fractional unsigned multiply.
    Fmul,
    /// Fractional signed multiply.
    Fmuls,
    /// Fractional signed by unsigned multiply.
    Fmulsu,
    /// Indirect call through `Z`.
    Icall,
    /// Indirect jump through `Z`.
    Ijmp,
    /// Read an IO register.
    In,
    /// Increment.
    Inc,
    /// Long jump to an absolute address.
    Jmp,
    /// Load indirect.
    Ld,
    /// Load indirect with post-increment.
    LdPi,
    /// Load indirect with pre-decrement.
    LdPd,
    /// Load indirect with displacement.
    Ldd,
    /// Load immediate.
    Ldi,
    /// Load direct from data space.
    Lds,
    /// Program memory load into `r0`.
    Lpm,
    /// Program memory load into a register.
    LpmD,
    /// Program memory load with `Z` post-increment.
    LpmPi,
    /// Logical shift right.
    Lsr,
    /// Copy a register.
    Mov,
    /// Copy a register pair.
    Movw,
    /// Unsigned multiply.
    Mul,
    /// Signed multiply.
    Muls,
    /// Signed by unsigned multiply.
    Mulsu,
    /// Two's complement.
    Neg,
    /// No operation.
    Nop,
    /// Logical OR.
    Or,
    /// Logical OR with immediate.
    Ori,
    /// Write an IO register.
    Out,
    /// Pop a register from the stack.
    Pop,
    /// Push a register onto the stack.
    Push,
    /// Relative call.
    Rcall,
    /// Return from subroutine.
    Ret,
    /// Return from interrupt.
    Reti,
    /// Relative jump.
    Rjmp,
    /// Rotate right through carry.
    Ror,
    /// Subtract with carry.
    Sbc,
    /// Subtract immediate with carry.
    Sbci,
    /// Set a bit in the low IO space.
    Sbi,
    /// Skip if an IO bit is clear.
    Sbic,
    /// Skip if an IO bit is set.
    Sbis,
    /// Subtract immediate from a register pair.
    Sbiw,
    /// Skip if a register bit is clear.
    Sbrc,
    /// Skip if a register bit is set.
    Sbrs,
    /// Enter sleep mode.
    Sleep,
    /// Store to program memory.
    Spm,
    /// Store indirect.
    St,
    /// Store indirect with post-increment.
    StPi,
    /// Store indirect with pre-decrement.
    StPd,
    /// Store indirect with displacement.
    Std,
    /// Store direct to data space.
    Sts,
    /// Subtract without carry.
    Sub,
    /// Subtract immediate.
    Subi,
    /// Swap nibbles.
    Swap,
    /// Reset the watchdog.
    Wdr,
}

/// Fixed properties of an instruction variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrProperties {
    /// Assembly mnemonic.
    pub name: &'static str,
    /// Unique variant identifier (differs from `name` for addressing variants).
    pub variant: &'static str,
    /// Encoded size in bytes.
    pub size: u8,
    /// Cycles consumed when no branch is taken and nothing is skipped.
    pub min_cycles: u8,
}

const fn props(name: &'static str, variant: &'static str, size: u8, min_cycles: u8) -> InstrProperties {
    InstrProperties {
        name,
        variant,
        size,
        min_cycles,
    }
}

/// Single source-of-truth properties table, in `Opcode` declaration order.
pub const OPCODE_TABLE: &[(Opcode, InstrProperties)] = &[
    (Opcode::Adc, props("adc", "adc", 2, 1)),
    (Opcode::Add, props("add", "add", 2, 1)),
    (Opcode::Adiw, props("adiw", "adiw", 2, 2)),
    (Opcode::And, props("and", "and", 2, 1)),
    (Opcode::Andi, props("andi", "andi", 2, 1)),
    (Opcode::Asr, props("asr", "asr", 2, 1)),
    (Opcode::Bclr, props("bclr", "bclr", 2, 1)),
    (Opcode::Bld, props("bld", "bld", 2, 1)),
    (Opcode::Brbc, props("brbc", "brbc", 2, 1)),
    (Opcode::Brbs, props("brbs", "brbs", 2, 1)),
    (Opcode::Break, props("break", "break", 2, 1)),
    (Opcode::Bset, props("bset", "bset", 2, 1)),
    (Opcode::Bst, props("bst", "bst", 2, 1)),
    (Opcode::Call, props("call", "call", 4, 4)),
    (Opcode::Cbi, props("cbi", "cbi", 2, 2)),
    (Opcode::Com, props("com", "com", 2, 1)),
    (Opcode::Cp, props("cp", "cp", 2, 1)),
    (Opcode::Cpc, props("cpc", "cpc", 2, 1)),
    (Opcode::Cpi, props("cpi", "cpi", 2, 1)),
    (Opcode::Cpse, props("cpse", "cpse", 2, 1)),
    (Opcode::Dec, props("dec", "dec", 2, 1)),
    (Opcode::Eicall, props("eicall", "eicall", 2, 4)),
    (Opcode::Eijmp, props("eijmp", "eijmp", 2, 2)),
    (Opcode::Elpm, props("elpm", "elpm", 2, 3)),
    (Opcode::ElpmD, props("elpm", "elpmd", 2, 3)),
    (Opcode::ElpmPi, props("elpm", "elpmpi", 2, 3)),
    (Opcode::Eor, props("eor", "eor", 2, 1)),
    (Opcode::Fmul, props("fmul", "fmul", 2, 2)),
    (Opcode::Fmuls, props("fmuls", "fmuls", 2, 2)),
    (Opcode::Fmulsu, props("fmulsu", "fmulsu", 2, 2)),
    (Opcode::Icall, props("icall", "icall", 2, 3)),
    (Opcode::Ijmp, props("ijmp", "ijmp", 2, 2)),
    (Opcode::In, props("in", "in", 2, 1)),
    (Opcode::Inc, props("inc", "inc", 2, 1)),
    (Opcode::Jmp, props("jmp", "jmp", 4, 3)),
    (Opcode::Ld, props("ld", "ld", 2, 2)),
    (Opcode::LdPi, props("ld", "ldpi", 2, 2)),
    (Opcode::LdPd, props("ld", "ldpd", 2, 2)),
    (Opcode::Ldd, props("ldd", "ldd", 2, 2)),
    (Opcode::Ldi, props("ldi", "ldi", 2, 1)),
    (Opcode::Lds, props("lds", "lds", 4, 2)),
    (Opcode::Lpm, props("lpm", "lpm", 2, 3)),
    (Opcode::LpmD, props("lpm", "lpmd", 2, 3)),
    (Opcode::LpmPi, props("lpm", "lpmpi", 2, 3)),
    (Opcode::Lsr, props("lsr", "lsr", 2, 1)),
    (Opcode::Mov, props("mov", "mov", 2, 1)),
    (Opcode::Movw, props("movw", "movw", 2, 1)),
    (Opcode::Mul, props("mul", "mul", 2, 2)),
    (Opcode::Muls, props("muls", "muls", 2, 2)),
    (Opcode::Mulsu, props("mulsu", "mulsu", 2, 2)),
    (Opcode::Neg, props("neg", "neg", 2, 1)),
    (Opcode::Nop, props("nop", "nop", 2, 1)),
    (Opcode::Or, props("or", "or", 2, 1)),
    (Opcode::Ori, props("ori", "ori", 2, 1)),
    (Opcode::Out, props("out", "out", 2, 1)),
    (Opcode::Pop, props("pop", "pop", 2, 2)),
    (Opcode::Push, props("push", "push", 2, 2)),
    (Opcode::Rcall, props("rcall", "rcall", 2, 3)),
    (Opcode::Ret, props("ret", "ret", 2, 4)),
    (Opcode::Reti, props("reti", "reti", 2, 4)),
    (Opcode::Rjmp, props("rjmp", "rjmp", 2, 2)),
    (Opcode::Ror, props("ror", "ror", 2, 1)),
    (Opcode::Sbc, props("sbc", "sbc", 2, 1)),
    (Opcode::Sbci, props("sbci", "sbci", 2, 1)),
    (Opcode::Sbi, props("sbi", "sbi", 2, 2)),
    (Opcode::Sbic, props("sbic", "sbic", 2, 1)),
    (Opcode::Sbis, props("sbis", "sbis", 2, 1)),
    (Opcode::Sbiw, props("sbiw", "sbiw", 2, 2)),
    (Opcode::Sbrc, props("sbrc", "sbrc", 2, 1)),
    (Opcode::Sbrs, props("sbrs", "sbrs", 2, 1)),
    (Opcode::Sleep, props("sleep", "sleep", 2, 1)),
    (Opcode::Spm, props("spm", "spm", 2, 1)),
    (Opcode::St, props("st", "st", 2, 2)),
    (Opcode::StPi, props("st", "stpi", 2, 2)),
    (Opcode::StPd, props("st", "stpd", 2, 2)),
    (Opcode::Std, props("std", "std", 2, 2)),
    (Opcode::Sts, props("sts", "sts", 4, 2)),
    (Opcode::Sub, props("sub", "sub", 2, 1)),
    (Opcode::Subi, props("subi", "subi", 2, 1)),
    (Opcode::Swap, props("swap", "swap", 2, 1)),
    (Opcode::Wdr, props("wdr", "wdr", 2, 1)),
];

const GPR: Constraint = Constraint::Reg(RegisterSet::Gpr);
const HIGH: Constraint = Constraint::Reg(RegisterSet::High);
const MID: Constraint = Constraint::Reg(RegisterSet::Mid);
const EVEN: Constraint = Constraint::Reg(RegisterSet::Even);
const WIDE: Constraint = Constraint::Reg(RegisterSet::Wide);
const PTR: Constraint = Constraint::Reg(RegisterSet::Pointer);
const ZPTR: Constraint = Constraint::Reg(RegisterSet::PointerZ);

impl Opcode {
    /// Fixed properties for this variant.
    #[must_use]
    pub const fn properties(self) -> &'static InstrProperties {
        &OPCODE_TABLE[self as usize].1
    }

    /// Assembly mnemonic.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.properties().name
    }

    /// Operand constraints in assembly order.
    #[must_use]
    pub const fn signature(self) -> &'static [Constraint] {
        match self {
            Self::Adc
            | Self::Add
            | Self::And
            | Self::Cp
            | Self::Cpc
            | Self::Cpse
            | Self::Eor
            | Self::Mov
            | Self::Mul
            | Self::Or
            | Self::Sbc
            | Self::Sub => &[GPR, GPR],
            Self::Movw => &[EVEN, EVEN],
            Self::Muls => &[HIGH, HIGH],
            Self::Mulsu | Self::Fmul | Self::Fmuls | Self::Fmulsu => &[MID, MID],
            Self::Andi | Self::Cpi | Self::Ldi | Self::Ori | Self::Sbci | Self::Subi => {
                &[HIGH, IMM8]
            }
            Self::Adiw | Self::Sbiw => &[WIDE, IMM6],
            Self::Asr
            | Self::Com
            | Self::Dec
            | Self::Inc
            | Self::Lsr
            | Self::Neg
            | Self::Pop
            | Self::Push
            | Self::Ror
            | Self::Swap => &[GPR],
            Self::Bset | Self::Bclr => &[BIT3],
            Self::Brbs | Self::Brbc => &[BIT3, SREL7],
            Self::Bld | Self::Bst | Self::Sbrc | Self::Sbrs => &[GPR, BIT3],
            Self::Cbi | Self::Sbi | Self::Sbic | Self::Sbis => &[IO5, BIT3],
            Self::In => &[GPR, IO6],
            Self::Out => &[IO6, GPR],
            Self::Call | Self::Jmp => &[PADDR22],
            Self::Rcall | Self::Rjmp => &[LREL12],
            Self::Ld | Self::LdPi | Self::LdPd => &[GPR, PTR],
            Self::St | Self::StPi | Self::StPd => &[PTR, GPR],
            Self::LpmD | Self::LpmPi | Self::ElpmD | Self::ElpmPi => &[GPR, ZPTR],
            Self::Ldd => &[GPR, DISP6],
            Self::Std => &[DISP6, GPR],
            Self::Lds => &[GPR, DADDR16],
            Self::Sts => &[DADDR16, GPR],
            Self::Break
            | Self::Eicall
            | Self::Eijmp
            | Self::Elpm
            | Self::Icall
            | Self::Ijmp
            | Self::Lpm
            | Self::Nop
            | Self::Ret
            | Self::Reti
            | Self::Sleep
            | Self::Spm
            | Self::Wdr => &[],
        }
    }

    /// True when the destination appears after the source in assembly syntax.
    #[must_use]
    pub const fn is_store_order(self) -> bool {
        matches!(
            self,
            Self::St | Self::StPi | Self::StPd | Self::Std | Self::Sts | Self::Out
        )
    }

    /// True for compare-and-skip and bit-test-and-skip instructions.
    #[must_use]
    pub const fn is_skip(self) -> bool {
        matches!(
            self,
            Self::Cpse | Self::Sbrc | Self::Sbrs | Self::Sbic | Self::Sbis
        )
    }

    /// Looks up an opcode by its unique variant identifier.
    #[must_use]
    pub fn from_variant(variant: &str) -> Option<Self> {
        variant_table().get(variant).copied()
    }

    /// All variants sharing a mnemonic, in declaration order.
    #[must_use]
    pub fn with_name(name: &str) -> Vec<Self> {
        OPCODE_TABLE
            .iter()
            .filter(|(_, props)| props.name == name)
            .map(|(opcode, _)| *opcode)
            .collect()
    }

    /// Every opcode in declaration order.
    pub fn all() -> impl Iterator<Item = Self> {
        OPCODE_TABLE.iter().map(|(opcode, _)| *opcode)
    }
}

fn variant_table() -> &'static HashMap<&'static str, Opcode> {
    static TABLE: OnceLock<HashMap<&'static str, Opcode>> = OnceLock::new();
    TABLE.get_or_init(|| {
        OPCODE_TABLE
            .iter()
            .map(|(opcode, props)| (props.variant, *opcode))
            .collect()
    })
}
