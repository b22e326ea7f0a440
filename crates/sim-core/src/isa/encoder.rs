//! Instruction encoder, the inverse of the decoder.

use super::instruction::{
    Abs, Flag, FlagRel, Instruction, IoBit, OneReg, RegAddr, RegBit, RegImm, RegIndexed, RegIo,
    RegPtr, RegReg, Rel,
};
use super::registers::Register;

/// Encoded instruction words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// One 16-bit word.
    Single(u16),
    /// Opcode word followed by an operand word.
    Double(u16, u16),
}

impl Encoding {
    /// First (opcode) word.
    #[must_use]
    pub const fn first(self) -> u16 {
        match self {
            Self::Single(word) | Self::Double(word, _) => word,
        }
    }

    /// Encoded length in bytes.
    #[must_use]
    pub const fn len_bytes(self) -> u8 {
        match self {
            Self::Single(_) => 2,
            Self::Double(..) => 4,
        }
    }

    /// Little-endian program-memory image.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        match self {
            Self::Single(word) => word.to_le_bytes().to_vec(),
            Self::Double(first, second) => {
                let mut bytes = first.to_le_bytes().to_vec();
                bytes.extend_from_slice(&second.to_le_bytes());
                bytes
            }
        }
    }
}

fn n(reg: Register) -> u16 {
    u16::from(reg.number())
}

fn rd5(reg: Register) -> u16 {
    (n(reg) & 0x1F) << 4
}

fn rr5(reg: Register) -> u16 {
    ((n(reg) & 0x10) << 5) | (n(reg) & 0x0F)
}

fn reg_reg(base: u16, form: RegReg) -> u16 {
    base | rd5(form.rd) | rr5(form.rr)
}

fn reg_imm(base: u16, form: RegImm) -> u16 {
    let k = u16::from(form.k);
    base | ((k & 0xF0) << 4) | ((n(form.rd) - 16) << 4) | (k & 0x0F)
}

fn wide_imm(base: u16, form: RegImm) -> u16 {
    let k = u16::from(form.k);
    base | ((k & 0x30) << 2) | (((n(form.rd) - 24) / 2) << 4) | (k & 0x0F)
}

fn mid(base: u16, form: RegReg) -> u16 {
    base | (((n(form.rd) - 16) & 0x7) << 4) | ((n(form.rr) - 16) & 0x7)
}

fn one(base: u16, form: OneReg) -> u16 {
    base | rd5(form.rd)
}

fn reg_bit(base: u16, form: RegBit) -> u16 {
    base | rd5(form.reg) | u16::from(form.bit & 0x7)
}

fn io_bit(base: u16, form: IoBit) -> u16 {
    base | (u16::from(form.io & 0x1F) << 3) | u16::from(form.bit & 0x7)
}

fn reg_io(base: u16, form: RegIo) -> u16 {
    let a = u16::from(form.io);
    base | ((a & 0x30) << 5) | rd5(form.reg) | (a & 0x0F)
}

fn flag(base: u16, form: Flag) -> u16 {
    base | (u16::from(form.flag & 0x7) << 4)
}

#[allow(clippy::cast_sign_loss)]
fn flag_rel(base: u16, form: FlagRel) -> u16 {
    base | (((form.offset as u16) & 0x7F) << 3) | u16::from(form.flag & 0x7)
}

#[allow(clippy::cast_sign_loss)]
fn rel(base: u16, form: Rel) -> u16 {
    base | ((form.offset as u16) & 0x0FFF)
}

#[allow(clippy::cast_possible_truncation)]
fn abs(base: u16, form: Abs) -> Encoding {
    let k = form.address;
    let high = (((k >> 17) & 0x1F) << 4) | ((k >> 16) & 0x1);
    Encoding::Double(base | (high as u16), (k & 0xFFFF) as u16)
}

/// Pointer-mode selector bits for `ld`/`st` (X, Y, Z columns).
fn pointer(form: RegPtr, x: u16, y: u16, z: u16) -> u16 {
    let low = match form.ptr {
        Register::X => x,
        Register::Y => y,
        _ => z,
    };
    low | rd5(form.reg)
}

fn indexed(base: u16, form: RegIndexed) -> u16 {
    let q = u16::from(form.offset);
    let y = if form.base == Register::Y { 0x0008 } else { 0 };
    base | ((q & 0x20) << 8) | ((q & 0x18) << 7) | (q & 0x07) | y | rd5(form.reg)
}

fn reg_addr(base: u16, form: RegAddr) -> Encoding {
    Encoding::Double(base | rd5(form.reg), form.address)
}

impl Instruction {
    /// Encodes this instruction into its canonical machine words.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn encode(&self) -> Encoding {
        let word = match *self {
            Self::Adc(f) => reg_reg(0x1C00, f),
            Self::Add(f) => reg_reg(0x0C00, f),
            Self::Adiw(f) => wide_imm(0x9600, f),
            Self::And(f) => reg_reg(0x2000, f),
            Self::Andi(f) => reg_imm(0x7000, f),
            Self::Asr(f) => one(0x9405, f),
            Self::Bclr(f) => flag(0x9488, f),
            Self::Bld(f) => reg_bit(0xF800, f),
            Self::Brbc(f) => flag_rel(0xF400, f),
            Self::Brbs(f) => flag_rel(0xF000, f),
            Self::Break => 0x9598,
            Self::Bset(f) => flag(0x9408, f),
            Self::Bst(f) => reg_bit(0xFA00, f),
            Self::Call(f) => return abs(0x940E, f),
            Self::Cbi(f) => io_bit(0x9800, f),
            Self::Com(f) => one(0x9400, f),
            Self::Cp(f) => reg_reg(0x1400, f),
            Self::Cpc(f) => reg_reg(0x0400, f),
            Self::Cpi(f) => reg_imm(0x3000, f),
            Self::Cpse(f) => reg_reg(0x1000, f),
            Self::Dec(f) => one(0x940A, f),
            Self::Eicall => 0x9519,
            Self::Eijmp => 0x9419,
            Self::Elpm => 0x95D8,
            Self::ElpmD(f) => pointer(f, 0, 0, 0x9006),
            Self::ElpmPi(f) => pointer(f, 0, 0, 0x9007),
            Self::Eor(f) => reg_reg(0x2400, f),
            Self::Fmul(f) => mid(0x0308, f),
            Self::Fmuls(f) => mid(0x0380, f),
            Self::Fmulsu(f) => mid(0x0388, f),
            Self::Icall => 0x9509,
            Self::Ijmp => 0x9409,
            Self::In(f) => reg_io(0xB000, f),
            Self::Inc(f) => one(0x9403, f),
            Self::Jmp(f) => return abs(0x940C, f),
            Self::Ld(f) => pointer(f, 0x900C, 0x8008, 0x8000),
            Self::LdPi(f) => pointer(f, 0x900D, 0x9009, 0x9001),
            Self::LdPd(f) => pointer(f, 0x900E, 0x900A, 0x9002),
            Self::Ldd(f) => indexed(0x8000, f),
            Self::Ldi(f) => reg_imm(0xE000, f),
            Self::Lds(f) => return reg_addr(0x9000, f),
            Self::Lpm => 0x95C8,
            Self::LpmD(f) => pointer(f, 0, 0, 0x9004),
            Self::LpmPi(f) => pointer(f, 0, 0, 0x9005),
            Self::Lsr(f) => one(0x9406, f),
            Self::Mov(f) => reg_reg(0x2C00, f),
            Self::Movw(f) => 0x0100 | ((n(f.rd) / 2) << 4) | (n(f.rr) / 2),
            Self::Mul(f) => reg_reg(0x9C00, f),
            Self::Muls(f) => 0x0200 | ((n(f.rd) - 16) << 4) | (n(f.rr) - 16),
            Self::Mulsu(f) => mid(0x0300, f),
            Self::Neg(f) => one(0x9401, f),
            Self::Nop => 0x0000,
            Self::Or(f) => reg_reg(0x2800, f),
            Self::Ori(f) => reg_imm(0x6000, f),
            Self::Out(f) => reg_io(0xB800, f),
            Self::Pop(f) => one(0x900F, f),
            Self::Push(f) => one(0x920F, f),
            Self::Rcall(f) => rel(0xD000, f),
            Self::Ret => 0x9508,
            Self::Reti => 0x9518,
            Self::Rjmp(f) => rel(0xC000, f),
            Self::Ror(f) => one(0x9407, f),
            Self::Sbc(f) => reg_reg(0x0800, f),
            Self::Sbci(f) => reg_imm(0x4000, f),
            Self::Sbi(f) => io_bit(0x9A00, f),
            Self::Sbic(f) => io_bit(0x9900, f),
            Self::Sbis(f) => io_bit(0x9B00, f),
            Self::Sbiw(f) => wide_imm(0x9700, f),
            Self::Sbrc(f) => reg_bit(0xFC00, f),
            Self::Sbrs(f) => reg_bit(0xFE00, f),
            Self::Sleep => 0x9588,
            Self::Spm => 0x95E8,
            Self::St(f) => pointer(f, 0x920C, 0x8208, 0x8200),
            Self::StPi(f) => pointer(f, 0x920D, 0x9209, 0x9201),
            Self::StPd(f) => pointer(f, 0x920E, 0x920A, 0x9202),
            Self::Std(f) => indexed(0x8200, f),
            Self::Sts(f) => return reg_addr(0x9200, f),
            Self::Sub(f) => reg_reg(0x1800, f),
            Self::Subi(f) => reg_imm(0x5000, f),
            Self::Swap(f) => one(0x9402, f),
            Self::Wdr => 0x95A8,
        };
        Encoding::Single(word)
    }
}
