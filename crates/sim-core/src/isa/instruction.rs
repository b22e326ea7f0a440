//! Immutable decoded instructions.
//!
//! [`Instruction`] is a closed sum type: each variant carries only the operand form
//! its semantics need. Forms expose their operands through the [`UnaryOperand`] and
//! [`BinaryOperands`] capability traits, so shared logic (listing, display,
//! construction) never inspects individual variants.

use std::fmt;

use super::opcode::{InstrProperties, Opcode};
use super::operand::{Constraint, Operand, OperandError, OperandKind, OperandList};
use super::registers::Register;

/// Capability of forms that take exactly one operand.
pub trait UnaryOperand {
    /// The operand.
    fn operand(&self) -> Operand;
}

/// Capability of forms that take two operands, in field order (destination first).
pub trait BinaryOperands {
    /// The operands.
    fn operands(&self) -> (Operand, Operand);
}

/// Two registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegReg {
    /// Destination (and first source).
    pub rd: Register,
    /// Second source.
    pub rr: Register,
}

/// Register and 8-bit (or 6-bit) constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegImm {
    /// Destination.
    pub rd: Register,
    /// Constant.
    pub k: u8,
}

/// One register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OneReg {
    /// Operand register.
    pub rd: Register,
}

/// Register and bit number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegBit {
    /// Register.
    pub reg: Register,
    /// Bit number.
    pub bit: u8,
}

/// IO register and bit number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoBit {
    /// IO address (0..31).
    pub io: u8,
    /// Bit number.
    pub bit: u8,
}

/// Register and IO address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegIo {
    /// Register.
    pub reg: Register,
    /// IO address (0..63).
    pub io: u8,
}

/// Register and pointer register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegPtr {
    /// Data register.
    pub reg: Register,
    /// Pointer register.
    pub ptr: Register,
}

/// Register and pointer-plus-displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegIndexed {
    /// Data register.
    pub reg: Register,
    /// Pointer register (`Y` or `Z`).
    pub base: Register,
    /// Displacement (0..63).
    pub offset: u8,
}

/// Register and 16-bit data address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegAddr {
    /// Data register.
    pub reg: Register,
    /// Data-space byte address.
    pub address: u16,
}

/// Absolute program target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Abs {
    /// Program word address (22 bits).
    pub address: u32,
}

impl Abs {
    /// Target as a program byte address.
    #[must_use]
    pub const fn target(&self) -> u32 {
        self.address << 1
    }
}

/// Relative program target, resolved against the instruction address at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rel {
    /// Displacement in words.
    pub offset: i16,
    /// Resolved target byte address.
    pub target: u32,
}

/// Status-flag conditional relative branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlagRel {
    /// Status register bit tested.
    pub flag: u8,
    /// Displacement in words.
    pub offset: i16,
    /// Resolved target byte address.
    pub target: u32,
}

/// Status register bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flag {
    /// Status register bit number.
    pub flag: u8,
}

impl BinaryOperands for RegReg {
    fn operands(&self) -> (Operand, Operand) {
        (Operand::Register(self.rd), Operand::Register(self.rr))
    }
}

impl BinaryOperands for RegImm {
    fn operands(&self) -> (Operand, Operand) {
        (Operand::Register(self.rd), Operand::Immediate(self.k.into()))
    }
}

impl BinaryOperands for RegBit {
    fn operands(&self) -> (Operand, Operand) {
        (Operand::Register(self.reg), Operand::Immediate(self.bit.into()))
    }
}

impl BinaryOperands for IoBit {
    fn operands(&self) -> (Operand, Operand) {
        (
            Operand::Immediate(self.io.into()),
            Operand::Immediate(self.bit.into()),
        )
    }
}

impl BinaryOperands for RegIo {
    fn operands(&self) -> (Operand, Operand) {
        (Operand::Register(self.reg), Operand::Immediate(self.io.into()))
    }
}

impl BinaryOperands for RegPtr {
    fn operands(&self) -> (Operand, Operand) {
        (Operand::Register(self.reg), Operand::Register(self.ptr))
    }
}

impl BinaryOperands for RegIndexed {
    fn operands(&self) -> (Operand, Operand) {
        (
            Operand::Register(self.reg),
            Operand::Indexed {
                base: self.base,
                offset: self.offset,
            },
        )
    }
}

impl BinaryOperands for RegAddr {
    fn operands(&self) -> (Operand, Operand) {
        (
            Operand::Register(self.reg),
            Operand::Address(self.address.into()),
        )
    }
}

impl BinaryOperands for FlagRel {
    fn operands(&self) -> (Operand, Operand) {
        (
            Operand::Immediate(self.flag.into()),
            Operand::Relative(self.offset),
        )
    }
}

impl UnaryOperand for OneReg {
    fn operand(&self) -> Operand {
        Operand::Register(self.rd)
    }
}

impl UnaryOperand for Abs {
    fn operand(&self) -> Operand {
        Operand::Address(self.address)
    }
}

impl UnaryOperand for Rel {
    fn operand(&self) -> Operand {
        Operand::Relative(self.offset)
    }
}

impl UnaryOperand for Flag {
    fn operand(&self) -> Operand {
        Operand::Immediate(self.flag.into())
    }
}

fn unary(form: &impl UnaryOperand) -> OperandList {
    OperandList::one(form.operand())
}

fn binary(form: &impl BinaryOperands) -> OperandList {
    let (a, b) = form.operands();
    OperandList::two(a, b)
}

macro_rules! instruction_set {
    (@pat $op:ident) => { Self::$op };
    (@pat $op:ident $form:ident) => { Self::$op(_) };
    ($($op:ident $(($form:ident))?),* $(,)?) => {
        /// A decoded, validated instruction.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Instruction {
            $(
                #[doc = concat!("`", stringify!($op), "`")]
                $op $(($form))?,
            )*
        }

        impl Instruction {
            /// Operation identity.
            #[must_use]
            pub const fn opcode(&self) -> Opcode {
                match self {
                    $( instruction_set!(@pat $op $($form)?) => Opcode::$op, )*
                }
            }
        }
    };
}

instruction_set! {
    Adc(RegReg), Add(RegReg), Adiw(RegImm), And(RegReg), Andi(RegImm), Asr(OneReg),
    Bclr(Flag), Bld(RegBit), Brbc(FlagRel), Brbs(FlagRel), Break, Bset(Flag), Bst(RegBit),
    Call(Abs), Cbi(IoBit), Com(OneReg), Cp(RegReg), Cpc(RegReg), Cpi(RegImm), Cpse(RegReg),
    Dec(OneReg), Eicall, Eijmp, Elpm, ElpmD(RegPtr), ElpmPi(RegPtr), Eor(RegReg),
    Fmul(RegReg), Fmuls(RegReg), Fmulsu(RegReg), Icall, Ijmp, In(RegIo), Inc(OneReg),
    Jmp(Abs), Ld(RegPtr), LdPi(RegPtr), LdPd(RegPtr), Ldd(RegIndexed), Ldi(RegImm),
    Lds(RegAddr), Lpm, LpmD(RegPtr), LpmPi(RegPtr), Lsr(OneReg), Mov(RegReg), Movw(RegReg),
    Mul(RegReg), Muls(RegReg), Mulsu(RegReg), Neg(OneReg), Nop, Or(RegReg), Ori(RegImm),
    Out(RegIo), Pop(OneReg), Push(OneReg), Rcall(Rel), Ret, Reti, Rjmp(Rel), Ror(OneReg),
    Sbc(RegReg), Sbci(RegImm), Sbi(IoBit), Sbic(IoBit), Sbis(IoBit), Sbiw(RegImm),
    Sbrc(RegBit), Sbrs(RegBit), Sleep, Spm, St(RegPtr), StPi(RegPtr), StPd(RegPtr),
    Std(RegIndexed), Sts(RegAddr), Sub(RegReg), Subi(RegImm), Swap(OneReg), Wdr,
}

impl Instruction {
    /// Fixed properties of this variant.
    #[must_use]
    pub const fn properties(&self) -> &'static InstrProperties {
        self.opcode().properties()
    }

    /// Encoded size in bytes.
    #[must_use]
    pub const fn size(&self) -> u8 {
        self.properties().size
    }

    /// Minimum cycle count.
    #[must_use]
    pub const fn min_cycles(&self) -> u8 {
        self.properties().min_cycles
    }

    /// Assembly mnemonic.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.properties().name
    }

    /// Operands in assembly order.
    #[must_use]
    pub fn operands(&self) -> OperandList {
        let list = match self {
            Self::Adc(f)
            | Self::Add(f)
            | Self::And(f)
            | Self::Cp(f)
            | Self::Cpc(f)
            | Self::Cpse(f)
            | Self::Eor(f)
            | Self::Fmul(f)
            | Self::Fmuls(f)
            | Self::Fmulsu(f)
            | Self::Mov(f)
            | Self::Movw(f)
            | Self::Mul(f)
            | Self::Muls(f)
            | Self::Mulsu(f)
            | Self::Or(f)
            | Self::Sbc(f)
            | Self::Sub(f) => binary(f),
            Self::Adiw(f)
            | Self::Andi(f)
            | Self::Cpi(f)
            | Self::Ldi(f)
            | Self::Ori(f)
            | Self::Sbci(f)
            | Self::Sbiw(f)
            | Self::Subi(f) => binary(f),
            Self::Asr(f)
            | Self::Com(f)
            | Self::Dec(f)
            | Self::Inc(f)
            | Self::Lsr(f)
            | Self::Neg(f)
            | Self::Pop(f)
            | Self::Push(f)
            | Self::Ror(f)
            | Self::Swap(f) => unary(f),
            Self::Bclr(f) | Self::Bset(f) => unary(f),
            Self::Bld(f) | Self::Bst(f) | Self::Sbrc(f) | Self::Sbrs(f) => binary(f),
            Self::Brbc(f) | Self::Brbs(f) => binary(f),
            Self::Call(f) | Self::Jmp(f) => unary(f),
            Self::Rcall(f) | Self::Rjmp(f) => unary(f),
            Self::Cbi(f) | Self::Sbi(f) | Self::Sbic(f) | Self::Sbis(f) => binary(f),
            Self::In(f) | Self::Out(f) => binary(f),
            Self::ElpmD(f)
            | Self::ElpmPi(f)
            | Self::Ld(f)
            | Self::LdPi(f)
            | Self::LdPd(f)
            | Self::LpmD(f)
            | Self::LpmPi(f)
            | Self::St(f)
            | Self::StPi(f)
            | Self::StPd(f) => binary(f),
            Self::Ldd(f) | Self::Std(f) => binary(f),
            Self::Lds(f) | Self::Sts(f) => binary(f),
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
            | Self::Wdr => OperandList::new(),
        };
        if self.opcode().is_store_order() {
            list.swapped()
        } else {
            list
        }
    }

    /// Resolved branch or jump target for control-flow instructions with a fixed target.
    #[must_use]
    pub const fn static_target(&self) -> Option<u32> {
        match self {
            Self::Rjmp(rel) | Self::Rcall(rel) => Some(rel.target),
            Self::Brbs(branch) | Self::Brbc(branch) => Some(branch.target),
            Self::Jmp(abs) | Self::Call(abs) => Some(abs.target()),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        let operands = self.operands();
        for (index, operand) in operands.iter().enumerate() {
            f.write_str(if index == 0 { " " } else { ", " })?;
            match (self, operand) {
                (Self::LdPi(_) | Self::StPi(_) | Self::LpmPi(_) | Self::ElpmPi(_), Operand::Register(ptr))
                    if ptr.is_pointer() =>
                {
                    write!(f, "{ptr}+")?;
                }
                (Self::LdPd(_) | Self::StPd(_), Operand::Register(ptr)) if ptr.is_pointer() => {
                    write!(f, "-{ptr}")?;
                }
                (Self::Jmp(abs) | Self::Call(abs), _) => write!(f, "0x{:x}", abs.target())?,
                (Self::In(_) | Self::Out(_) | Self::Cbi(_) | Self::Sbi(_) | Self::Sbic(_) | Self::Sbis(_), Operand::Immediate(io))
                    if index == usize::from(matches!(self, Self::In(_))) =>
                {
                    write!(f, "0x{io:02x}")?;
                }
                (Self::Andi(_) | Self::Cpi(_) | Self::Ldi(_) | Self::Ori(_) | Self::Sbci(_) | Self::Subi(_), Operand::Immediate(k)) => {
                    write!(f, "0x{k:02X}")?;
                }
                _ => write!(f, "{operand}")?,
            }
        }
        Ok(())
    }
}

struct Args<'a> {
    opcode: Opcode,
    operands: &'a [Operand],
}

impl Args<'_> {
    /// Assembly-order position of field `index`.
    const fn position(&self, index: usize) -> usize {
        if self.opcode.is_store_order() {
            1 - index
        } else {
            index
        }
    }

    /// Operand in field order (destination first).
    fn field(&self, index: usize) -> Result<Operand, OperandError> {
        self.operands
            .get(self.position(index))
            .copied()
            .ok_or(OperandError::Count {
                expected: self.opcode.signature().len(),
                actual: self.operands.len(),
            })
    }

    fn reg(&self, index: usize) -> Result<Register, OperandError> {
        match self.field(index)? {
            Operand::Register(reg) | Operand::Indexed { base: reg, .. } => Ok(reg),
            other => Err(self.kind_error(index, other)),
        }
    }

    fn byte(&self, index: usize) -> Result<u8, OperandError> {
        match self.field(index)? {
            Operand::Immediate(value) => u8::try_from(value).map_err(|_| OperandError::Range {
                index: self.position(index),
                min: 0,
                max: 255,
                actual: value.into(),
            }),
            Operand::Indexed { offset, .. } => Ok(offset),
            other => Err(self.kind_error(index, other)),
        }
    }

    fn address(&self, index: usize) -> Result<u32, OperandError> {
        match self.field(index)? {
            Operand::Address(address) => Ok(address),
            other => Err(self.kind_error(index, other)),
        }
    }

    fn relative(&self, index: usize) -> Result<i16, OperandError> {
        match self.field(index)? {
            Operand::Relative(words) => Ok(words),
            other => Err(self.kind_error(index, other)),
        }
    }

    fn kind_error(&self, index: usize, actual: Operand) -> OperandError {
        let index = self.position(index);
        let expected = self
            .opcode
            .signature()
            .get(index)
            .map_or(actual.kind(), |constraint| match constraint {
                Constraint::Reg(_) => OperandKind::Register,
                Constraint::Imm { .. } => OperandKind::Immediate,
                Constraint::Indexed { .. } => OperandKind::Indexed,
                Constraint::Address { .. } => OperandKind::Address,
                Constraint::Relative { .. } => OperandKind::Relative,
            });
        OperandError::Kind {
            index,
            expected,
            actual: actual.kind(),
        }
    }

    fn reg_reg(&self) -> Result<RegReg, OperandError> {
        Ok(RegReg {
            rd: self.reg(0)?,
            rr: self.reg(1)?,
        })
    }

    fn reg_imm(&self) -> Result<RegImm, OperandError> {
        Ok(RegImm {
            rd: self.reg(0)?,
            k: self.byte(1)?,
        })
    }

    fn one_reg(&self) -> Result<OneReg, OperandError> {
        Ok(OneReg { rd: self.reg(0)? })
    }

    fn reg_bit(&self) -> Result<RegBit, OperandError> {
        Ok(RegBit {
            reg: self.reg(0)?,
            bit: self.byte(1)?,
        })
    }

    fn io_bit(&self) -> Result<IoBit, OperandError> {
        Ok(IoBit {
            io: self.byte(0)?,
            bit: self.byte(1)?,
        })
    }

    fn reg_io(&self) -> Result<RegIo, OperandError> {
        // `in Rd, A` and `out A, Rr` both normalize to register-first field order.
        Ok(RegIo {
            reg: self.reg(0)?,
            io: self.byte(1)?,
        })
    }

    fn reg_ptr(&self) -> Result<RegPtr, OperandError> {
        Ok(RegPtr {
            reg: self.reg(0)?,
            ptr: self.reg(1)?,
        })
    }

    fn reg_indexed(&self) -> Result<RegIndexed, OperandError> {
        Ok(RegIndexed {
            reg: self.reg(0)?,
            base: self.reg(1)?,
            offset: self.byte(1)?,
        })
    }

    fn reg_addr(&self) -> Result<RegAddr, OperandError> {
        let address = self.address(1)?;
        Ok(RegAddr {
            reg: self.reg(0)?,
            address: u16::try_from(address).map_err(|_| OperandError::Range {
                index: self.position(1),
                min: 0,
                max: 0xFFFF,
                actual: address.into(),
            })?,
        })
    }

    fn abs(&self) -> Result<Abs, OperandError> {
        Ok(Abs {
            address: self.address(0)?,
        })
    }

    fn rel(&self, at: usize, address: u32) -> Result<(i16, u32), OperandError> {
        let offset = self.relative(at)?;
        Ok((offset, relative_target(address, offset)))
    }

    fn flag(&self) -> Result<Flag, OperandError> {
        Ok(Flag {
            flag: self.byte(0)?,
        })
    }

    fn flag_rel(&self, address: u32) -> Result<FlagRel, OperandError> {
        let (offset, target) = self.rel(1, address)?;
        Ok(FlagRel {
            flag: self.byte(0)?,
            offset,
            target,
        })
    }
}

/// Resolves a word displacement against the address of the instruction using it.
#[must_use]
pub const fn relative_target(address: u32, offset: i16) -> u32 {
    address.wrapping_add(2).wrapping_add_signed(2 * offset as i32)
}

impl Opcode {
    /// Builds an instruction located at program byte `address` from operands in
    /// assembly order, validating count, register sets and numeric ranges.
    ///
    /// # Errors
    ///
    /// Returns an [`OperandError`] naming the first offending operand.
    pub fn build(self, operands: &[Operand], address: u32) -> Result<Instruction, OperandError> {
        let signature = self.signature();
        if operands.len() != signature.len() {
            return Err(OperandError::Count {
                expected: signature.len(),
                actual: operands.len(),
            });
        }
        for (index, (constraint, operand)) in signature.iter().zip(operands).enumerate() {
            constraint.check(index, operand)?;
        }

        let args = Args {
            opcode: self,
            operands,
        };
        let instruction = match self {
            Self::Adc => Instruction::Adc(args.reg_reg()?),
            Self::Add => Instruction::Add(args.reg_reg()?),
            Self::Adiw => Instruction::Adiw(args.reg_imm()?),
            Self::And => Instruction::And(args.reg_reg()?),
            Self::Andi => Instruction::Andi(args.reg_imm()?),
            Self::Asr => Instruction::Asr(args.one_reg()?),
            Self::Bclr => Instruction::Bclr(args.flag()?),
            Self::Bld => Instruction::Bld(args.reg_bit()?),
            Self::Brbc => Instruction::Brbc(args.flag_rel(address)?),
            Self::Brbs => Instruction::Brbs(args.flag_rel(address)?),
            Self::Break => Instruction::Break,
            Self::Bset => Instruction::Bset(args.flag()?),
            Self::Bst => Instruction::Bst(args.reg_bit()?),
            Self::Call => Instruction::Call(args.abs()?),
            Self::Cbi => Instruction::Cbi(args.io_bit()?),
            Self::Com => Instruction::Com(args.one_reg()?),
            Self::Cp => Instruction::Cp(args.reg_reg()?),
            Self::Cpc => Instruction::Cpc(args.reg_reg()?),
            Self::Cpi => Instruction::Cpi(args.reg_imm()?),
            Self::Cpse => Instruction::Cpse(args.reg_reg()?),
            Self::Dec => Instruction::Dec(args.one_reg()?),
            Self::Eicall => Instruction::Eicall,
            Self::Eijmp => Instruction::Eijmp,
            Self::Elpm => Instruction::Elpm,
            Self::ElpmD => Instruction::ElpmD(args.reg_ptr()?),
            Self::ElpmPi => Instruction::ElpmPi(args.reg_ptr()?),
            Self::Eor => Instruction::Eor(args.reg_reg()?),
            Self::Fmul => Instruction::Fmul(args.reg_reg()?),
            Self::Fmuls => Instruction::Fmuls(args.reg_reg()?),
            Self::Fmulsu => Instruction::Fmulsu(args.reg_reg()?),
            Self::Icall => Instruction::Icall,
            Self::Ijmp => Instruction::Ijmp,
            Self::In => Instruction::In(args.reg_io()?),
            Self::Inc => Instruction::Inc(args.one_reg()?),
            Self::Jmp => Instruction::Jmp(args.abs()?),
            Self::Ld => Instruction::Ld(args.reg_ptr()?),
            Self::LdPi => Instruction::LdPi(args.reg_ptr()?),
            Self::LdPd => Instruction::LdPd(args.reg_ptr()?),
            Self::Ldd => Instruction::Ldd(args.reg_indexed()?),
            Self::Ldi => Instruction::Ldi(args.reg_imm()?),
            Self::Lds => Instruction::Lds(args.reg_addr()?),
            Self::Lpm => Instruction::Lpm,
            Self::LpmD => Instruction::LpmD(args.reg_ptr()?),
            Self::LpmPi => Instruction::LpmPi(args.reg_ptr()?),
            Self::Lsr => Instruction::Lsr(args.one_reg()?),
            Self::Mov => Instruction::Mov(args.reg_reg()?),
            Self::Movw => Instruction::Movw(args.reg_reg()?),
            Self::Mul => Instruction::Mul(args.reg_reg()?),
            Self::Muls => Instruction::Muls(args.reg_reg()?),
            Self::Mulsu => Instruction::Mulsu(args.reg_reg()?),
            Self::Neg => Instruction::Neg(args.one_reg()?),
            Self::Nop => Instruction::Nop,
            Self::Or => Instruction::Or(args.reg_reg()?),
            Self::Ori => Instruction::Ori(args.reg_imm()?),
            Self::Out => Instruction::Out(args.reg_io()?),
            Self::Pop => Instruction::Pop(args.one_reg()?),
            Self::Push => Instruction::Push(args.one_reg()?),
            Self::Rcall => {
                let (offset, target) = args.rel(0, address)?;
                Instruction::Rcall(Rel { offset, target })
            }
            Self::Ret => Instruction::Ret,
            Self::Reti => Instruction::Reti,
            Self::Rjmp => {
                let (offset, target) = args.rel(0, address)?;
                Instruction::Rjmp(Rel { offset, target })
            }
            Self::Ror => Instruction::Ror(args.one_reg()?),
            Self::Sbc => Instruction::Sbc(args.reg_reg()?),
            Self::Sbci => Instruction::Sbci(args.reg_imm()?),
            Self::Sbi => Instruction::Sbi(args.io_bit()?),
            Self::Sbic => Instruction::Sbic(args.io_bit()?),
            Self::Sbis => Instruction::Sbis(args.io_bit()?),
            Self::Sbiw => Instruction::Sbiw(args.reg_imm()?),
            Self::Sbrc => Instruction::Sbrc(args.reg_bit()?),
            Self::Sbrs => Instruction::Sbrs(args.reg_bit()?),
            Self::Sleep => Instruction::Sleep,
            Self::Spm => Instruction::Spm,
            Self::St => Instruction::St(args.reg_ptr()?),
            Self::StPi => Instruction::StPi(args.reg_ptr()?),
            Self::StPd => Instruction::StPd(args.reg_ptr()?),
            Self::Std => Instruction::Std(args.reg_indexed()?),
            Self::Sts => Instruction::Sts(args.reg_addr()?),
            Self::Sub => Instruction::Sub(args.reg_reg()?),
            Self::Subi => Instruction::Subi(args.reg_imm()?),
            Self::Swap => Instruction::Swap(args.one_reg()?),
            Self::Wdr => Instruction::Wdr,
        };
        Ok(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::registers::RegisterSet;

    fn r(n: u8) -> Operand {
        Operand::Register(Register::gpr(n).expect("valid register"))
    }

    #[test]
    fn build_add_and_list_operands() {
        let instr = Opcode::Add.build(&[r(1), r(2)], 0).expect("valid add");
        assert_eq!(instr.opcode(), Opcode::Add);
        assert_eq!(instr.size(), 2);
        assert_eq!(instr.min_cycles(), 1);
        assert_eq!(instr.operands().to_vec(), vec![r(1), r(2)]);
        assert_eq!(instr.to_string(), "add r1, r2");
    }

    #[test]
    fn wrong_operand_count_is_rejected() {
        assert_eq!(
            Opcode::Add.build(&[r(1)], 0),
            Err(OperandError::Count {
                expected: 2,
                actual: 1
            })
        );
        assert!(Opcode::Nop.build(&[r(1)], 0).is_err());
    }

    #[test]
    fn immediate_forms_require_high_registers() {
        let err = Opcode::Ldi
            .build(&[r(15), Operand::Immediate(1)], 0)
            .expect_err("r15 is not a high register");
        assert!(matches!(
            err,
            OperandError::Register {
                index: 0,
                expected: RegisterSet::High,
                ..
            }
        ));
    }

    #[test]
    fn out_of_range_immediate_is_not_clamped() {
        let err = Opcode::Adiw
            .build(&[r(24), Operand::Immediate(64)], 0)
            .expect_err("adiw takes six bits");
        assert_eq!(
            err,
            OperandError::Range {
                index: 1,
                min: 0,
                max: 63,
                actual: 64
            }
        );
    }

    #[test]
    fn store_order_operands_are_kept_in_assembly_order() {
        let instr = Opcode::Std
            .build(
                &[
                    Operand::Indexed {
                        base: Register::Y,
                        offset: 3,
                    },
                    r(4),
                ],
                0,
            )
            .expect("valid std");
        assert!(matches!(
            instr,
            Instruction::Std(RegIndexed {
                base: Register::Y,
                offset: 3,
                ..
            })
        ));
        assert_eq!(instr.to_string(), "std Y+3, r4");

        let out = Opcode::Out
            .build(&[Operand::Immediate(0x3F), r(0)], 0)
            .expect("valid out");
        assert_eq!(out.to_string(), "out 0x3f, r0");
    }

    #[test]
    fn relative_targets_resolve_against_instruction_address() {
        let rjmp = Opcode::Rjmp
            .build(&[Operand::Relative(-1)], 0x100)
            .expect("valid rjmp");
        assert_eq!(rjmp.static_target(), Some(0x100));
        let branch = Opcode::Brbs
            .build(&[Operand::Immediate(1), Operand::Relative(5)], 0x20)
            .expect("valid brbs");
        assert_eq!(branch.static_target(), Some(0x20 + 2 + 10));
        assert_eq!(branch.to_string(), "brbs 1, .+10");
    }

    #[test]
    fn pointer_forms_display_increment_and_decrement() {
        let ld = Opcode::LdPi
            .build(&[r(0), Operand::Register(Register::X)], 0)
            .expect("valid ld");
        assert_eq!(ld.to_string(), "ld r0, X+");
        let st = Opcode::StPd
            .build(&[Operand::Register(Register::Y), r(5)], 0)
            .expect("valid st");
        assert_eq!(st.to_string(), "st -Y, r5");
    }

    #[test]
    fn kind_errors_name_the_expected_kind() {
        let err = Opcode::Jmp
            .build(&[Operand::Relative(1)], 0)
            .expect_err("jmp takes an address");
        assert!(matches!(
            err,
            OperandError::Kind {
                index: 0,
                expected: OperandKind::Address,
                actual: OperandKind::Relative
            }
        ));
    }

    #[test]
    fn store_order_field_errors_use_assembly_positions() {
        let sts = Args {
            opcode: Opcode::Sts,
            operands: &[r(3), r(4)],
        };
        assert_eq!(
            sts.address(1),
            Err(OperandError::Kind {
                index: 0,
                expected: OperandKind::Address,
                actual: OperandKind::Register
            })
        );
        let out = Args {
            opcode: Opcode::Out,
            operands: &[Operand::Immediate(0x10), Operand::Immediate(0x20)],
        };
        assert_eq!(
            out.reg(0),
            Err(OperandError::Kind {
                index: 1,
                expected: OperandKind::Register,
                actual: OperandKind::Immediate
            })
        );
        let lds = Args {
            opcode: Opcode::Lds,
            operands: &[r(3), Operand::Register(Register::X)],
        };
        assert_eq!(
            lds.address(1),
            Err(OperandError::Kind {
                index: 1,
                expected: OperandKind::Address,
                actual: OperandKind::Register
            })
        );
    }

    #[test]
    fn every_opcode_reports_the_properties_it_was_built_from() {
        for opcode in Opcode::all() {
            assert_eq!(opcode.properties().name, opcode.name());
        }
    }
}
