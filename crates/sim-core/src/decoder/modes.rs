//! Addressing-mode readers: materialize operands from the matched instruction words.

use super::{DecodeError, DecodeState};
use crate::isa::{Operand, OperandList, Register};

/// How the operand fields of a matched pattern are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrMode {
    /// No operands.
    Implied,
    /// `Rd` (bits 8..4) and `Rr` (bit 9, bits 3..0).
    RegReg,
    /// Even register pairs (`movw`).
    EvenPair,
    /// `r16..r31` pairs (`muls`).
    HighPair,
    /// `r16..r23` pairs (`mulsu`, `fmul*`).
    MidPair,
    /// `r16..r31` and an 8-bit constant.
    RegImm,
    /// `r24..r30` pair and a 6-bit constant.
    WideImm,
    /// One 5-bit register.
    Reg,
    /// Register and pointer (`ld`, `lpm`, `elpm`).
    RegPtr,
    /// Pointer and register (`st`).
    PtrReg,
    /// Register and `Y`/`Z` displacement (`ldd`).
    RegDisp,
    /// `Y`/`Z` displacement and register (`std`).
    DispReg,
    /// Register and data address from the second word (`lds`).
    RegAddr,
    /// Data address from the second word and register (`sts`).
    AddrReg,
    /// 22-bit program address spread over both words.
    Abs,
    /// 12-bit signed displacement.
    Rel,
    /// Status bit and 7-bit signed displacement.
    FlagRel,
    /// Status bit.
    Flag,
    /// Register and bit.
    RegBit,
    /// Low IO register and bit.
    IoBit,
    /// Register and IO address.
    RegIo,
    /// IO address and register.
    IoReg,
}

fn gpr(state: &DecodeState<'_>, number: u16) -> Result<Register, DecodeError> {
    u8::try_from(number)
        .ok()
        .and_then(Register::gpr)
        .ok_or(DecodeError::NoMatch { word: state.word })
}

fn rd5(state: &DecodeState<'_>) -> Result<Operand, DecodeError> {
    gpr(state, (state.word >> 4) & 0x1F).map(Operand::Register)
}

fn rr5(state: &DecodeState<'_>) -> Result<Operand, DecodeError> {
    let word = state.word;
    gpr(state, ((word >> 5) & 0x10) | (word & 0x0F)).map(Operand::Register)
}

fn imm(value: u16) -> Operand {
    Operand::Immediate(i32::from(value))
}

fn sign_extend(raw: u16, bits: u32) -> i16 {
    let sign = 1u16 << (bits - 1);
    let value = i32::from(raw & ((sign << 1) - 1));
    let signed = if raw & sign != 0 {
        value - (1 << bits)
    } else {
        value
    };
    // Bounded by `bits` (at most 12), always fits.
    i16::try_from(signed).unwrap_or_default()
}

/// Pointer register selected by the low nibble of `ld`/`st` forms.
fn pointer(word: u16) -> Register {
    if word & 0x1000 == 0 {
        // `ldd`/`std` family with zero displacement.
        return if word & 0x0008 == 0 {
            Register::Z
        } else {
            Register::Y
        };
    }
    match word & 0x000F {
        0x9 | 0xA => Register::Y,
        0xC..=0xE => Register::X,
        _ => Register::Z,
    }
}

fn displacement(word: u16) -> Operand {
    let q = ((word >> 8) & 0x20) | ((word >> 7) & 0x18) | (word & 0x07);
    Operand::Indexed {
        base: if word & 0x0008 == 0 {
            Register::Z
        } else {
            Register::Y
        },
        offset: (q & 0x3F).to_le_bytes()[0],
    }
}

impl AddrMode {
    /// True when the mode consumes a second instruction word.
    #[must_use]
    pub const fn is_two_word(self) -> bool {
        matches!(self, Self::RegAddr | Self::AddrReg | Self::Abs)
    }

    /// Materializes operands in assembly order, reading further words as needed.
    pub(crate) fn read(self, state: &mut DecodeState<'_>) -> Result<OperandList, DecodeError> {
        let word = state.word;
        let list = match self {
            Self::Implied => OperandList::new(),
            Self::RegReg => OperandList::two(rd5(state)?, rr5(state)?),
            Self::EvenPair => OperandList::two(
                Operand::Register(gpr(state, ((word >> 4) & 0x0F) * 2)?),
                Operand::Register(gpr(state, (word & 0x0F) * 2)?),
            ),
            Self::HighPair => OperandList::two(
                Operand::Register(gpr(state, 16 + ((word >> 4) & 0x0F))?),
                Operand::Register(gpr(state, 16 + (word & 0x0F))?),
            ),
            Self::MidPair => OperandList::two(
                Operand::Register(gpr(state, 16 + ((word >> 4) & 0x07))?),
                Operand::Register(gpr(state, 16 + (word & 0x07))?),
            ),
            Self::RegImm => OperandList::two(
                Operand::Register(gpr(state, 16 + ((word >> 4) & 0x0F))?),
                imm(((word >> 4) & 0xF0) | (word & 0x0F)),
            ),
            Self::WideImm => OperandList::two(
                Operand::Register(gpr(state, 24 + ((word >> 4) & 0x03) * 2)?),
                imm(((word >> 2) & 0x30) | (word & 0x0F)),
            ),
            Self::Reg => OperandList::one(rd5(state)?),
            Self::RegPtr => {
                OperandList::two(rd5(state)?, Operand::Register(pointer(word)))
            }
            Self::PtrReg => {
                OperandList::two(Operand::Register(pointer(word)), rd5(state)?)
            }
            Self::RegDisp => OperandList::two(rd5(state)?, displacement(word)),
            Self::DispReg => OperandList::two(displacement(word), rd5(state)?),
            Self::RegAddr => {
                let reg = rd5(state)?;
                let address = state.next_word()?;
                OperandList::two(reg, Operand::Address(address.into()))
            }
            Self::AddrReg => {
                let reg = rd5(state)?;
                let address = state.next_word()?;
                OperandList::two(Operand::Address(address.into()), reg)
            }
            Self::Abs => {
                let high = (u32::from((word >> 4) & 0x1F) << 17) | (u32::from(word & 0x1) << 16);
                let low = state.next_word()?;
                OperandList::one(Operand::Address(high | u32::from(low)))
            }
            Self::Rel => OperandList::one(Operand::Relative(sign_extend(word & 0x0FFF, 12))),
            Self::FlagRel => OperandList::two(
                imm(word & 0x07),
                Operand::Relative(sign_extend((word >> 3) & 0x7F, 7)),
            ),
            Self::Flag => OperandList::one(imm((word >> 4) & 0x07)),
            Self::RegBit => OperandList::two(rd5(state)?, imm(word & 0x07)),
            Self::IoBit => OperandList::two(imm((word >> 3) & 0x1F), imm(word & 0x07)),
            Self::RegIo => OperandList::two(rd5(state)?, imm(((word >> 5) & 0x30) | (word & 0x0F))),
            Self::IoReg => OperandList::two(imm(((word >> 5) & 0x30) | (word & 0x0F)), rd5(state)?),
        };
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::{displacement, pointer, sign_extend};
    use crate::isa::{Operand, Register};

    #[test]
    fn sign_extension_covers_both_widths() {
        assert_eq!(sign_extend(0x7F, 7), -1);
        assert_eq!(sign_extend(0x40, 7), -64);
        assert_eq!(sign_extend(0x3F, 7), 63);
        assert_eq!(sign_extend(0xFFF, 12), -1);
        assert_eq!(sign_extend(0x800, 12), -2048);
        assert_eq!(sign_extend(0x7FF, 12), 2047);
    }

    #[test]
    fn pointer_selection_follows_low_nibble() {
        assert_eq!(pointer(0x900C), Register::X);
        assert_eq!(pointer(0x900D), Register::X);
        assert_eq!(pointer(0x9009), Register::Y);
        assert_eq!(pointer(0x9001), Register::Z);
        assert_eq!(pointer(0x9005), Register::Z);
        assert_eq!(pointer(0x8008), Register::Y);
        assert_eq!(pointer(0x8000), Register::Z);
    }

    #[test]
    fn displacement_gathers_scattered_bits() {
        assert_eq!(
            displacement(0xAC0F),
            Operand::Indexed {
                base: Register::Y,
                offset: 63
            }
        );
        assert_eq!(
            displacement(0x8001),
            Operand::Indexed {
                base: Register::Z,
                offset: 1
            }
        );
    }
}
