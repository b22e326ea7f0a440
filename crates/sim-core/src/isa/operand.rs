//! Operand values and the constraints that validate them at construction time.

use std::fmt;

use thiserror::Error;

use super::registers::{Register, RegisterSet};

/// A resolved instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Operand {
    /// Register reference.
    Register(Register),
    /// Immediate integer (constants, bit numbers, IO addresses).
    Immediate(i32),
    /// Indexed memory reference: pointer register plus unsigned displacement.
    Indexed {
        /// Pointer register.
        base: Register,
        /// Displacement in bytes.
        offset: u8,
    },
    /// Absolute address. Program targets are word addresses, data targets byte addresses.
    Address(u32),
    /// PC-relative displacement in words.
    Relative(i16),
}

impl Operand {
    /// Kind tag used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> OperandKind {
        match self {
            Self::Register(_) => OperandKind::Register,
            Self::Immediate(_) => OperandKind::Immediate,
            Self::Indexed { .. } => OperandKind::Indexed,
            Self::Address(_) => OperandKind::Address,
            Self::Relative(_) => OperandKind::Relative,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(reg) => write!(f, "{reg}"),
            Self::Immediate(value) => write!(f, "{value}"),
            Self::Indexed { base, offset } => write!(f, "{base}+{offset}"),
            Self::Address(address) => write!(f, "0x{address:04x}"),
            Self::Relative(words) => write!(f, ".{:+}", i32::from(*words) * 2),
        }
    }
}

/// Operand kind tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum OperandKind {
    /// General purpose register or register pair.
    Register,
    /// Immediate value, bit number or IO address.
    Immediate,
    /// Pointer register with displacement.
    Indexed,
    /// Absolute data or program address.
    Address,
    /// PC-relative word offset.
    Relative,
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Register => "register",
            Self::Immediate => "immediate",
            Self::Indexed => "indexed reference",
            Self::Address => "address",
            Self::Relative => "relative target",
        };
        f.write_str(name)
    }
}

/// Violation found while constructing an instruction from operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OperandError {
    /// Wrong number of operands.
    #[error("expected {expected} operands, got {actual}")]
    Count {
        /// Operand count the variant takes.
        expected: usize,
        /// Operand count supplied.
        actual: usize,
    },
    /// Operand of the wrong kind.
    #[error("operand {index}: expected {expected}, got {actual}")]
    Kind {
        /// Zero-based operand index.
        index: usize,
        /// Kind the variant requires.
        expected: OperandKind,
        /// Kind supplied.
        actual: OperandKind,
    },
    /// Register outside the variant's register set.
    #[error("operand {index}: register {actual} is not in {expected}")]
    Register {
        /// Zero-based operand index.
        index: usize,
        /// Required register set.
        expected: RegisterSet,
        /// Register supplied.
        actual: Register,
    },
    /// Numeric value outside the variant's bounds.
    #[error("operand {index}: value {actual} is outside {min}..={max}")]
    Range {
        /// Zero-based operand index.
        index: usize,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
        /// Value supplied.
        actual: i64,
    },
}

/// Legality constraint for one operand position of an instruction variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Register from a set.
    Reg(RegisterSet),
    /// Immediate within inclusive bounds.
    Imm {
        /// Inclusive lower bound.
        min: i32,
        /// Inclusive upper bound.
        max: i32,
    },
    /// Pointer plus displacement.
    Indexed {
        /// Allowed base registers.
        set: RegisterSet,
        /// Largest displacement.
        max_offset: u8,
    },
    /// Absolute address up to `max`.
    Address {
        /// Largest address.
        max: u32,
    },
    /// Relative displacement in words within inclusive bounds.
    Relative {
        /// Inclusive lower bound.
        min: i16,
        /// Inclusive upper bound.
        max: i16,
    },
}

/// Unsigned 8-bit constant.
pub const IMM8: Constraint = Constraint::Imm { min: 0, max: 255 };
/// Unsigned 6-bit constant (`adiw`/`sbiw`).
pub const IMM6: Constraint = Constraint::Imm { min: 0, max: 63 };
/// Bit-addressable IO register (`cbi`/`sbi`/`sbic`/`sbis`).
pub const IO5: Constraint = Constraint::Imm { min: 0, max: 31 };
/// IO register (`in`/`out`).
pub const IO6: Constraint = Constraint::Imm { min: 0, max: 63 };
/// Bit number.
pub const BIT3: Constraint = Constraint::Imm { min: 0, max: 7 };
/// Conditional branch displacement.
pub const SREL7: Constraint = Constraint::Relative { min: -64, max: 63 };
/// `rjmp`/`rcall` displacement.
pub const LREL12: Constraint = Constraint::Relative {
    min: -2048,
    max: 2047,
};
/// 22-bit program word address.
pub const PADDR22: Constraint = Constraint::Address { max: 0x3F_FFFF };
/// 16-bit data address.
pub const DADDR16: Constraint = Constraint::Address { max: 0xFFFF };
/// `ldd`/`std` displacement form.
pub const DISP6: Constraint = Constraint::Indexed {
    set: RegisterSet::PointerYz,
    max_offset: 63,
};

impl Constraint {
    /// Checks `operand` at position `index` against this constraint.
    ///
    /// # Errors
    ///
    /// Returns the first violated property of the operand.
    pub fn check(self, index: usize, operand: &Operand) -> Result<(), OperandError> {
        let kind_error = |expected| OperandError::Kind {
            index,
            expected,
            actual: operand.kind(),
        };
        match (self, *operand) {
            (Self::Reg(set), Operand::Register(reg)) => {
                if set.contains(reg) {
                    Ok(())
                } else {
                    Err(OperandError::Register {
                        index,
                        expected: set,
                        actual: reg,
                    })
                }
            }
            (Self::Imm { min, max }, Operand::Immediate(value)) => {
                range(index, i64::from(min), i64::from(max), i64::from(value))
            }
            (Self::Indexed { set, max_offset }, Operand::Indexed { base, offset }) => {
                if !set.contains(base) {
                    return Err(OperandError::Register {
                        index,
                        expected: set,
                        actual: base,
                    });
                }
                range(index, 0, i64::from(max_offset), i64::from(offset))
            }
            (Self::Address { max }, Operand::Address(address)) => {
                range(index, 0, i64::from(max), i64::from(address))
            }
            (Self::Relative { min, max }, Operand::Relative(words)) => {
                range(index, i64::from(min), i64::from(max), i64::from(words))
            }
            (Self::Reg(_), _) => Err(kind_error(OperandKind::Register)),
            (Self::Imm { .. }, _) => Err(kind_error(OperandKind::Immediate)),
            (Self::Indexed { .. }, _) => Err(kind_error(OperandKind::Indexed)),
            (Self::Address { .. }, _) => Err(kind_error(OperandKind::Address)),
            (Self::Relative { .. }, _) => Err(kind_error(OperandKind::Relative)),
        }
    }
}

const fn range(index: usize, min: i64, max: i64, actual: i64) -> Result<(), OperandError> {
    if actual >= min && actual <= max {
        Ok(())
    } else {
        Err(OperandError::Range {
            index,
            min,
            max,
            actual,
        })
    }
}

/// Inline list of up to two operands in assembly order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperandList {
    items: [Option<Operand>; 2],
    len: usize,
}

impl OperandList {
    /// Empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: [None, None],
            len: 0,
        }
    }

    /// One-operand list.
    #[must_use]
    pub const fn one(a: Operand) -> Self {
        Self {
            items: [Some(a), None],
            len: 1,
        }
    }

    /// Two-operand list.
    #[must_use]
    pub const fn two(a: Operand, b: Operand) -> Self {
        Self {
            items: [Some(a), Some(b)],
            len: 2,
        }
    }

    /// Number of operands.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when the instruction takes no operands.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Operand at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Operand> {
        self.items.get(index).copied().flatten()
    }

    /// Operands as an owned vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Operand> {
        self.iter().copied().collect()
    }

    /// Iterates the operands in order.
    pub fn iter(&self) -> impl Iterator<Item = &Operand> {
        self.items.iter().take(self.len).flatten()
    }

    /// Swaps the two operands (store-order instructions).
    #[must_use]
    pub const fn swapped(self) -> Self {
        match self.items {
            [Some(a), Some(b)] => Self::two(b, a),
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: u8) -> Register {
        Register::gpr(n).expect("valid register")
    }

    #[test]
    fn register_constraint_names_the_violated_set() {
        let err = Constraint::Reg(RegisterSet::High)
            .check(0, &Operand::Register(r(3)))
            .expect_err("r3 is not a high register");
        assert_eq!(
            err,
            OperandError::Register {
                index: 0,
                expected: RegisterSet::High,
                actual: r(3)
            }
        );
        assert_eq!(err.to_string(), "operand 0: register r3 is not in r16..r31");
    }

    #[test]
    fn immediate_bounds_are_inclusive() {
        assert!(IMM8.check(1, &Operand::Immediate(255)).is_ok());
        assert!(IMM8.check(1, &Operand::Immediate(0)).is_ok());
        assert_eq!(
            IMM8.check(1, &Operand::Immediate(256)),
            Err(OperandError::Range {
                index: 1,
                min: 0,
                max: 255,
                actual: 256
            })
        );
        assert!(IMM8.check(1, &Operand::Immediate(-1)).is_err());
    }

    #[test]
    fn relative_bounds_are_signed() {
        assert!(SREL7.check(0, &Operand::Relative(-64)).is_ok());
        assert!(SREL7.check(0, &Operand::Relative(63)).is_ok());
        assert!(SREL7.check(0, &Operand::Relative(64)).is_err());
        assert!(LREL12.check(0, &Operand::Relative(-2048)).is_ok());
        assert!(LREL12.check(0, &Operand::Relative(2048)).is_err());
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let err = IMM8
            .check(1, &Operand::Register(r(1)))
            .expect_err("register is not an immediate");
        assert!(matches!(
            err,
            OperandError::Kind {
                index: 1,
                expected: OperandKind::Immediate,
                actual: OperandKind::Register
            }
        ));
    }

    #[test]
    fn indexed_checks_base_then_offset() {
        let bad_base = Operand::Indexed {
            base: Register::X,
            offset: 1,
        };
        assert!(matches!(
            DISP6.check(1, &bad_base),
            Err(OperandError::Register { .. })
        ));
        let bad_offset = Operand::Indexed {
            base: Register::Y,
            offset: 64,
        };
        assert!(matches!(
            DISP6.check(1, &bad_offset),
            Err(OperandError::Range { actual: 64, .. })
        ));
    }

    #[test]
    fn operand_display_matches_assembly_syntax() {
        assert_eq!(Operand::Register(Register::Z).to_string(), "Z");
        assert_eq!(
            Operand::Indexed {
                base: Register::Y,
                offset: 5
            }
            .to_string(),
            "Y+5"
        );
        assert_eq!(Operand::Relative(-3).to_string(), ".-6");
        assert_eq!(Operand::Relative(2).to_string(), ".+4");
    }

    #[test]
    fn operand_list_swaps_pairs() {
        let list = OperandList::two(Operand::Immediate(1), Operand::Immediate(2)).swapped();
        assert_eq!(
            list.to_vec(),
            vec![Operand::Immediate(2), Operand::Immediate(1)]
        );
        assert_eq!(OperandList::new().len(), 0);
    }
}
