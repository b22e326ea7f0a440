//! Register identities and the register-set constraints used to validate operands.

use std::fmt;

/// Number of general-purpose registers (`r0..r31`).
pub const GENERAL_REGISTER_COUNT: usize = 32;

/// A named, numbered storage location with a fixed bit width.
///
/// `r0..r31` are 8 bits wide. The pointer registers `X`, `Y` and `Z` are 16-bit
/// views over the register pairs starting at `r26`, `r28` and `r30`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Register {
    number: u8,
    wide: bool,
}

impl Register {
    /// Pointer register `X` (`r27:r26`).
    pub const X: Self = Self::pointer(26);
    /// Pointer register `Y` (`r29:r28`).
    pub const Y: Self = Self::pointer(28);
    /// Pointer register `Z` (`r31:r30`).
    pub const Z: Self = Self::pointer(30);
    /// `r0`, implicit destination of `lpm`, `elpm` and the multiply family.
    pub const R0: Self = Self {
        number: 0,
        wide: false,
    };
    /// `r1`, high byte of multiply results.
    pub const R1: Self = Self {
        number: 1,
        wide: false,
    };

    const fn pointer(number: u8) -> Self {
        Self { number, wide: true }
    }

    /// Returns general-purpose register `r{number}`, if it exists.
    #[must_use]
    pub const fn gpr(number: u8) -> Option<Self> {
        if (number as usize) < GENERAL_REGISTER_COUNT {
            Some(Self {
                number,
                wide: false,
            })
        } else {
            None
        }
    }

    /// Register number; for pointer registers this is the low byte's number.
    #[must_use]
    pub const fn number(self) -> u8 {
        self.number
    }

    /// Array index into the register file.
    #[must_use]
    pub const fn index(self) -> usize {
        self.number as usize
    }

    /// Width in bits.
    #[must_use]
    pub const fn width(self) -> u8 {
        if self.wide {
            16
        } else {
            8
        }
    }

    /// True for `X`, `Y` and `Z`.
    #[must_use]
    pub const fn is_pointer(self) -> bool {
        self.wide
    }

    /// Assembly name of the register.
    #[must_use]
    pub fn name(self) -> String {
        match (self.wide, self.number) {
            (true, 26) => "X".to_string(),
            (true, 28) => "Y".to_string(),
            (true, 30) => "Z".to_string(),
            (_, n) => format!("r{n}"),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Closed membership constraint over registers, fixed per instruction variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RegisterSet {
    /// Any of `r0..r31`.
    Gpr,
    /// Upper half `r16..r31` (immediate forms).
    High,
    /// `r16..r23` (signed/fractional multiply forms).
    Mid,
    /// Even registers, naming the low half of a pair (`movw`).
    Even,
    /// `r24`, `r26`, `r28`, `r30` (`adiw`/`sbiw`).
    Wide,
    /// Pointer registers `X`, `Y`, `Z`.
    Pointer,
    /// Pointer registers `Y`, `Z` (displacement forms).
    PointerYz,
    /// Pointer register `Z` only (program memory forms).
    PointerZ,
}

impl RegisterSet {
    /// Returns true if `reg` belongs to this set.
    #[must_use]
    pub const fn contains(self, reg: Register) -> bool {
        let n = reg.number;
        match self {
            Self::Gpr => !reg.wide,
            Self::High => !reg.wide && n >= 16,
            Self::Mid => !reg.wide && n >= 16 && n <= 23,
            Self::Even => !reg.wide && n % 2 == 0,
            Self::Wide => !reg.wide && n >= 24 && n % 2 == 0,
            Self::Pointer => reg.wide,
            Self::PointerYz => reg.wide && n >= 28,
            Self::PointerZ => reg.wide && n == 30,
        }
    }

    /// Short name used in operand diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gpr => "r0..r31",
            Self::High => "r16..r31",
            Self::Mid => "r16..r23",
            Self::Even => "even r0..r30",
            Self::Wide => "r24/r26/r28/r30",
            Self::Pointer => "X/Y/Z",
            Self::PointerYz => "Y/Z",
            Self::PointerZ => "Z",
        }
    }
}

impl fmt::Display for RegisterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::{Register, RegisterSet};
    use rstest::rstest;

    fn r(n: u8) -> Register {
        Register::gpr(n).expect("valid register")
    }

    #[test]
    fn gpr_rejects_out_of_range_numbers() {
        assert!(Register::gpr(31).is_some());
        assert!(Register::gpr(32).is_none());
    }

    #[test]
    fn pointer_registers_are_wide_views() {
        assert_eq!(Register::X.number(), 26);
        assert_eq!(Register::Z.width(), 16);
        assert_ne!(Register::X, r(26));
        assert_eq!(Register::Y.to_string(), "Y");
        assert_eq!(r(7).to_string(), "r7");
    }

    #[rstest]
    #[case(RegisterSet::High, 15, false)]
    #[case(RegisterSet::High, 16, true)]
    #[case(RegisterSet::Mid, 23, true)]
    #[case(RegisterSet::Mid, 24, false)]
    #[case(RegisterSet::Even, 3, false)]
    #[case(RegisterSet::Even, 30, true)]
    #[case(RegisterSet::Wide, 22, false)]
    #[case(RegisterSet::Wide, 26, true)]
    #[case(RegisterSet::Wide, 27, false)]
    fn gpr_membership(#[case] set: RegisterSet, #[case] number: u8, #[case] member: bool) {
        assert_eq!(set.contains(r(number)), member);
    }

    #[test]
    fn pointer_sets_exclude_plain_registers() {
        assert!(RegisterSet::Pointer.contains(Register::X));
        assert!(!RegisterSet::Pointer.contains(r(26)));
        assert!(!RegisterSet::PointerYz.contains(Register::X));
        assert!(RegisterSet::PointerYz.contains(Register::Y));
        assert!(RegisterSet::PointerZ.contains(Register::Z));
        assert!(!RegisterSet::Gpr.contains(Register::Z));
    }
}
