//! Bit-pattern table that both decision trees are built from.

use super::modes::AddrMode;
use crate::isa::Opcode;

/// One encoding pattern: a word matches when `word & mask == value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    /// Operation identity.
    pub opcode: Opcode,
    /// Fixed-bit mask.
    pub mask: u16,
    /// Fixed-bit values.
    pub value: u16,
    /// Operand reader.
    pub mode: AddrMode,
}

impl Pattern {
    /// True when `word` carries this pattern's fixed bits.
    #[must_use]
    pub const fn matches(&self, word: u16) -> bool {
        word & self.mask == self.value
    }

    /// Number of fixed bits; overlapping patterns resolve to the larger count.
    #[must_use]
    pub const fn specificity(&self) -> u32 {
        self.mask.count_ones()
    }
}

const fn p(opcode: Opcode, mask: u16, value: u16, mode: AddrMode) -> Pattern {
    Pattern {
        opcode,
        mask,
        value,
        mode,
    }
}

use AddrMode as M;
use Opcode as O;

/// Every legal first-word encoding.
pub const PATTERNS: &[Pattern] = &[
    p(O::Nop, 0xFFFF, 0x0000, M::Implied),
    p(O::Movw, 0xFF00, 0x0100, M::EvenPair),
    p(O::Muls, 0xFF00, 0x0200, M::HighPair),
    p(O::Mulsu, 0xFF88, 0x0300, M::MidPair),
    p(O::Fmul, 0xFF88, 0x0308, M::MidPair),
    p(O::Fmuls, 0xFF88, 0x0380, M::MidPair),
    p(O::Fmulsu, 0xFF88, 0x0388, M::MidPair),
    p(O::Cpc, 0xFC00, 0x0400, M::RegReg),
    p(O::Sbc, 0xFC00, 0x0800, M::RegReg),
    p(O::Add, 0xFC00, 0x0C00, M::RegReg),
    p(O::Cpse, 0xFC00, 0x1000, M::RegReg),
    p(O::Cp, 0xFC00, 0x1400, M::RegReg),
    p(O::Sub, 0xFC00, 0x1800, M::RegReg),
    p(O::Adc, 0xFC00, 0x1C00, M::RegReg),
    p(O::And, 0xFC00, 0x2000, M::RegReg),
    p(O::Eor, 0xFC00, 0x2400, M::RegReg),
    p(O::Or, 0xFC00, 0x2800, M::RegReg),
    p(O::Mov, 0xFC00, 0x2C00, M::RegReg),
    p(O::Cpi, 0xF000, 0x3000, M::RegImm),
    p(O::Sbci, 0xF000, 0x4000, M::RegImm),
    p(O::Subi, 0xF000, 0x5000, M::RegImm),
    p(O::Ori, 0xF000, 0x6000, M::RegImm),
    p(O::Andi, 0xF000, 0x7000, M::RegImm),
    p(O::Ldd, 0xD200, 0x8000, M::RegDisp),
    p(O::Std, 0xD200, 0x8200, M::DispReg),
    p(O::Ld, 0xFE0F, 0x8000, M::RegPtr),
    p(O::Ld, 0xFE0F, 0x8008, M::RegPtr),
    p(O::St, 0xFE0F, 0x8200, M::PtrReg),
    p(O::St, 0xFE0F, 0x8208, M::PtrReg),
    p(O::Lds, 0xFE0F, 0x9000, M::RegAddr),
    p(O::LdPi, 0xFE0F, 0x9001, M::RegPtr),
    p(O::LdPd, 0xFE0F, 0x9002, M::RegPtr),
    p(O::LpmD, 0xFE0F, 0x9004, M::RegPtr),
    p(O::LpmPi, 0xFE0F, 0x9005, M::RegPtr),
    p(O::ElpmD, 0xFE0F, 0x9006, M::RegPtr),
    p(O::ElpmPi, 0xFE0F, 0x9007, M::RegPtr),
    p(O::LdPi, 0xFE0F, 0x9009, M::RegPtr),
    p(O::LdPd, 0xFE0F, 0x900A, M::RegPtr),
    p(O::Ld, 0xFE0F, 0x900C, M::RegPtr),
    p(O::LdPi, 0xFE0F, 0x900D, M::RegPtr),
    p(O::LdPd, 0xFE0F, 0x900E, M::RegPtr),
    p(O::Pop, 0xFE0F, 0x900F, M::Reg),
    p(O::Sts, 0xFE0F, 0x9200, M::AddrReg),
    p(O::StPi, 0xFE0F, 0x9201, M::PtrReg),
    p(O::StPd, 0xFE0F, 0x9202, M::PtrReg),
    p(O::StPi, 0xFE0F, 0x9209, M::PtrReg),
    p(O::StPd, 0xFE0F, 0x920A, M::PtrReg),
    p(O::St, 0xFE0F, 0x920C, M::PtrReg),
    p(O::StPi, 0xFE0F, 0x920D, M::PtrReg),
    p(O::StPd, 0xFE0F, 0x920E, M::PtrReg),
    p(O::Push, 0xFE0F, 0x920F, M::Reg),
    p(O::Com, 0xFE0F, 0x9400, M::Reg),
    p(O::Neg, 0xFE0F, 0x9401, M::Reg),
    p(O::Swap, 0xFE0F, 0x9402, M::Reg),
    p(O::Inc, 0xFE0F, 0x9403, M::Reg),
    p(O::Asr, 0xFE0F, 0x9405, M::Reg),
    p(O::Lsr, 0xFE0F, 0x9406, M::Reg),
    p(O::Ror, 0xFE0F, 0x9407, M::Reg),
    p(O::Dec, 0xFE0F, 0x940A, M::Reg),
    p(O::Bset, 0xFF8F, 0x9408, M::Flag),
    p(O::Bclr, 0xFF8F, 0x9488, M::Flag),
    p(O::Ijmp, 0xFFFF, 0x9409, M::Implied),
    p(O::Eijmp, 0xFFFF, 0x9419, M::Implied),
    p(O::Jmp, 0xFE0E, 0x940C, M::Abs),
    p(O::Call, 0xFE0E, 0x940E, M::Abs),
    p(O::Ret, 0xFFFF, 0x9508, M::Implied),
    p(O::Icall, 0xFFFF, 0x9509, M::Implied),
    p(O::Reti, 0xFFFF, 0x9518, M::Implied),
    p(O::Eicall, 0xFFFF, 0x9519, M::Implied),
    p(O::Sleep, 0xFFFF, 0x9588, M::Implied),
    p(O::Break, 0xFFFF, 0x9598, M::Implied),
    p(O::Wdr, 0xFFFF, 0x95A8, M::Implied),
    p(O::Lpm, 0xFFFF, 0x95C8, M::Implied),
    p(O::Elpm, 0xFFFF, 0x95D8, M::Implied),
    p(O::Spm, 0xFFFF, 0x95E8, M::Implied),
    p(O::Adiw, 0xFF00, 0x9600, M::WideImm),
    p(O::Sbiw, 0xFF00, 0x9700, M::WideImm),
    p(O::Cbi, 0xFF00, 0x9800, M::IoBit),
    p(O::Sbic, 0xFF00, 0x9900, M::IoBit),
    p(O::Sbi, 0xFF00, 0x9A00, M::IoBit),
    p(O::Sbis, 0xFF00, 0x9B00, M::IoBit),
    p(O::Mul, 0xFC00, 0x9C00, M::RegReg),
    p(O::In, 0xF800, 0xB000, M::RegIo),
    p(O::Out, 0xF800, 0xB800, M::IoReg),
    p(O::Rjmp, 0xF000, 0xC000, M::Rel),
    p(O::Rcall, 0xF000, 0xD000, M::Rel),
    p(O::Ldi, 0xF000, 0xE000, M::RegImm),
    p(O::Brbs, 0xFC00, 0xF000, M::FlagRel),
    p(O::Brbc, 0xFC00, 0xF400, M::FlagRel),
    p(O::Bld, 0xFE08, 0xF800, M::RegBit),
    p(O::Bst, 0xFE08, 0xFA00, M::RegBit),
    p(O::Sbrc, 0xFE08, 0xFC00, M::RegBit),
    p(O::Sbrs, 0xFE08, 0xFE00, M::RegBit),
];

/// Most specific pattern matching `word`.
#[must_use]
pub fn winner(word: u16) -> Option<&'static Pattern> {
    PATTERNS
        .iter()
        .filter(|pattern| pattern.matches(word))
        .max_by_key(|pattern| pattern.specificity())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{winner, PATTERNS};
    use crate::isa::Opcode;

    #[test]
    fn every_opcode_has_a_pattern() {
        let covered: HashSet<_> = PATTERNS.iter().map(|p| p.opcode).collect();
        for opcode in Opcode::all() {
            assert!(covered.contains(&opcode), "{opcode:?} has no pattern");
        }
    }

    #[test]
    fn pattern_values_only_use_masked_bits() {
        for pattern in PATTERNS {
            assert_eq!(pattern.value & !pattern.mask, 0, "{pattern:?}");
        }
    }

    #[test]
    fn overlapping_patterns_never_tie() {
        for word in 0..=u16::MAX {
            let matching: Vec<_> = PATTERNS.iter().filter(|p| p.matches(word)).collect();
            if let Some(best) = winner(word) {
                let ties = matching
                    .iter()
                    .filter(|p| p.specificity() == best.specificity())
                    .count();
                assert_eq!(ties, 1, "word {word:#06x} is ambiguous");
            }
        }
    }

    #[test]
    fn zero_displacement_resolves_to_plain_pointer_form() {
        assert_eq!(winner(0x8008).map(|p| p.opcode), Some(Opcode::Ld));
        assert_eq!(winner(0x8009).map(|p| p.opcode), Some(Opcode::Ldd));
        assert_eq!(winner(0x8200).map(|p| p.opcode), Some(Opcode::St));
        assert_eq!(winner(0xA000).map(|p| p.opcode), Some(Opcode::Ldd));
    }

    #[test]
    fn reserved_words_match_nothing() {
        for word in [0x0001, 0x9003, 0x9008, 0x940B, 0x9528, 0x95F8, 0xF808] {
            assert!(winner(word).is_none(), "{word:#06x} should be reserved");
        }
    }
}
