//! Decoder coverage over the whole 16-bit opcode space.

#![allow(clippy::pedantic, clippy::nursery, clippy::cast_possible_truncation)]

use proptest::prelude::*;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use sim_core::isa::{relative_target, Rel};
use sim_core::{Decoder, Encoding, Instruction};
use thiserror as _;
use tracing as _;

const OPERAND_WORD: u16 = 0x1234;

fn buffer(word: u16) -> [u8; 4] {
    let [a, b] = word.to_le_bytes();
    let [c, d] = OPERAND_WORD.to_le_bytes();
    [a, b, c, d]
}

#[test]
fn every_decodable_word_encodes_back_to_itself() {
    let mut decoded = 0u32;
    for word in 0..=u16::MAX {
        let Some((instruction, size)) = Decoder::decode(0, 0, &buffer(word)) else {
            continue;
        };
        decoded += 1;
        assert_eq!(size, Decoder::instruction_size(word), "{word:#06x} size");
        assert_eq!(size, instruction.size(), "{word:#06x} table size");
        let encoding = instruction.encode();
        assert_eq!(encoding.first(), word, "{word:#06x} re-encodes as {instruction}");
        assert_eq!(encoding.len_bytes(), size);
        if let Encoding::Double(_, second) = encoding {
            assert_eq!(second, OPERAND_WORD, "{word:#06x} operand word");
        }
    }
    // Most of the space is populated, so a broken tree shows up here too.
    assert!(decoded > 60_000, "only {decoded} words decoded");
}

#[test]
fn reserved_words_do_not_decode() {
    for word in [0xFFFF, 0x0001, 0x9003, 0x9008, 0x940B, 0x9528, 0x95F8, 0xF808] {
        assert!(Decoder::decode(0, 0, &buffer(word)).is_none(), "{word:#06x}");
    }
}

#[test]
fn two_word_instructions_need_both_words() {
    // jmp, call, lds, sts
    for word in [0x940C_u16, 0x940E, 0x9000, 0x9200] {
        let [low, high] = word.to_le_bytes();
        assert!(Decoder::decode(0, 0, &[low, high]).is_none());
        assert_eq!(Decoder::instruction_size(word), 4);
    }
}

proptest! {
    #[test]
    fn decode_is_total_and_sizes_agree(bytes in any::<[u8; 4]>(), base in 0u32..0x1_0000) {
        let base = base & !1;
        if let Some((instruction, size)) = Decoder::decode(base, 0, &bytes) {
            let word = u16::from_le_bytes([bytes[0], bytes[1]]);
            prop_assert!(size == 2 || size == 4);
            prop_assert_eq!(size, Decoder::instruction_size(word));
            prop_assert_eq!(instruction.encode().first(), word);
        }
    }

    #[test]
    fn relative_jumps_resolve_against_their_own_address(
        k in 0u16..0x1000,
        base in 0u32..0x8000,
        index in 0usize..4,
    ) {
        let base = base & !1;
        let mut image = vec![0u8; 10];
        let [low, high] = (0xC000 | k).to_le_bytes();
        image[index * 2] = low;
        image[index * 2 + 1] = high;
        let (instruction, _) = Decoder::decode(base, index * 2, &image).expect("rjmp decodes");
        let offset = ((k << 4) as i16) >> 4;
        let address = base + (index as u32) * 2;
        prop_assert_eq!(
            instruction,
            Instruction::Rjmp(Rel { offset, target: relative_target(address, offset) })
        );
    }
}
