//! Disassembly of flash images.
//!
//! Words that do not decode are listed as `.word 0x....` rows carrying the
//! decoder's diagnostic, so a listing never stops at bad data.

use crate::decoder::{DecodeError, Decoder};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single disassembled instruction row.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisassemblyRow {
    /// Program byte address of the instruction.
    pub address: u32,
    /// Length in bytes (2 or 4).
    pub len_bytes: u8,
    /// Instruction words in program order.
    pub words: Vec<u16>,
    /// Mnemonic, or `.word` for undecodable data.
    pub mnemonic: String,
    /// Formatted operands.
    pub operands: String,
    /// Why the word did not decode, for `.word` rows.
    pub diagnostic: Option<String>,
}

impl DisassemblyRow {
    /// True for rows that did not decode.
    #[must_use]
    pub const fn is_illegal(&self) -> bool {
        self.diagnostic.is_some()
    }

    /// Assembly text of the row.
    #[must_use]
    pub fn text(&self) -> String {
        if self.operands.is_empty() {
            self.mnemonic.clone()
        } else {
            format!("{} {}", self.mnemonic, self.operands)
        }
    }
}

fn word_at(flash: &[u8], address: u32) -> Option<u16> {
    let at = usize::try_from(address).ok()?;
    let low = *flash.get(at)?;
    let high = *flash.get(at.checked_add(1)?)?;
    Some(u16::from_le_bytes([low, high]))
}

/// Disassembles the instruction at `address`, or `None` past the end of `flash`.
#[must_use]
pub fn disassemble_one(address: u32, flash: &[u8]) -> Option<DisassemblyRow> {
    let first = word_at(flash, address)?;
    let at = usize::try_from(address).ok()?;
    match Decoder::decode_checked(0, at, flash) {
        Ok((instruction, size)) => {
            let text = instruction.to_string();
            let (mnemonic, operands) = text.split_once(' ').unwrap_or((text.as_str(), ""));
            let mut words = vec![first];
            if size == 4 {
                words.extend(word_at(flash, address + 2));
            }
            Some(DisassemblyRow {
                address,
                len_bytes: size,
                words,
                mnemonic: mnemonic.to_owned(),
                operands: operands.to_owned(),
                diagnostic: None,
            })
        }
        Err(error) => Some(illegal_row(address, first, &error)),
    }
}

fn illegal_row(address: u32, word: u16, error: &DecodeError) -> DisassemblyRow {
    DisassemblyRow {
        address,
        len_bytes: 2,
        words: vec![word],
        mnemonic: ".word".to_owned(),
        operands: format!("0x{word:04x}"),
        diagnostic: Some(error.to_string()),
    }
}

/// Linear listing of `flash[start..end]`.
#[must_use]
pub fn disassemble_range(flash: &[u8], start: u32, end: u32) -> Vec<DisassemblyRow> {
    let mut rows = Vec::new();
    let mut address = start;
    while address < end {
        let Some(row) = disassemble_one(address, flash) else {
            break;
        };
        address += u32::from(row.len_bytes);
        rows.push(row);
    }
    rows
}

/// Disassembles up to `before` rows ahead of `center`, the row at `center` and
/// up to `after` rows following it.
///
/// Walking backward is ambiguous because a two-word instruction's second word
/// may itself decode. The walk prefers a 4-byte instruction ending exactly at
/// the current row and falls back to a 2-byte one.
#[must_use]
pub fn disassemble_window(
    center: u32,
    before: usize,
    after: usize,
    flash: &[u8],
) -> Vec<DisassemblyRow> {
    let mut backward = Vec::with_capacity(before);
    let mut scan = center;
    while backward.len() < before && scan >= 2 {
        let candidate = [4u32, 2].into_iter().filter(|len| scan >= *len).find_map(|len| {
            disassemble_one(scan - len, flash).filter(|row| u32::from(row.len_bytes) == len)
        });
        let Some(row) = candidate else {
            break;
        };
        scan = row.address;
        backward.push(row);
    }
    backward.reverse();

    let mut rows = backward;
    let mut address = center;
    for _ in 0..=after {
        let Some(row) = disassemble_one(address, flash) else {
            break;
        };
        address += u32::from(row.len_bytes);
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::{disassemble_one, disassemble_range, disassemble_window};

    const BLINK: [u8; 12] = [
        0x0F, 0xEF, // ldi r16, 0xFF
        0x07, 0xBB, // out 0x17, r16
        0x0C, 0x94, 0x00, 0x00, // jmp 0x0
        0x00, 0x00, // nop
        0xFF, 0xFF, // erased
    ];

    #[test]
    fn add_disassembles_with_operands() {
        let row = disassemble_one(0, &[0x12, 0x0C]).expect("row");
        assert_eq!(row.mnemonic, "add");
        assert_eq!(row.operands, "r1, r2");
        assert_eq!(row.len_bytes, 2);
        assert_eq!(row.text(), "add r1, r2");
    }

    #[test]
    fn two_word_instructions_carry_both_words() {
        let row = disassemble_one(4, &BLINK).expect("row");
        assert_eq!(row.mnemonic, "jmp");
        assert_eq!(row.words, vec![0x940C, 0x0000]);
        assert_eq!(row.len_bytes, 4);
    }

    #[test]
    fn illegal_words_become_data_rows() {
        let row = disassemble_one(10, &BLINK).expect("row");
        assert!(row.is_illegal());
        assert_eq!(row.text(), ".word 0xffff");
        assert!(disassemble_one(12, &BLINK).is_none());
    }

    #[test]
    fn range_listing_covers_the_image() {
        let rows = disassemble_range(&BLINK, 0, 12);
        let addresses: Vec<u32> = rows.iter().map(|row| row.address).collect();
        assert_eq!(addresses, vec![0, 2, 4, 8, 10]);
    }

    #[test]
    fn window_walks_back_over_two_word_instructions() {
        let rows = disassemble_window(8, 2, 1, &BLINK);
        let addresses: Vec<u32> = rows.iter().map(|row| row.address).collect();
        assert_eq!(addresses, vec![2, 4, 8, 10]);
    }
}
