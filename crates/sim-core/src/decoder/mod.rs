//! Instruction decoder.
//!
//! Decoding walks two decision trees in lockstep over the same instruction
//! word: the identity tree yields the [`Opcode`], the mode tree yields the
//! [`AddrMode`] that reads the operands. Each tree parks on its shared loop
//! node once it has bound an action; decoding ends when both have terminated.
//! Any walk that reaches the error node rejects the word.

pub mod modes;
pub mod patterns;
pub mod tree;

use std::sync::OnceLock;

use thiserror::Error;

pub use modes::AddrMode;
pub use patterns::{winner, Pattern, PATTERNS};
pub use tree::{DecisionTree, NodeIndex, Visit, Window, ERROR, LOOP, SCHEDULE};

use crate::isa::{Instruction, Opcode, OperandError};

/// Why a byte sequence failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The instruction runs past the end of the buffer.
    #[error("instruction at buffer index {index} is truncated")]
    Truncated {
        /// Buffer index of the missing word.
        index: usize,
    },
    /// No legal instruction matches the word.
    #[error("word {word:#06x} is not a legal instruction")]
    NoMatch {
        /// First instruction word.
        word: u16,
    },
    /// Operands read from the encoding failed validation.
    #[error(transparent)]
    Operand(#[from] OperandError),
}

/// Mutable cursor over the buffer for one decode.
#[derive(Debug)]
pub(crate) struct DecodeState<'a> {
    buffer: &'a [u8],
    index: usize,
    /// Program byte address of the instruction.
    address: u32,
    /// First instruction word.
    pub(crate) word: u16,
    /// Bytes consumed so far.
    size: u8,
    terminated: u8,
}

impl<'a> DecodeState<'a> {
    fn new(base_address: u32, index: usize, buffer: &'a [u8]) -> Result<Self, DecodeError> {
        let mut state = Self {
            buffer,
            index,
            address: base_address.wrapping_add(u32::try_from(index).unwrap_or(u32::MAX)),
            word: 0,
            size: 0,
            terminated: 0,
        };
        state.word = state.next_word()?;
        Ok(state)
    }

    /// Reads the next little-endian word and extends the instruction by it.
    pub(crate) fn next_word(&mut self) -> Result<u16, DecodeError> {
        let at = self.index + usize::from(self.size);
        match self.buffer.get(at..at + 2) {
            Some(&[low, high]) => {
                self.size += 2;
                Ok(u16::from_le_bytes([low, high]))
            }
            _ => Err(DecodeError::Truncated { index: at }),
        }
    }
}

struct Trees {
    identity: DecisionTree<Opcode>,
    modes: DecisionTree<AddrMode>,
}

impl Trees {
    fn build() -> Self {
        let winners: Vec<Option<&Pattern>> = (0..=u16::MAX).map(winner).collect();
        let identity: Vec<Option<Opcode>> = winners.iter().map(|p| p.map(|p| p.opcode)).collect();
        let modes: Vec<Option<AddrMode>> = winners.iter().map(|p| p.map(|p| p.mode)).collect();
        tracing::debug!("building instruction decision trees");
        Self {
            identity: DecisionTree::build(&identity),
            modes: DecisionTree::build(&modes),
        }
    }
}

static TREES: OnceLock<Trees> = OnceLock::new();

fn trees() -> &'static Trees {
    TREES.get_or_init(Trees::build)
}

/// Advances one tree cursor; returns the bound action if this visit bound one.
fn advance<A: Copy + PartialEq>(
    tree: &DecisionTree<A>,
    node: &mut NodeIndex,
    state: &mut DecodeState<'_>,
) -> Result<Option<A>, DecodeError> {
    match tree.visit(*node, state.word) {
        Visit::Descend(child) => {
            *node = child;
            Ok(None)
        }
        Visit::Bind(action) => {
            *node = LOOP;
            state.terminated += 1;
            Ok(Some(action))
        }
        Visit::Parked => Ok(None),
        Visit::Reject => Err(DecodeError::NoMatch { word: state.word }),
    }
}

/// Decision-tree instruction decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder;

impl Decoder {
    /// Decodes the instruction at `buffer[start_index..]`, whose first byte
    /// lives at program byte address `base_address + start_index`.
    ///
    /// Returns the instruction and its size in bytes, or `None` for illegal or
    /// truncated encodings.
    #[must_use]
    pub fn decode(base_address: u32, start_index: usize, buffer: &[u8]) -> Option<(Instruction, u8)> {
        Self::decode_checked(base_address, start_index, buffer).ok()
    }

    /// Like [`Decoder::decode`], reporting why decoding failed.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] when the buffer ends mid-instruction,
    /// [`DecodeError::NoMatch`] for reserved encodings.
    pub fn decode_checked(
        base_address: u32,
        start_index: usize,
        buffer: &[u8],
    ) -> Result<(Instruction, u8), DecodeError> {
        let result = Self::run(base_address, start_index, buffer);
        if let Err(error) = &result {
            tracing::debug!(base_address, start_index, %error, "decode failed");
        }
        result
    }

    fn run(
        base_address: u32,
        start_index: usize,
        buffer: &[u8],
    ) -> Result<(Instruction, u8), DecodeError> {
        let trees = trees();
        let mut state = DecodeState::new(base_address, start_index, buffer)?;
        let mut identity_node = trees.identity.root();
        let mut mode_node = trees.modes.root();
        let mut opcode = None;
        let mut mode = None;

        // Every path binds within one visit per window plus the terminal itself.
        for _ in 0..=SCHEDULE.len() {
            if let Some(bound) = advance(&trees.identity, &mut identity_node, &mut state)? {
                opcode = Some(bound);
            }
            if let Some(bound) = advance(&trees.modes, &mut mode_node, &mut state)? {
                mode = Some(bound);
            }
            if state.terminated == 2 {
                break;
            }
        }

        let (Some(opcode), Some(mode)) = (opcode, mode) else {
            return Err(DecodeError::NoMatch { word: state.word });
        };
        let operands = mode.read(&mut state)?;
        let instruction = opcode.build(&operands.to_vec(), state.address)?;
        Ok((instruction, state.size))
    }

    /// Encoded size in bytes of the instruction whose first word is `word`,
    /// without a full decode.
    #[must_use]
    pub const fn instruction_size(word: u16) -> u8 {
        if word & 0xFE0C == 0x940C || word & 0xFE0F == 0x9000 || word & 0xFE0F == 0x9200 {
            4
        } else {
            2
        }
    }

    /// Node counts of the identity and mode trees.
    #[must_use]
    pub fn tree_sizes() -> (usize, usize) {
        let trees = trees();
        (trees.identity.len(), trees.modes.len())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::patterns::PATTERNS;
    use super::{DecodeError, Decoder};
    use crate::isa::{Instruction, Opcode, RegReg, Register};

    fn r(n: u8) -> Register {
        Register::gpr(n).expect("valid register")
    }

    #[test]
    fn add_r1_r2_decodes_from_little_endian_bytes() {
        let (instruction, size) = Decoder::decode(0, 0, &[0x12, 0x0C]).expect("add decodes");
        assert_eq!(size, 2);
        assert_eq!(
            instruction,
            Instruction::Add(RegReg { rd: r(1), rr: r(2) })
        );
    }

    #[rstest]
    #[case(&[0x00, 0x00], "nop")]
    #[case(&[0x0F, 0xEF], "ldi r16, 0xFF")]
    #[case(&[0x0D, 0x90], "ld r0, X+")]
    #[case(&[0x08, 0x80], "ld r0, Y")]
    #[case(&[0x09, 0x80], "ldd r0, Y+1")]
    #[case(&[0x0F, 0xBE], "out 0x3f, r0")]
    #[case(&[0x78, 0x94], "bset 7")]
    #[case(&[0x18, 0x95], "reti")]
    #[case(&[0x0C, 0x94, 0x34, 0x12], "jmp 0x2468")]
    fn known_words_disassemble(#[case] bytes: &[u8], #[case] text: &str) {
        let (instruction, size) = Decoder::decode(0, 0, bytes).expect("legal encoding");
        assert_eq!(instruction.to_string(), text);
        assert_eq!(usize::from(size), bytes.len());
    }

    #[test]
    fn relative_targets_use_the_instruction_address() {
        // rjmp .-2 at 0x100 loops on itself.
        let bytes = [0xAA, 0xAA, 0xFF, 0xCF];
        let (instruction, _) = Decoder::decode(0xFE, 2, &bytes).expect("rjmp decodes");
        assert_eq!(instruction.opcode(), Opcode::Rjmp);
        assert_eq!(instruction.static_target(), Some(0x100));
    }

    #[test]
    fn reserved_and_truncated_words_are_rejected() {
        assert_eq!(
            Decoder::decode_checked(0, 0, &[0x01, 0x00]),
            Err(DecodeError::NoMatch { word: 0x0001 })
        );
        assert_eq!(
            Decoder::decode_checked(0, 0, &[0x0C, 0x94, 0x00]),
            Err(DecodeError::Truncated { index: 2 })
        );
        assert_eq!(
            Decoder::decode_checked(0, 1, &[0x00, 0x00]),
            Err(DecodeError::Truncated { index: 1 })
        );
        assert!(Decoder::decode(0, 0, &[]).is_none());
    }

    #[test]
    fn size_peek_flags_two_word_forms() {
        assert_eq!(Decoder::instruction_size(0x940C), 4);
        assert_eq!(Decoder::instruction_size(0x940E), 4);
        assert_eq!(Decoder::instruction_size(0x9000), 4);
        assert_eq!(Decoder::instruction_size(0x9200), 4);
        assert_eq!(Decoder::instruction_size(0x0C12), 2);
        assert_eq!(Decoder::instruction_size(0x9001), 2);
    }

    #[test]
    fn size_peek_agrees_with_the_pattern_modes() {
        for pattern in PATTERNS {
            let expected = if pattern.mode.is_two_word() { 4 } else { 2 };
            assert_eq!(
                Decoder::instruction_size(pattern.value),
                expected,
                "{:?}",
                pattern.opcode
            );
        }
    }

    #[test]
    fn trees_share_error_and_loop_nodes() {
        let (identity, modes) = Decoder::tree_sizes();
        assert!(identity > 2);
        assert!(modes > 2);
    }
}
