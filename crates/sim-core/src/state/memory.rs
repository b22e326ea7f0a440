//! Program memory with its per-word instruction cache, and memory error routing.

use thiserror::Error;

use crate::decoder::{DecodeError, Decoder};
use crate::isa::Instruction;

/// Invalid access to a memory segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Data-space read past the end of SRAM.
    #[error("data read at {address:#06x} outside data space")]
    DataReadOutOfRange {
        /// Data-space byte address.
        address: u16,
    },
    /// Data-space write past the end of SRAM.
    #[error("data write at {address:#06x} outside data space")]
    DataWriteOutOfRange {
        /// Data-space byte address.
        address: u16,
    },
    /// Program-memory read past the end of flash.
    #[error("program read at {address:#07x} outside flash")]
    ProgramOutOfRange {
        /// Program byte address.
        address: u32,
    },
    /// Program image larger than flash.
    #[error("program image of {len} bytes at {offset:#07x} exceeds {capacity}-byte flash")]
    ImageTooLarge {
        /// Load offset.
        offset: u32,
        /// Image length in bytes.
        len: usize,
        /// Flash size in bytes.
        capacity: usize,
    },
}

/// What the core does after a reported memory error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorAction {
    /// Reads yield zero and writes are dropped.
    #[default]
    Continue,
    /// The node halts with a memory fault after the current instruction.
    Halt,
}

/// Policy hook for invalid memory accesses.
pub trait ErrorReporter: Send {
    /// Called once per invalid access.
    fn report(&mut self, error: &MemoryError) -> ErrorAction;
}

/// Logs each error and continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReporter;

impl ErrorReporter for LoggingReporter {
    fn report(&mut self, error: &MemoryError) -> ErrorAction {
        tracing::warn!(%error, "memory access error");
        ErrorAction::Continue
    }
}

/// Logs each error and halts the node.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaltingReporter;

impl ErrorReporter for HaltingReporter {
    fn report(&mut self, error: &MemoryError) -> ErrorAction {
        tracing::warn!(%error, "memory access error, halting");
        ErrorAction::Halt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheSlot {
    Empty,
    Decoded(Instruction, u8),
    Invalid(DecodeError),
}

/// Flash image plus one decode-cache slot per program word.
#[derive(Debug, Clone)]
pub struct ProgramSegment {
    flash: Vec<u8>,
    cache: Vec<CacheSlot>,
}

impl ProgramSegment {
    /// Erased flash (all `0xFF`) of `size` bytes, rounded up to whole words.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size + size % 2;
        Self {
            flash: vec![0xFF; size],
            cache: vec![CacheSlot::Empty; size / 2],
        }
    }

    /// Flash size in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.flash.len()
    }

    /// True for a zero-sized segment.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.flash.is_empty()
    }

    /// Raw flash contents.
    #[must_use]
    pub const fn bytes(&self) -> &[u8] {
        self.flash.as_slice()
    }

    /// Copies `image` into flash at byte `offset`, invalidating cached decodes.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ImageTooLarge`] if the image does not fit.
    pub fn load(&mut self, offset: u32, image: &[u8]) -> Result<(), MemoryError> {
        let start = offset as usize;
        let Some(target) = self.flash.get_mut(start..start + image.len()) else {
            return Err(MemoryError::ImageTooLarge {
                offset,
                len: image.len(),
                capacity: self.flash.len(),
            });
        };
        target.copy_from_slice(image);
        self.cache.fill(CacheSlot::Empty);
        Ok(())
    }

    /// Byte at `address`.
    #[must_use]
    pub fn read_byte(&self, address: u32) -> Option<u8> {
        self.flash.get(address as usize).copied()
    }

    /// Little-endian word at byte `address`.
    #[must_use]
    pub fn read_word(&self, address: u32) -> Option<u16> {
        let at = address as usize;
        match self.flash.get(at..at + 2) {
            Some(&[low, high]) => Some(u16::from_le_bytes([low, high])),
            _ => None,
        }
    }

    /// Writes one word (self-programming). The cached decodes of this word and
    /// of the preceding one, which may be a two-word instruction, are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ProgramOutOfRange`] outside flash.
    pub fn write_word(&mut self, address: u32, value: u16) -> Result<(), MemoryError> {
        let at = (address & !1) as usize;
        let Some(target) = self.flash.get_mut(at..at + 2) else {
            return Err(MemoryError::ProgramOutOfRange { address });
        };
        target.copy_from_slice(&value.to_le_bytes());
        let slot = at / 2;
        self.cache[slot] = CacheSlot::Empty;
        if slot > 0 {
            self.cache[slot - 1] = CacheSlot::Empty;
        }
        Ok(())
    }

    /// Decoded instruction and size at byte `address`, decoding on first use.
    ///
    /// # Errors
    ///
    /// Returns the decode failure for illegal or truncated words.
    pub fn fetch(&mut self, address: u32) -> Result<(Instruction, u8), DecodeError> {
        let slot = (address / 2) as usize;
        match self.cache.get(slot) {
            Some(CacheSlot::Decoded(instruction, size)) => return Ok((*instruction, *size)),
            Some(CacheSlot::Invalid(error)) => return Err(*error),
            Some(CacheSlot::Empty) => {}
            None => {
                return Err(DecodeError::Truncated {
                    index: address as usize,
                })
            }
        }
        let result = Decoder::decode_checked(0, address as usize, &self.flash);
        self.cache[slot] = match result {
            Ok((instruction, size)) => CacheSlot::Decoded(instruction, size),
            Err(error) => CacheSlot::Invalid(error),
        };
        result
    }
}
