//! IO register space backed by active registers.

use std::fmt;

/// A device-visible IO register. Reads may have side effects.
pub trait ActiveRegister: Send {
    /// Current value.
    fn read(&mut self) -> u8;

    /// Stores `value`.
    fn write(&mut self, value: u8);

    /// Reads bit `bit` (0..7).
    fn read_bit(&mut self, bit: u8) -> bool {
        (self.read() >> (bit & 7)) & 1 != 0
    }

    /// Read-modify-write of bit `bit` (0..7).
    fn write_bit(&mut self, bit: u8, value: bool) {
        let mask = 1u8 << (bit & 7);
        let current = self.read();
        self.write(if value { current | mask } else { current & !mask });
    }
}

/// Plain storage register with no side effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RwRegister {
    value: u8,
}

impl RwRegister {
    /// Register holding `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self { value }
    }
}

impl ActiveRegister for RwRegister {
    fn read(&mut self) -> u8 {
        self.value
    }

    fn write(&mut self, value: u8) {
        self.value = value;
    }
}

/// IO registers `0..len`, each an [`ActiveRegister`].
pub struct IoSpace {
    registers: Vec<Box<dyn ActiveRegister>>,
}

impl fmt::Debug for IoSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoSpace")
            .field("len", &self.registers.len())
            .finish()
    }
}

impl IoSpace {
    /// `len` plain registers.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            registers: (0..len)
                .map(|_| Box::new(RwRegister::default()) as Box<dyn ActiveRegister>)
                .collect(),
        }
    }

    /// Number of IO registers.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.registers.len()
    }

    /// True when the space has no registers.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Replaces register `index`, returning the previous one.
    pub fn install(
        &mut self,
        index: usize,
        register: Box<dyn ActiveRegister>,
    ) -> Option<Box<dyn ActiveRegister>> {
        self.registers
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, register))
    }

    /// Reads register `index`.
    pub fn read(&mut self, index: usize) -> Option<u8> {
        self.registers.get_mut(index).map(|register| register.read())
    }

    /// Writes register `index`; false if it does not exist.
    pub fn write(&mut self, index: usize, value: u8) -> bool {
        let Some(register) = self.registers.get_mut(index) else {
            return false;
        };
        register.write(value);
        true
    }

    /// Reads one bit of register `index`.
    pub fn read_bit(&mut self, index: usize, bit: u8) -> Option<bool> {
        self.registers
            .get_mut(index)
            .map(|register| register.read_bit(bit))
    }

    /// Writes one bit of register `index`; false if it does not exist.
    pub fn write_bit(&mut self, index: usize, bit: u8, value: bool) -> bool {
        let Some(register) = self.registers.get_mut(index) else {
            return false;
        };
        register.write_bit(bit, value);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::{ActiveRegister, IoSpace, RwRegister};

    struct CountingRegister {
        reads: Arc<AtomicU32>,
    }

    impl ActiveRegister for CountingRegister {
        fn read(&mut self) -> u8 {
            self.reads.fetch_add(1, Ordering::Relaxed);
            0xA5
        }

        fn write(&mut self, _value: u8) {}
    }

    #[test]
    fn bit_helpers_read_modify_write() {
        let mut register = RwRegister::new(0b1000_0001);
        register.write_bit(1, true);
        register.write_bit(7, false);
        assert_eq!(register.read(), 0b0000_0011);
        assert!(register.read_bit(0));
        assert!(!register.read_bit(7));
    }

    #[test]
    fn installed_registers_receive_accesses() {
        let reads = Arc::new(AtomicU32::new(0));
        let mut io = IoSpace::new(4);
        assert!(io
            .install(2, Box::new(CountingRegister { reads: Arc::clone(&reads) }))
            .is_some());
        assert_eq!(io.read(2), Some(0xA5));
        assert_eq!(io.read_bit(2, 0), Some(true));
        assert_eq!(reads.load(Ordering::Relaxed), 2);
        assert_eq!(io.read(4), None);
        assert!(!io.write(4, 1));
    }
}
