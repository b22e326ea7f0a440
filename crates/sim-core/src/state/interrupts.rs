//! Interrupt request lines shared between a core and its device models.

use std::sync::atomic::{AtomicU64, Ordering};

/// Highest interrupt number plus one.
pub const MAX_INTERRUPTS: u8 = 64;

/// Whether the next instruction boundary may accept an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InterruptState {
    /// Interrupts are checked at the next boundary.
    #[default]
    Normal,
    /// One more instruction executes before interrupts are checked (after `reti`).
    SuppressedForOneInstruction,
}

/// Pending and enabled bitmaps for interrupts `1..MAX_INTERRUPTS`.
///
/// Number 1 is the reset vector; vector `n` lives at `(n - 1) * vector_size`.
/// Devices post from event callbacks, possibly on other threads.
#[derive(Debug)]
pub struct InterruptLines {
    pending: AtomicU64,
    enabled: AtomicU64,
}

impl Default for InterruptLines {
    fn default() -> Self {
        Self {
            pending: AtomicU64::new(0),
            enabled: AtomicU64::new(u64::MAX),
        }
    }
}

const fn bit(number: u8) -> u64 {
    if number == 0 || number >= MAX_INTERRUPTS {
        0
    } else {
        1 << number
    }
}

impl InterruptLines {
    /// Raises interrupt `number`.
    pub fn post(&self, number: u8) {
        self.pending.fetch_or(bit(number), Ordering::AcqRel);
    }

    /// Lowers interrupt `number`.
    pub fn clear(&self, number: u8) {
        self.pending.fetch_and(!bit(number), Ordering::AcqRel);
    }

    /// Unmasks interrupt `number`.
    pub fn enable(&self, number: u8) {
        self.enabled.fetch_or(bit(number), Ordering::AcqRel);
    }

    /// Masks interrupt `number`; it stays pending.
    pub fn disable(&self, number: u8) {
        self.enabled.fetch_and(!bit(number), Ordering::AcqRel);
    }

    /// True if `number` is raised.
    #[must_use]
    pub fn is_pending(&self, number: u8) -> bool {
        let mask = bit(number);
        mask != 0 && self.pending.load(Ordering::Acquire) & mask != 0
    }

    /// Lowest-numbered interrupt that is both pending and enabled.
    #[must_use]
    pub fn next_pending(&self) -> Option<u8> {
        let ready = self.pending.load(Ordering::Acquire) & self.enabled.load(Ordering::Acquire);
        if ready == 0 {
            None
        } else {
            u8::try_from(ready.trailing_zeros()).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InterruptLines;

    #[test]
    fn lowest_number_wins() {
        let lines = InterruptLines::default();
        assert_eq!(lines.next_pending(), None);
        lines.post(9);
        lines.post(3);
        assert_eq!(lines.next_pending(), Some(3));
        lines.clear(3);
        assert_eq!(lines.next_pending(), Some(9));
    }

    #[test]
    fn masked_interrupts_stay_pending() {
        let lines = InterruptLines::default();
        lines.disable(5);
        lines.post(5);
        assert!(lines.is_pending(5));
        assert_eq!(lines.next_pending(), None);
        lines.enable(5);
        assert_eq!(lines.next_pending(), Some(5));
    }

    #[test]
    fn out_of_range_numbers_are_ignored() {
        let lines = InterruptLines::default();
        lines.post(0);
        lines.post(64);
        assert_eq!(lines.next_pending(), None);
        assert!(!lines.is_pending(0));
    }
}
