//! Clocks running at a fixed ratio of the main clock.
//!
//! Neither clock owns a queue. Counts are derived from the main clock's count
//! and events are forwarded to it after converting ticks to main cycles.

use std::sync::Arc;

use super::{Event, MainClock};

/// Clock ticking once every `ratio` main-clock cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedClock {
    ratio: u64,
    base_count: u64,
    base_main: u64,
}

impl DerivedClock {
    /// Derived clock starting at tick 0 at the main clock's current cycle.
    /// A ratio of 0 is treated as 1.
    #[must_use]
    pub fn new(main: &MainClock, ratio: u64) -> Self {
        Self {
            ratio: ratio.max(1),
            base_count: 0,
            base_main: main.count(),
        }
    }

    /// Main-clock cycles per tick.
    #[must_use]
    pub const fn ratio(&self) -> u64 {
        self.ratio
    }

    /// Ticks elapsed.
    #[must_use]
    pub const fn count(&self, main: &MainClock) -> u64 {
        self.base_count + (main.count() - self.base_main) / self.ratio
    }

    /// Main cycles since the last whole tick.
    const fn phase(&self, main: &MainClock) -> u64 {
        (main.count() - self.base_main) % self.ratio
    }

    /// Main-clock delay that lands `ticks` ticks from now, on a tick edge.
    #[must_use]
    pub const fn main_delay(&self, main: &MainClock, ticks: u64) -> u64 {
        ticks
            .saturating_mul(self.ratio)
            .saturating_sub(self.phase(main))
    }

    /// Schedules `event` `ticks` ticks from now.
    pub fn insert(&self, main: &mut MainClock, event: Arc<dyn Event>, ticks: u64) {
        let delay = self.main_delay(main, ticks);
        main.insert(event, delay);
    }

    /// Unschedules `event`; false if it was not pending.
    pub fn remove(&self, main: &mut MainClock, event: &Arc<dyn Event>) -> bool {
        main.remove(event)
    }

    /// Changes the ratio. The tick count is rebased at the current cycle so it
    /// never moves backward.
    pub fn set_ratio(&mut self, main: &MainClock, ratio: u64) {
        self.base_count = self.count(main);
        self.base_main = main.count();
        self.ratio = ratio.max(1);
    }
}

/// Main-clock divider with a resettable phase, as used by timer prescalers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prescaler {
    clock: DerivedClock,
}

impl Prescaler {
    /// Prescaler dividing the main clock by `divisor`.
    #[must_use]
    pub fn new(main: &MainClock, divisor: u64) -> Self {
        Self {
            clock: DerivedClock::new(main, divisor),
        }
    }

    /// Current divisor.
    #[must_use]
    pub const fn divisor(&self) -> u64 {
        self.clock.ratio()
    }

    /// Ticks elapsed.
    #[must_use]
    pub const fn count(&self, main: &MainClock) -> u64 {
        self.clock.count(main)
    }

    /// Schedules `event` `ticks` ticks from now.
    pub fn insert(&self, main: &mut MainClock, event: Arc<dyn Event>, ticks: u64) {
        self.clock.insert(main, event, ticks);
    }

    /// Unschedules `event`; false if it was not pending.
    pub fn remove(&self, main: &mut MainClock, event: &Arc<dyn Event>) -> bool {
        self.clock.remove(main, event)
    }

    /// Selects a new divisor, keeping the tick count.
    pub fn set_divisor(&mut self, main: &MainClock, divisor: u64) {
        self.clock.set_ratio(main, divisor);
    }

    /// Restarts the divider phase at the current cycle; the next tick is a
    /// full period away.
    pub fn reset(&mut self, main: &MainClock) {
        self.clock.set_ratio(main, self.clock.ratio());
    }
}
