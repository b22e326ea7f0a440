//! Per-node time: the main clock, its event queue and ratio-converted clocks.

pub mod delta_queue;
pub mod derived;

use std::fmt;
use std::sync::Arc;

pub use delta_queue::DeltaQueue;
pub use derived::{DerivedClock, Prescaler};

use crate::config::DEFAULT_CLOCK_HZ;

/// A timed callback scheduled on a [`MainClock`].
///
/// Events are identified by their allocation: removing an event removes the
/// same `Arc` that was inserted.
pub trait Event: Send + Sync {
    /// Runs the event at its scheduled cycle. The clock already reads that cycle,
    /// and the event may schedule or unschedule further events.
    fn fire(self: Arc<Self>, clock: &mut MainClock);
}

struct FnEvent<F>(F);

impl<F> Event for FnEvent<F>
where
    F: Fn(&mut MainClock) + Send + Sync,
{
    fn fire(self: Arc<Self>, clock: &mut MainClock) {
        (self.0)(clock);
    }
}

/// Wraps a closure as an event.
#[must_use]
pub fn from_fn<F>(f: F) -> Arc<dyn Event>
where
    F: Fn(&mut MainClock) + Send + Sync + 'static,
{
    Arc::new(FnEvent(f))
}

/// Cycle counter of one node and the owner of its [`DeltaQueue`].
pub struct MainClock {
    queue: DeltaQueue,
    hz: u64,
    count: u64,
}

impl fmt::Debug for MainClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainClock")
            .field("hz", &self.hz)
            .field("count", &self.count)
            .field("queue", &self.queue)
            .finish()
    }
}

impl Default for MainClock {
    fn default() -> Self {
        Self::new(DEFAULT_CLOCK_HZ)
    }
}

impl MainClock {
    /// Clock running at `hz`, at cycle 0.
    #[must_use]
    pub fn new(hz: u64) -> Self {
        Self {
            queue: DeltaQueue::new(),
            hz,
            count: 0,
        }
    }

    /// Frequency in Hz.
    #[must_use]
    pub const fn hz(&self) -> u64 {
        self.hz
    }

    /// Cycles elapsed.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Pending events.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Event queue, for inspection.
    #[must_use]
    pub const fn queue(&self) -> &DeltaQueue {
        &self.queue
    }

    /// Schedules `event` `delay` cycles from now (0 means the next cycle).
    pub fn insert(&mut self, event: Arc<dyn Event>, delay: u64) {
        self.queue.insert(event, delay);
    }

    /// Unschedules `event`; false if it was not pending.
    pub fn remove(&mut self, event: &Arc<dyn Event>) -> bool {
        self.queue.remove(event)
    }

    /// Cycles until the next event.
    #[must_use]
    pub fn next_event_delay(&self) -> Option<u64> {
        self.queue.next_delay()
    }

    /// Moves time forward by `cycles`, firing every event that falls due, in
    /// time order and insertion order within a cycle.
    pub fn advance(&mut self, cycles: u64) {
        let mut remaining = cycles;
        while let Some((elapsed, events)) = self.queue.pop_due(remaining) {
            remaining -= elapsed;
            self.count += elapsed;
            for event in events {
                event.fire(self);
            }
        }
        self.count += remaining;
    }

    /// Jumps to the next event and fires it; returns the cycles skipped
    /// (0 when nothing is scheduled).
    pub fn skip_ahead(&mut self) -> u64 {
        let Some(delay) = self.next_event_delay() else {
            return 0;
        };
        self.advance(delay);
        delay
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{from_fn, MainClock};

    fn recorder(log: &Arc<Mutex<Vec<(u32, u64)>>>, tag: u32) -> Arc<dyn super::Event> {
        let log = Arc::clone(log);
        from_fn(move |clock| log.lock().expect("log lock").push((tag, clock.count())))
    }

    #[test]
    fn events_fire_at_their_cycle_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut clock = MainClock::new(1_000_000);
        clock.insert(recorder(&log, 1), 5);
        clock.insert(recorder(&log, 2), 3);
        clock.insert(recorder(&log, 3), 5);
        clock.advance(4);
        assert_eq!(*log.lock().expect("log lock"), vec![(2, 3)]);
        clock.advance(1);
        assert_eq!(
            *log.lock().expect("log lock"),
            vec![(2, 3), (1, 5), (3, 5)]
        );
        assert_eq!(clock.count(), 5);
    }

    #[test]
    fn advancing_by_zero_changes_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut clock = MainClock::default();
        clock.insert(recorder(&log, 1), 1);
        clock.advance(0);
        assert_eq!(clock.count(), 0);
        assert_eq!(clock.pending(), 1);
        assert!(log.lock().expect("log lock").is_empty());
    }

    #[test]
    fn events_can_reschedule_themselves() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&fired);
        let mut clock = MainClock::default();
        clock.insert(
            from_fn(move |clock: &mut MainClock| {
                log.lock().expect("log lock").push(clock.count());
                if clock.count() < 30 {
                    let again = Arc::clone(&log);
                    clock.insert(
                        from_fn(move |clock: &mut MainClock| {
                            again.lock().expect("log lock").push(clock.count());
                        }),
                        10,
                    );
                }
            }),
            10,
        );
        clock.advance(25);
        assert_eq!(*fired.lock().expect("log lock"), vec![10, 20]);
        assert_eq!(clock.count(), 25);
    }

    #[test]
    fn skip_ahead_jumps_to_the_next_event() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut clock = MainClock::default();
        assert_eq!(clock.skip_ahead(), 0);
        clock.insert(recorder(&log, 9), 40);
        assert_eq!(clock.skip_ahead(), 40);
        assert_eq!(clock.count(), 40);
        assert_eq!(*log.lock().expect("log lock"), vec![(9, 40)]);
    }
}
