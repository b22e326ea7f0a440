//! Event ordering properties of the main clock and its derived clocks.

#![allow(clippy::pedantic, clippy::nursery, clippy::cast_possible_truncation)]

use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use sim_core::clock::from_fn;
use sim_core::{DerivedClock, Event, MainClock, Prescaler};
use thiserror as _;
use tracing as _;

type Log = Arc<Mutex<Vec<(usize, u64)>>>;

fn recorder(log: &Log, tag: usize) -> Arc<dyn Event> {
    let log = Arc::clone(log);
    from_fn(move |clock| log.lock().expect("log").push((tag, clock.count())))
}

#[test]
fn zero_advance_fires_nothing() {
    let log = Log::default();
    let mut clock = MainClock::new(8_000_000);
    clock.insert(recorder(&log, 0), 1);
    clock.advance(0);
    assert!(log.lock().expect("log").is_empty());
    assert_eq!(clock.count(), 0);
    assert_eq!(clock.next_event_delay(), Some(1));
}

#[test]
fn removed_events_never_fire_and_later_events_keep_their_time() {
    let log = Log::default();
    let mut clock = MainClock::new(8_000_000);
    let first = recorder(&log, 0);
    clock.insert(Arc::clone(&first), 2);
    clock.insert(recorder(&log, 1), 9);
    assert!(clock.remove(&first));
    assert!(!clock.remove(&first));
    assert_eq!(clock.queue().deltas(), vec![9]);
    clock.advance(20);
    assert_eq!(*log.lock().expect("log"), vec![(1, 9)]);
}

#[rstest]
#[case(1, 7)]
#[case(8, 3)]
#[case(64, 2)]
fn prescaled_events_land_on_tick_edges(#[case] divisor: u64, #[case] ticks: u64) {
    let log = Log::default();
    let mut main = MainClock::new(8_000_000);
    main.advance(5);
    let prescaler = Prescaler::new(&main, divisor);
    prescaler.insert(&mut main, recorder(&log, 0), ticks);
    main.advance(divisor * ticks + 10);
    assert_eq!(*log.lock().expect("log"), vec![(0, 5 + divisor * ticks)]);
    assert_eq!(prescaler.count(&main), ticks + 10 / divisor);
}

proptest! {
    #[test]
    fn events_fire_in_time_then_insertion_order(
        delays in prop::collection::vec(0u64..40, 1..24),
        removed in prop::collection::vec(any::<bool>(), 24),
        chunks in prop::collection::vec(1u64..7, 1..16),
    ) {
        let log = Log::default();
        let mut clock = MainClock::new(1_000_000);
        let events: Vec<_> = delays
            .iter()
            .enumerate()
            .map(|(tag, &delay)| {
                let event = recorder(&log, tag);
                clock.insert(Arc::clone(&event), delay);
                event
            })
            .collect();
        for (event, _) in events.iter().zip(&removed).filter(|(_, gone)| **gone) {
            prop_assert!(clock.remove(event));
        }
        prop_assert!(clock.queue().deltas().iter().all(|delta| *delta > 0));

        for chunk in chunks.iter().cycle().take(64) {
            clock.advance(*chunk);
        }
        prop_assert!(clock.count() >= 64);

        let mut expected: Vec<(usize, u64)> = delays
            .iter()
            .enumerate()
            .filter(|(tag, _)| !removed[*tag])
            .map(|(tag, &delay)| (tag, delay.max(1)))
            .collect();
        expected.sort_by_key(|&(tag, time)| (time, tag));
        prop_assert_eq!(log.lock().expect("log").clone(), expected);
        prop_assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn derived_ticks_track_the_main_clock(
        ratio in 1u64..50,
        lead in 0u64..200,
        ticks in 1u64..20,
    ) {
        let log = Log::default();
        let mut main = MainClock::new(1_000_000);
        let derived = DerivedClock::new(&main, ratio);
        main.advance(lead);
        let before = derived.count(&main);
        derived.insert(&mut main, recorder(&log, 0), ticks);
        main.advance(ticks * ratio);
        let fired = log.lock().expect("log").clone();
        prop_assert_eq!(fired.len(), 1);
        let at = fired[0].1;
        prop_assert_eq!(at % ratio, 0);
        prop_assert_eq!(at / ratio, before + ticks);
    }
}
