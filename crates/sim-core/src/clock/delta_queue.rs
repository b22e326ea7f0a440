//! Delay-ordered scheduler of timed events.
//!
//! Links form a singly linked chain stored in an arena. Each link holds its
//! delay relative to the previous link and the events due at that moment, in
//! insertion order. Fired and emptied links go to a free list and are reused,
//! so steady-state scheduling does not allocate links.

use std::fmt;
use std::sync::Arc;

use super::Event;

struct Link {
    delta: u64,
    events: Vec<Arc<dyn Event>>,
    next: Option<usize>,
}

/// Chain of links ordered by delay; every link delta is at least 1.
#[derive(Default)]
pub struct DeltaQueue {
    links: Vec<Link>,
    free: Vec<usize>,
    head: Option<usize>,
    len: usize,
}

impl fmt::Debug for DeltaQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeltaQueue")
            .field("deltas", &self.deltas())
            .field("len", &self.len)
            .finish()
    }
}

fn same_event(a: &Arc<dyn Event>, b: &Arc<dyn Event>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl DeltaQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending events.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when nothing is scheduled.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Delay until the earliest pending event.
    #[must_use]
    pub fn next_delay(&self) -> Option<u64> {
        self.head.map(|head| self.links[head].delta)
    }

    /// Link deltas from the head, for inspection.
    #[must_use]
    pub fn deltas(&self) -> Vec<u64> {
        let mut deltas = Vec::new();
        let mut cursor = self.head;
        while let Some(index) = cursor {
            deltas.push(self.links[index].delta);
            cursor = self.links[index].next;
        }
        deltas
    }

    fn alloc(&mut self, delta: u64, event: Arc<dyn Event>, next: Option<usize>) -> usize {
        let link = Link {
            delta,
            events: vec![event],
            next,
        };
        if let Some(index) = self.free.pop() {
            self.links[index] = link;
            index
        } else {
            self.links.push(link);
            self.links.len() - 1
        }
    }

    fn link_after(&mut self, prev: Option<usize>, index: usize) {
        match prev {
            Some(prev) => self.links[prev].next = Some(index),
            None => self.head = Some(index),
        }
    }

    /// Schedules `event` `delay` cycles from now. A delay of 0 is treated as 1:
    /// the current cycle has already been accounted for.
    pub fn insert(&mut self, event: Arc<dyn Event>, delay: u64) {
        let mut remaining = delay.max(1);
        let mut prev = None;
        let mut cursor = self.head;
        self.len += 1;
        while let Some(index) = cursor {
            let delta = self.links[index].delta;
            if remaining == delta {
                self.links[index].events.push(event);
                return;
            }
            if remaining < delta {
                self.links[index].delta = delta - remaining;
                let new = self.alloc(remaining, event, Some(index));
                self.link_after(prev, new);
                return;
            }
            remaining -= delta;
            prev = Some(index);
            cursor = self.links[index].next;
        }
        let new = self.alloc(remaining, event, None);
        self.link_after(prev, new);
    }

    /// Unschedules `event`; false if it was not pending.
    pub fn remove(&mut self, event: &Arc<dyn Event>) -> bool {
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let next = self.links[index].next;
            let events = &mut self.links[index].events;
            if let Some(position) = events.iter().position(|queued| same_event(queued, event)) {
                events.remove(position);
                self.len -= 1;
                if self.links[index].events.is_empty() {
                    self.unlink(prev, index);
                }
                return true;
            }
            prev = Some(index);
            cursor = next;
        }
        false
    }

    fn unlink(&mut self, prev: Option<usize>, index: usize) {
        let Link { delta, next, .. } = self.links[index];
        if let Some(next) = next {
            self.links[next].delta += delta;
        }
        match prev {
            Some(prev) => self.links[prev].next = next,
            None => self.head = next,
        }
        self.links[index].events = Vec::new();
        self.free.push(index);
    }

    /// Consumes up to `budget` cycles. If the head link falls due within the
    /// budget it is unlinked and its events are returned with the cycles it
    /// took; otherwise the head delta shrinks by `budget` and `None` is returned.
    pub fn pop_due(&mut self, budget: u64) -> Option<(u64, Vec<Arc<dyn Event>>)> {
        let head = self.head?;
        let delta = self.links[head].delta;
        if delta > budget {
            self.links[head].delta = delta - budget;
            return None;
        }
        self.head = self.links[head].next;
        let events = std::mem::take(&mut self.links[head].events);
        self.len -= events.len();
        self.free.push(head);
        Some((delta, events))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::DeltaQueue;
    use crate::clock::{from_fn, Event};

    fn noop() -> Arc<dyn Event> {
        from_fn(|_| {})
    }

    #[test]
    fn insertion_splits_links_and_keeps_deltas_positive() {
        let mut queue = DeltaQueue::new();
        queue.insert(noop(), 10);
        queue.insert(noop(), 4);
        queue.insert(noop(), 10);
        queue.insert(noop(), 7);
        assert_eq!(queue.deltas(), vec![4, 3, 3]);
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn removal_merges_the_delta_into_the_successor() {
        let mut queue = DeltaQueue::new();
        let middle = noop();
        queue.insert(noop(), 2);
        queue.insert(Arc::clone(&middle), 5);
        queue.insert(noop(), 9);
        assert!(queue.remove(&middle));
        assert_eq!(queue.deltas(), vec![2, 7]);
        assert!(!queue.remove(&middle));
    }

    #[test]
    fn zero_delay_is_scheduled_for_the_next_cycle() {
        let mut queue = DeltaQueue::new();
        queue.insert(noop(), 0);
        assert_eq!(queue.next_delay(), Some(1));
    }

    #[test]
    fn pop_due_consumes_the_budget() {
        let mut queue = DeltaQueue::new();
        queue.insert(noop(), 5);
        assert!(queue.pop_due(3).is_none());
        assert_eq!(queue.next_delay(), Some(2));
        let (elapsed, events) = queue.pop_due(4).expect("head is due");
        assert_eq!(elapsed, 2);
        assert_eq!(events.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn freed_links_are_reused() {
        let mut queue = DeltaQueue::new();
        queue.insert(noop(), 1);
        let _ = queue.pop_due(1);
        queue.insert(noop(), 3);
        assert_eq!(queue.links.len(), 1);
    }
}
