/*!
 * Event Queue
 * Deterministic virtual-clock engine for tests and single-partition runs
 */

use super::{Engine, Event};
use crate::core::types::SimTime;
use crate::process::{ProcessManager, ProcessResult};
use log::trace;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A posted event with its delivery time and insertion sequence number.
/// The sequence number breaks ties so that same-instant events are
/// delivered in insertion order.
#[derive(Debug)]
struct Pending {
    at: SimTime,
    seq: u64,
    event: Event,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest event pops first
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    now: SimTime,
    seq: u64,
    heap: BinaryHeap<Pending>,
}

/// Deterministic discrete-event queue with a virtual clock.
///
/// This is the reference [`Engine`] used by the test suite and by
/// single-partition embeddings; a distributed host supplies its own.
pub struct EventQueue {
    min_delay: SimTime,
    inner: Mutex<Inner>,
}

impl EventQueue {
    /// Create a queue starting at time 0 with the given lookahead delay.
    pub fn new(min_delay: SimTime) -> Self {
        Self {
            min_delay,
            inner: Mutex::new(Inner {
                now: 0,
                seq: 0,
                heap: BinaryHeap::new(),
            }),
        }
    }

    /// Number of undelivered events.
    pub fn pending(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// Deliver events in (time, insertion) order until the queue is empty,
    /// advancing the virtual clock to each event's delivery time.
    ///
    /// Stops at the first scheduler-fatal error.
    pub fn drain(&self, manager: &ProcessManager) -> ProcessResult<()> {
        loop {
            let event = {
                let mut inner = self.inner.lock();
                match inner.heap.pop() {
                    Some(pending) => {
                        debug_assert!(pending.at >= inner.now, "event queue time went backwards");
                        inner.now = pending.at;
                        pending.event
                    }
                    None => return Ok(()),
                }
            };
            trace!("delivering {:?} at t={}", event, self.now());
            manager.deliver(event)?;
        }
    }
}

impl Engine for EventQueue {
    fn now(&self) -> SimTime {
        self.inner.lock().now
    }

    fn min_delay(&self) -> SimTime {
        self.min_delay
    }

    fn post(&self, event: Event, delay: SimTime) {
        let mut inner = self.inner.lock();
        let at = inner.now + delay;
        let seq = inner.seq;
        inner.seq += 1;
        inner.heap.push(Pending { at, seq, event });
    }
}
