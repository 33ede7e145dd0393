/*!
 * Resource
 * Exclusive, non-preemptible execution unit ("core")
 */

use crate::core::types::Pid;
use std::collections::VecDeque;

/// One core of a simulated compute node: held by at most one process,
/// with a private FIFO queue of processes that asked for this core
/// specifically.
///
/// Invariant: `busy` is true exactly when an occupant is set.
#[derive(Debug, Default)]
pub struct Resource {
    busy: bool,
    current: Option<Pid>,
    queue: VecDeque<Pid>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// The process currently bound to this core.
    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Bind `pid` to this core and mark it busy.
    pub(crate) fn seize(&mut self, pid: Pid) {
        debug_assert!(!self.busy, "seize of a busy core");
        self.busy = true;
        self.current = Some(pid);
    }

    /// Unbind the occupant and mark the core idle.
    pub(crate) fn clear(&mut self) {
        self.busy = false;
        self.current = None;
    }

    /// Append a process to the private queue.
    pub(crate) fn enqueue(&mut self, pid: Pid) {
        self.queue.push_back(pid);
    }

    /// Pop the oldest queued process.
    pub(crate) fn pop_next(&mut self) -> Option<Pid> {
        self.queue.pop_front()
    }

    /// Remove a queued process (a queued, never-run process can still be
    /// killed). Returns whether it was present.
    pub(crate) fn remove_queued(&mut self, pid: Pid) -> bool {
        let before = self.queue.len();
        self.queue.retain(|&p| p != pid);
        before != self.queue.len()
    }
}
