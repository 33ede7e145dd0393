/*!
 * Engine Module
 * The consumed surface of the external discrete-event engine
 */

pub mod queue;

pub use queue::EventQueue;

use crate::core::types::{Pid, SimTime};

/// Payload delivered back to the process manager by the engine.
///
/// The scheduler never manipulates simulated time itself; it posts one of
/// these to the engine with a delay and reacts when it comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// First activation of a scheduled process
    Activate(Pid),
    /// Wake-up for a sleeping process
    Wake(Pid),
}

/// Discrete-event engine surface consumed by the scheduling core.
///
/// The host environment provides simulated time, the minimum lookahead
/// delay between causally related events, and a self-addressed
/// deliver-after-delay primitive. The engine guarantees at most one
/// handler runs at a time.
pub trait Engine: Send + Sync {
    /// Current simulated time
    fn now(&self) -> SimTime;

    /// Smallest delay the engine allows between causally related events.
    ///
    /// Read fresh at every scheduling site; never capture a snapshot.
    fn min_delay(&self) -> SimTime;

    /// Schedule `event` to be delivered back to the owning process
    /// manager after `delay` ticks.
    fn post(&self, event: Event, delay: SimTime);
}
