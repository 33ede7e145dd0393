/*!
 * Core Types
 * Common types used across the scheduling core
 */

/// Process ID type: a stable arena handle, never an object address
pub type Pid = u32;

/// Resource ("core") index within a System's fixed pool
pub type ResourceId = usize;

/// Simulated time, in engine ticks
pub type SimTime = u64;
