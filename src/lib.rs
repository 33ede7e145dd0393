/*!
 * simproc
 * Process-oriented scheduling core for discrete-event simulation:
 * sequential, blocking-looking processes cooperatively interleaved over
 * a single logical thread, with an OS-like resource allocator on top
 */

pub mod core;
pub mod engine;
pub mod os;
pub mod process;

// Re-exports
pub use crate::core::types::{Pid, ResourceId, SimTime};
pub use engine::{Engine, Event, EventQueue};
pub use os::{NodeConfig, Resource, System};
pub use process::{
    Context, Process, ProcessError, ProcessInfo, ProcessManager, ProcessResult, ProcessState,
    ResourceHandler,
};
