/*!
 * Process Module
 * Process-oriented simulation: processes, coroutines, and the scheduler
 */

pub mod context;
pub mod coroutine;
pub mod manager;
pub(crate) mod table;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use context::Context;
pub use coroutine::{Coroutine, SwitchOutcome, Yielder};
pub use manager::ProcessManager;
pub use traits::{Process, ResourceHandler};
pub use types::{ProcessError, ProcessInfo, ProcessResult, ProcessState};
