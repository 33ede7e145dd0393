/*!
 * Process Traits
 * User-facing Process trait and the resource-arbitration seam
 */

use super::context::Context;
use super::manager::ProcessManager;
use super::types::ProcessResult;
use crate::core::types::{Pid, ResourceId};

/// A simulated unit of sequential, suspendable activity.
///
/// Implementors write `run` as ordinary blocking-looking code; every
/// [`Context`] call that suspends is a cooperative switch point. Both
/// hooks are invoked by the scheduler only, never by user code.
pub trait Process: Send {
    /// Entry point, invoked once per activation of the process.
    fn run(&mut self, ctx: &Context<'_>);

    /// Completion hook, invoked when the process finishes or is killed.
    fn end(&mut self) {}
}

/// Arbitration seam between the process manager and a resource scheduler.
///
/// When a record carries a handler, the manager routes its "about to run"
/// transition through [`assign`](Self::assign) instead of switching in
/// directly, and notifies the handler when the process blocks or ends.
pub trait ResourceHandler: Send + Sync {
    /// Decide whether `pid` may run now: switch into it, or queue it.
    fn assign(&self, manager: &ProcessManager, pid: Pid) -> ProcessResult<()>;

    /// Free any resource held by `pid` before it blocks.
    fn release(&self, manager: &ProcessManager, pid: Pid) -> ProcessResult<()>;

    /// Run the completion hook and reclaim `pid`'s resource or queue slot.
    fn end_process(&self, manager: &ProcessManager, pid: Pid) -> ProcessResult<()>;

    /// Park `pid` until the given resource becomes available.
    fn wait_on(
        &self,
        manager: &ProcessManager,
        pid: Pid,
        resource: ResourceId,
    ) -> ProcessResult<()>;

    /// Register bookkeeping for a child spawned by a managed process.
    fn adopt(&self, pid: Pid);
}
