/*!
 * Process Context
 * Ambient handle available to a process while its coroutine is active
 */

use super::coroutine::Yielder;
use super::manager::ProcessManager;
use super::traits::Process;
use super::types::ProcessResult;
use crate::core::types::{Pid, ResourceId, SimTime};
use parking_lot::Mutex;
use std::sync::Arc;

/// The "who am I" handle passed to [`Process::run`].
///
/// Every suspending call must be made through the context of the
/// currently active coroutine; issuing one on behalf of another process
/// is a contract violation and is rejected by the manager.
pub struct Context<'a> {
    manager: ProcessManager,
    pid: Pid,
    yielder: &'a Yielder,
}

impl<'a> Context<'a> {
    pub(crate) fn new(manager: ProcessManager, pid: Pid, yielder: &'a Yielder) -> Self {
        Self {
            manager,
            pid,
            yielder,
        }
    }

    /// Pid of the running process.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The owning process manager.
    pub fn manager(&self) -> &ProcessManager {
        &self.manager
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.manager.now()
    }

    /// Suspend for `duration` ticks; resumes at exactly `now + duration`.
    /// A process holding a resource keeps it across a timed sleep.
    pub fn sleep(&self, duration: SimTime) -> ProcessResult<()> {
        self.manager.sleep_in(self.pid, Some(duration), self.yielder)
    }

    /// Suspend until another process calls
    /// [`ProcessManager::wake`] for this pid. Releases any held resource.
    pub fn sleep_until_woken(&self) -> ProcessResult<()> {
        self.manager.sleep_in(self.pid, None, self.yielder)
    }

    /// Model computation: occupy the assigned resource for `time` ticks.
    pub fn compute(&self, time: SimTime) -> ProcessResult<()> {
        self.sleep(time)
    }

    /// Spawn a child process and continue executing. The child activates
    /// after the engine's minimum lookahead delay and is tracked under
    /// this process for recursive teardown.
    pub fn spawn<P: Process + 'static>(&self, process: P) -> ProcessResult<Pid> {
        let boxed: Arc<Mutex<dyn Process>> = Arc::new(Mutex::new(process));
        self.manager
            .spawn_from(self.pid, std::any::type_name::<P>(), boxed)
    }

    /// Suspend until `child` finishes executing. A dormant child is
    /// scheduled immediately; its completion resumes this process.
    pub fn wait_for(&self, child: Pid) -> ProcessResult<()> {
        self.manager.wait_for(self.pid, child, self.yielder)
    }

    /// Suspend until the given resource becomes available, then run on it.
    pub fn wait_on(&self, resource: ResourceId) -> ProcessResult<()> {
        self.manager.wait_on(self.pid, resource, self.yielder)
    }

    /// Kill another process. Self-kill is rejected.
    pub fn kill(&self, pid: Pid) -> ProcessResult<()> {
        self.manager.kill(pid)
    }

    /// Kill a process and all its tracked descendants, children first.
    pub fn kill_all(&self, pid: Pid) -> ProcessResult<()> {
        self.manager.kill_all(pid)
    }
}
