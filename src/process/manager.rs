/*!
 * Process Manager
 * Coroutine creation, switching, suspension, resumption, and teardown
 */

use super::context::Context;
use super::coroutine::{Coroutine, SwitchOutcome, Yielder};
use super::table::ProcessTable;
use super::traits::{Process, ResourceHandler};
use super::types::{ProcessError, ProcessInfo, ProcessResult, ProcessState};
use crate::core::types::{Pid, ResourceId, SimTime};
use crate::engine::{Engine, Event};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// The work-horse for process-oriented simulation: owns the process
/// table, performs all coroutine switching, and reacts to activation and
/// wake-up events delivered by the engine.
///
/// Cloning yields another handle to the same shared state.
#[derive(Clone)]
pub struct ProcessManager {
    table: Arc<ProcessTable>,
    engine: Arc<dyn Engine>,
    current: Arc<RwLock<Option<Pid>>>,
}

impl ProcessManager {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        info!("process manager initialized");
        Self {
            table: Arc::new(ProcessTable::new()),
            engine,
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// The engine this manager schedules through.
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.engine.now()
    }

    /// Pid of the process whose coroutine is presently active, if any.
    pub fn current(&self) -> Option<Pid> {
        *self.current.read()
    }

    /// Snapshot of a process's metadata.
    pub fn info(&self, pid: Pid) -> Option<ProcessInfo> {
        self.table.info(pid)
    }

    /// Current state of a process record.
    pub fn state(&self, pid: Pid) -> ProcessResult<ProcessState> {
        self.table.state(pid)
    }

    /// Number of records in the process table.
    pub fn process_count(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn table(&self) -> &ProcessTable {
        &self.table
    }

    /// Register a process without scheduling it. The record starts
    /// dormant; activate it with [`schedule`](Self::schedule) or by
    /// having another process wait for it.
    pub fn add_process<P: Process + 'static>(&self, process: P) -> Pid {
        let boxed: Arc<Mutex<dyn Process>> = Arc::new(Mutex::new(process));
        self.add_managed(std::any::type_name::<P>(), boxed, None)
    }

    pub(crate) fn add_managed(
        &self,
        name: &'static str,
        process: Arc<Mutex<dyn Process>>,
        handler: Option<Arc<dyn ResourceHandler>>,
    ) -> Pid {
        let pid = self.table.insert(name, process, handler);
        info!("created process {} ({})", pid, name);
        pid
    }

    /// Schedule a dormant process for activation after `delay` ticks.
    /// A zero delay activates synchronously, before this call returns.
    /// Registers `parent` as the owner of the new record if given.
    ///
    /// Rejected (reported, non-fatal) if the record is live.
    pub fn schedule(&self, pid: Pid, delay: SimTime, parent: Option<Pid>) -> ProcessResult<()> {
        let state = self.table.state(pid)?;
        if state.is_live() {
            let name = self.table.name(pid);
            warn!(
                "schedule rejected: process {} ({}) is {:?}, must be new or inactive",
                pid, name, state
            );
            return Err(ProcessError::AlreadyLive { pid, name, state });
        }
        if let Some(parent) = parent {
            self.table.add_child(parent, pid)?;
            self.table.set_parent(pid, Some(parent))?;
        }
        self.table.set_state(pid, ProcessState::Scheduled)?;
        debug!(
            "process {} ({}) scheduled, delay {}",
            pid,
            self.table.name(pid),
            delay
        );
        if delay == 0 {
            self.recv_activate(pid)
        } else {
            self.engine.post(Event::Activate(pid), delay);
            Ok(())
        }
    }

    /// Register and schedule in one step.
    pub fn schedule_new<P: Process + 'static>(
        &self,
        process: P,
        delay: SimTime,
        parent: Option<Pid>,
    ) -> ProcessResult<Pid> {
        let pid = self.add_process(process);
        self.schedule(pid, delay, parent)?;
        Ok(pid)
    }

    /// Spawn a child of `parent`: inherits the parent's resource handler
    /// and activates after the engine's minimum lookahead delay, read at
    /// spawn time.
    pub(crate) fn spawn_from(
        &self,
        parent: Pid,
        name: &'static str,
        process: Arc<Mutex<dyn Process>>,
    ) -> ProcessResult<Pid> {
        let handler = self.table.handler(parent);
        let pid = self.table.insert(name, process, handler.clone());
        if let Some(handler) = handler {
            handler.adopt(pid);
        }
        info!("process {} spawned {} ({})", parent, pid, name);
        let delay = self.engine.min_delay();
        self.schedule(pid, delay, Some(parent))?;
        Ok(pid)
    }

    /// Engine-facing handler for activation and wake-up events.
    ///
    /// Errors returned here are scheduler-fatal: the process table has
    /// diverged from the set of live coroutines, or the simulation model
    /// performed an invalid transition.
    pub fn deliver(&self, event: Event) -> ProcessResult<()> {
        match event {
            Event::Activate(pid) => self.recv_activate(pid),
            Event::Wake(pid) => self.recv_wake(pid),
        }
    }

    fn recv_activate(&self, pid: Pid) -> ProcessResult<()> {
        match self.table.state(pid)? {
            ProcessState::Scheduled => {}
            ProcessState::Inactive => {
                // Killed between scheduling and delivery.
                debug!("stale activation for inactive process {}: ignored", pid);
                return Ok(());
            }
            state => {
                let name = self.table.name(pid);
                error!(
                    "invalid activation for process {} ({}) in state {:?}",
                    pid, name, state
                );
                return Err(ProcessError::UnexpectedEvent {
                    event: "activation",
                    pid,
                    name,
                    state,
                });
            }
        }

        let name = self.table.name(pid);
        let process = self.table.process(pid)?;
        let manager = self.clone();
        let coroutine = Coroutine::spawn(format!("sim-proc-{}", pid), move |yielder| {
            let ctx = Context::new(manager, pid, yielder);
            process.lock().run(&ctx);
        })
        .map_err(|e| ProcessError::SpawnFailed {
            pid,
            name,
            reason: e.to_string(),
        })?;
        self.table.put_coroutine(pid, coroutine)?;
        self.dispatch(pid)
    }

    fn recv_wake(&self, pid: Pid) -> ProcessResult<()> {
        match self.table.state(pid)? {
            ProcessState::Sleeping => self.dispatch(pid),
            state => {
                // A wake racing a kill or an earlier resumption; the
                // message is simply stale.
                debug!("stale wake for process {} in state {:?}: ignored", pid, state);
                Ok(())
            }
        }
    }

    /// Route the "about to run" transition: processes owned by a
    /// resource scheduler go through it; everything else switches in
    /// directly.
    fn dispatch(&self, pid: Pid) -> ProcessResult<()> {
        match self.table.handler(pid) {
            Some(handler) => handler.assign(self, pid),
            None => self.switch_into(pid),
        }
    }

    /// The central primitive: transfer control into a process's
    /// coroutine and interpret the state it left behind when it yielded.
    pub(crate) fn switch_into(&self, pid: Pid) -> ProcessResult<()> {
        let mut coroutine =
            self.table
                .take_coroutine(pid)?
                .ok_or_else(|| ProcessError::LostCoroutine {
                    pid,
                    name: self.table.name(pid),
                })?;
        self.table.set_state(pid, ProcessState::Active)?;

        let prev = self.current.write().replace(pid);
        let outcome = coroutine.switch_in();
        *self.current.write() = prev;

        match outcome {
            SwitchOutcome::Suspended => {
                self.table.put_coroutine(pid, coroutine)?;
                match self.table.state(pid)? {
                    ProcessState::Sleeping | ProcessState::WaitingOnResource => Ok(()),
                    ProcessState::WaitingForChild => self.after_wait_for(pid),
                    state => {
                        let name = self.table.name(pid);
                        error!(
                            "process {} ({}) yielded without a state transition ({:?})",
                            pid, name, state
                        );
                        Err(ProcessError::InvalidState {
                            pid,
                            name,
                            state,
                            op: "yield",
                        })
                    }
                }
            }
            SwitchOutcome::Finished => self.terminate(pid),
        }
    }

    /// A waiter just yielded in WaitingForChild: make sure the awaited
    /// process will run and that its completion resumes the waiter.
    fn after_wait_for(&self, waiter: Pid) -> ProcessResult<()> {
        let child = self
            .table
            .waiting_for(waiter)?
            .ok_or(ProcessError::InvalidState {
                pid: waiter,
                name: self.table.name(waiter),
                state: ProcessState::WaitingForChild,
                op: "wait without a target",
            })?;
        if !self.table.contains(child) {
            return Err(ProcessError::NotFound(child));
        }
        self.table.set_waiter(child, Some(waiter))?;
        match self.table.state(child)? {
            ProcessState::Inactive => {
                // Dormant: runs now, synchronously.
                debug!("waiter {} schedules dormant process {}", waiter, child);
                self.schedule(child, 0, Some(waiter))
            }
            _ => Ok(()),
        }
    }

    /// Normal completion: run the completion hook, then resume a waiter
    /// if one was blocked on this process.
    fn terminate(&self, pid: Pid) -> ProcessResult<()> {
        self.table.set_state(pid, ProcessState::Inactive)?;
        debug!(
            "process {} ({}) finished at t={}",
            pid,
            self.table.name(pid),
            self.now()
        );
        match self.table.handler(pid) {
            Some(handler) => handler.end_process(self, pid)?,
            None => self.table.process(pid)?.lock().end(),
        }
        if let Some(waiter) = self.table.take_waiter(pid)? {
            self.table.set_waiting_for(waiter, None)?;
            debug!("completion of {} resumes waiter {}", pid, waiter);
            self.dispatch(waiter)?;
        }
        Ok(())
    }

    /// Put the calling process to sleep. `Some(d)` arranges a wake after
    /// `d` ticks; `None` sleeps until an explicit [`wake`](Self::wake)
    /// and releases any held resource.
    pub(crate) fn sleep_in(
        &self,
        pid: Pid,
        duration: Option<SimTime>,
        yielder: &Yielder,
    ) -> ProcessResult<()> {
        self.require_current(pid, "sleep")?;
        match duration {
            Some(d) => self.engine.post(Event::Wake(pid), d),
            None => {
                if let Some(handler) = self.table.handler(pid) {
                    handler.release(self, pid)?;
                }
            }
        }
        self.table.set_state(pid, ProcessState::Sleeping)?;
        yielder.suspend();
        Ok(())
    }

    /// Explicitly wake a process sleeping without a duration. The wake
    /// is an event of its own and arrives after the minimum lookahead
    /// delay. Waking a non-sleeping process is an informational no-op.
    pub fn wake(&self, pid: Pid) -> ProcessResult<()> {
        match self.table.state(pid)? {
            ProcessState::Sleeping => {
                self.engine.post(Event::Wake(pid), self.engine.min_delay());
                Ok(())
            }
            state => {
                info!("wake ignored: process {} is {:?}", pid, state);
                Ok(())
            }
        }
    }

    /// Mark a suspended process as sleeping and post its wake after the
    /// minimum lookahead delay. Used for resource handoffs and waiter
    /// resumption, where a same-instant re-entrant switch is forbidden.
    pub(crate) fn grant_wake(&self, pid: Pid) -> ProcessResult<()> {
        self.table.set_state(pid, ProcessState::Sleeping)?;
        self.engine.post(Event::Wake(pid), self.engine.min_delay());
        Ok(())
    }

    /// Suspend `pid` until `child` finishes executing.
    pub(crate) fn wait_for(&self, pid: Pid, child: Pid, yielder: &Yielder) -> ProcessResult<()> {
        self.require_current(pid, "wait_for")?;
        if pid == child {
            return Err(ProcessError::InvalidState {
                pid,
                name: self.table.name(pid),
                state: ProcessState::Active,
                op: "wait for itself",
            });
        }
        if !self.table.contains(child) {
            return Err(ProcessError::NotFound(child));
        }
        // One waiter per process: a second wait would silently displace
        // the first and strand it.
        if let Some(waiter) = self.table.waiter(child)? {
            warn!(
                "wait_for rejected: process {} is already awaited by {}",
                child, waiter
            );
            return Err(ProcessError::AlreadyAwaited { pid: child, waiter });
        }
        if let Some(handler) = self.table.handler(pid) {
            handler.release(self, pid)?;
        }
        self.table.set_waiting_for(pid, Some(child))?;
        self.table.set_state(pid, ProcessState::WaitingForChild)?;
        yielder.suspend();
        Ok(())
    }

    /// Suspend `pid` until the given resource becomes available.
    pub(crate) fn wait_on(
        &self,
        pid: Pid,
        resource: ResourceId,
        yielder: &Yielder,
    ) -> ProcessResult<()> {
        self.require_current(pid, "wait_on")?;
        let handler = self
            .table
            .handler(pid)
            .ok_or(ProcessError::NoResourceHandler { pid, op: "wait_on" })?;
        handler.release(self, pid)?;
        self.table.set_state(pid, ProcessState::WaitingOnResource)?;
        handler.wait_on(self, pid, resource)?;
        yielder.suspend();
        Ok(())
    }

    /// Terminate a process out-of-band. The killed coroutine executes no
    /// further user code past its suspension point; only the completion
    /// hook runs. Killing the running process is rejected; killing an
    /// inactive one is an informational no-op.
    pub fn kill(&self, pid: Pid) -> ProcessResult<()> {
        if self.current() == Some(pid) {
            error!("kill rejected: process {} attempted to kill itself", pid);
            return Err(ProcessError::SelfKill(pid));
        }
        let state = self.table.state(pid)?;
        let name = self.table.name(pid);
        if !state.is_live() {
            info!("kill: process {} ({}) already inactive", pid, name);
            return Ok(());
        }
        info!("killing process {} ({}) in state {:?}", pid, name, state);
        if let Some(coroutine) = self.table.take_coroutine(pid)? {
            coroutine.cancel();
        }
        self.table.set_state(pid, ProcessState::Inactive)?;
        // A killed waiter must not be resumed when the process it awaited
        // completes: drop the back-reference before the completion path
        // can observe it.
        if let Some(awaited) = self.table.waiting_for(pid)? {
            if self.table.waiter(awaited)? == Some(pid) {
                self.table.set_waiter(awaited, None)?;
            }
        }
        self.table.set_waiting_for(pid, None)?;
        match self.table.handler(pid) {
            Some(handler) => handler.end_process(self, pid)?,
            None => self.table.process(pid)?.lock().end(),
        }
        // A pending wake for the killed process is ignored on arrival.
        if let Some(waiter) = self.table.take_waiter(pid)? {
            warn!(
                "process {} killed while {} was waiting for it: resuming waiter",
                pid, waiter
            );
            self.table.set_waiting_for(waiter, None)?;
            self.grant_wake(waiter)?;
        }
        Ok(())
    }

    /// Kill a process and every tracked descendant, depth-first: no
    /// child ever outlives its parent's teardown.
    pub fn kill_all(&self, pid: Pid) -> ProcessResult<()> {
        if !self.table.contains(pid) {
            return Err(ProcessError::NotFound(pid));
        }
        if let Some(current) = self.current() {
            if self.subtree_contains(pid, current) {
                error!(
                    "kill_all rejected: subtree of {} contains the running process {}",
                    pid, current
                );
                return Err(ProcessError::SelfKill(current));
            }
        }
        self.kill_tree(pid)
    }

    fn kill_tree(&self, pid: Pid) -> ProcessResult<()> {
        for child in self.table.children(pid) {
            self.kill_tree(child)?;
        }
        self.kill(pid)
    }

    fn subtree_contains(&self, root: Pid, target: Pid) -> bool {
        if root == target {
            return true;
        }
        self.table
            .children(root)
            .into_iter()
            .any(|child| self.subtree_contains(child, target))
    }

    /// Suspending operations may only be issued by the coroutine that is
    /// presently active, on its own behalf.
    fn require_current(&self, pid: Pid, op: &'static str) -> ProcessResult<()> {
        let current = self.current();
        if current != Some(pid) {
            error!(
                "{} issued for process {} while {:?} is active",
                op, pid, current
            );
            return Err(ProcessError::NotCurrent { pid, current, op });
        }
        match self.table.state(pid)? {
            ProcessState::Active => Ok(()),
            state => Err(ProcessError::InvalidState {
                pid,
                name: self.table.name(pid),
                state,
                op,
            }),
        }
    }
}
