/*!
 * System
 * OS-like resource scheduler: binds processes to a fixed pool of cores
 */

use super::resource::Resource;
use crate::core::types::{Pid, ResourceId, SimTime};
use crate::process::types::{ProcessError, ProcessResult, ProcessState};
use crate::process::{Process, ProcessManager, ResourceHandler};
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Configuration for a simulated compute node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NodeConfig {
    pub num_cores: usize,
}

impl NodeConfig {
    pub fn new(num_cores: usize) -> Self {
        Self { num_cores }
    }

    pub fn with_num_cores(mut self, num_cores: usize) -> Self {
        self.num_cores = num_cores;
        self
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self { num_cores: 1 }
    }
}

/// Per-process resource bookkeeping.
#[derive(Debug, Default, Clone, Copy)]
struct Binding {
    /// Core this process explicitly asked for, if any
    requested: Option<ResourceId>,
    /// Core this process currently holds, if any
    assigned: Option<ResourceId>,
}

struct SystemState {
    resources: Vec<Resource>,
    /// Shared FIFO of processes with no core preference
    ready: VecDeque<Pid>,
    bindings: HashMap<Pid, Binding>,
}

/// Mimics a simple operating system: arbitrates a fixed set of exclusive
/// cores among processes that declare either "any core" or "this core".
///
/// Installed as the [`ResourceHandler`] of the processes it creates, so
/// the process manager routes their "about to run" transitions through
/// [`assign`](ResourceHandler::assign).
pub struct System {
    state: Mutex<SystemState>,
}

impl System {
    pub fn new(config: NodeConfig) -> Self {
        info!("system initialized with {} cores", config.num_cores);
        Self {
            state: Mutex::new(SystemState {
                resources: (0..config.num_cores).map(|_| Resource::new()).collect(),
                ready: VecDeque::new(),
                bindings: HashMap::new(),
            }),
        }
    }

    pub fn num_resources(&self) -> usize {
        self.state.lock().resources.len()
    }

    /// Occupant of a core, if any.
    pub fn occupant(&self, resource: ResourceId) -> ProcessResult<Option<Pid>> {
        let state = self.state.lock();
        state
            .resources
            .get(resource)
            .map(|r| r.current())
            .ok_or(ProcessError::NoSuchResource(resource))
    }

    /// Length of a core's private queue.
    pub fn queued_len(&self, resource: ResourceId) -> ProcessResult<usize> {
        let state = self.state.lock();
        state
            .resources
            .get(resource)
            .map(|r| r.queue_len())
            .ok_or(ProcessError::NoSuchResource(resource))
    }

    /// Length of the shared ready queue.
    pub fn ready_len(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// Core currently held by a process, if any.
    pub fn assigned_resource(&self, pid: Pid) -> Option<ResourceId> {
        self.state.lock().bindings.get(&pid).and_then(|b| b.assigned)
    }

    /// Create a process managed by this system, with no core preference.
    /// The record is dormant until scheduled.
    pub fn create_process<P: Process + 'static>(
        self: &Arc<Self>,
        manager: &ProcessManager,
        process: P,
    ) -> Pid {
        let boxed: Arc<parking_lot::Mutex<dyn Process>> =
            Arc::new(parking_lot::Mutex::new(process));
        let pid = manager.add_managed(
            std::any::type_name::<P>(),
            boxed,
            Some(Arc::clone(self) as Arc<dyn ResourceHandler>),
        );
        self.state.lock().bindings.insert(pid, Binding::default());
        pid
    }

    /// Create a process that requests a specific core (the program knows
    /// best).
    pub fn create_process_on<P: Process + 'static>(
        self: &Arc<Self>,
        manager: &ProcessManager,
        resource: ResourceId,
        process: P,
    ) -> ProcessResult<Pid> {
        if resource >= self.num_resources() {
            return Err(ProcessError::NoSuchResource(resource));
        }
        let pid = self.create_process(manager, process);
        self.state.lock().bindings.insert(
            pid,
            Binding {
                requested: Some(resource),
                assigned: None,
            },
        );
        Ok(pid)
    }

    /// Schedule a created process after the engine's minimum lookahead
    /// delay, read at call time.
    pub fn schedule_process(&self, manager: &ProcessManager, pid: Pid) -> ProcessResult<()> {
        let delay = manager.engine().min_delay();
        manager.schedule(pid, delay, None)
    }

    /// Schedule a created process after `delay` ticks.
    pub fn schedule_process_in(
        &self,
        manager: &ProcessManager,
        pid: Pid,
        delay: SimTime,
    ) -> ProcessResult<()> {
        manager.schedule(pid, delay, None)
    }

    /// Unbind `pid` from its core, mark the core idle, and hand it to the
    /// next occupant: the core's own private queue first, then the shared
    /// ready queue. The next occupant is bound immediately but resumes
    /// only after the minimum lookahead delay; a handoff is an event of
    /// its own, never a same-instant re-entrant switch.
    fn free_resource(&self, manager: &ProcessManager, pid: Pid) -> ProcessResult<()> {
        let handoff = {
            let mut guard = self.state.lock();
            let SystemState {
                resources,
                ready,
                bindings,
            } = &mut *guard;
            let rid = match bindings.get_mut(&pid).and_then(|b| b.assigned.take()) {
                Some(rid) => rid,
                None => return Ok(()),
            };
            let resource = resources
                .get_mut(rid)
                .ok_or(ProcessError::NoSuchResource(rid))?;
            resource.clear();
            match resource.pop_next().or_else(|| ready.pop_front()) {
                Some(next) => {
                    resource.seize(next);
                    bindings.entry(next).or_default().assigned = Some(rid);
                    Some((next, rid))
                }
                None => None,
            }
        };
        if let Some((next, rid)) = handoff {
            debug!("core {} handed to process {}", rid, next);
            manager.grant_wake(next)?;
        }
        Ok(())
    }
}

impl ResourceHandler for System {
    fn assign(&self, manager: &ProcessManager, pid: Pid) -> ProcessResult<()> {
        let run_now = {
            let mut guard = self.state.lock();
            let SystemState {
                resources,
                ready,
                bindings,
            } = &mut *guard;
            let binding = bindings.get_mut(&pid).ok_or(ProcessError::NotFound(pid))?;
            if binding.assigned.is_some() {
                // Resuming on the core it already holds.
                true
            } else if let Some(rid) = binding.requested {
                let resource = resources
                    .get_mut(rid)
                    .ok_or(ProcessError::NoSuchResource(rid))?;
                if resource.is_busy() {
                    debug!("core {} busy: process {} joins its private queue", rid, pid);
                    resource.enqueue(pid);
                    false
                } else {
                    resource.seize(pid);
                    binding.assigned = Some(rid);
                    true
                }
            } else if !ready.is_empty() {
                // Unserved generic demand already queued: preserve
                // arrival order even if an idle core exists.
                ready.push_back(pid);
                false
            } else if let Some(rid) = resources.iter().position(|r| !r.is_busy()) {
                resources[rid].seize(pid);
                binding.assigned = Some(rid);
                true
            } else {
                debug!("all cores busy: process {} joins the ready queue", pid);
                ready.push_back(pid);
                false
            }
        };
        if run_now {
            manager.switch_into(pid)
        } else {
            manager
                .table()
                .set_state(pid, ProcessState::WaitingOnResource)?;
            Ok(())
        }
    }

    fn release(&self, manager: &ProcessManager, pid: Pid) -> ProcessResult<()> {
        self.free_resource(manager, pid)
    }

    fn end_process(&self, manager: &ProcessManager, pid: Pid) -> ProcessResult<()> {
        manager.table().process(pid)?.lock().end();
        let held = {
            let state = self.state.lock();
            state
                .bindings
                .get(&pid)
                .map_or(false, |b| b.assigned.is_some())
        };
        if held {
            return self.free_resource(manager, pid);
        }
        // Held no core: it may still be sitting in a queue (a queued,
        // never-run process can be killed).
        let mut guard = self.state.lock();
        let SystemState {
            resources, ready, ..
        } = &mut *guard;
        let before = ready.len();
        ready.retain(|&p| p != pid);
        let mut found = before != ready.len();
        if !found {
            found = resources.iter_mut().any(|r| r.remove_queued(pid));
        }
        if !found {
            debug!("process {} ended holding no core and queued nowhere", pid);
        }
        Ok(())
    }

    fn wait_on(
        &self,
        manager: &ProcessManager,
        pid: Pid,
        resource: ResourceId,
    ) -> ProcessResult<()> {
        let granted = {
            let mut guard = self.state.lock();
            let SystemState {
                resources,
                bindings,
                ..
            } = &mut *guard;
            let res = resources
                .get_mut(resource)
                .ok_or(ProcessError::NoSuchResource(resource))?;
            if !res.is_busy() && res.queue_len() == 0 {
                res.seize(pid);
                bindings.entry(pid).or_default().assigned = Some(resource);
                true
            } else {
                res.enqueue(pid);
                false
            }
        };
        if granted {
            manager.grant_wake(pid)?;
        }
        Ok(())
    }

    fn adopt(&self, pid: Pid) {
        self.state.lock().bindings.entry(pid).or_default();
    }
}
