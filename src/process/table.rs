/*!
 * Process Table
 * Arena of scheduler-private per-process records
 */

use super::coroutine::Coroutine;
use super::traits::{Process, ResourceHandler};
use super::types::{ProcessError, ProcessInfo, ProcessResult, ProcessState};
use crate::core::types::Pid;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Scheduler-private bookkeeping for one process.
///
/// Owned exclusively by the table; the process object itself has no
/// ownership relationship to the manager beyond being referenced here.
pub(crate) struct ProcessRecord {
    pub(crate) state: ProcessState,
    pub(crate) name: &'static str,
    pub(crate) process: Arc<Mutex<dyn Process>>,
    pub(crate) coroutine: Option<Coroutine>,
    pub(crate) parent: Option<Pid>,
    pub(crate) children: Vec<Pid>,
    pub(crate) waiting_for: Option<Pid>,
    pub(crate) waiter: Option<Pid>,
    pub(crate) handler: Option<Arc<dyn ResourceHandler>>,
}

/// Process table: stable integer handles mapping to records.
///
/// Helpers copy values out instead of returning guards; callers must
/// never hold a table entry across a coroutine switch.
pub(crate) struct ProcessTable {
    entries: DashMap<Pid, ProcessRecord>,
    next_pid: AtomicU32,
}

impl ProcessTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_pid: AtomicU32::new(1),
        }
    }

    /// Register a new process in the dormant (Inactive) state.
    pub(crate) fn insert(
        &self,
        name: &'static str,
        process: Arc<Mutex<dyn Process>>,
        handler: Option<Arc<dyn ResourceHandler>>,
    ) -> Pid {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(
            pid,
            ProcessRecord {
                state: ProcessState::Inactive,
                name,
                process,
                coroutine: None,
                parent: None,
                children: Vec::new(),
                waiting_for: None,
                waiter: None,
                handler,
            },
        );
        pid
    }

    pub(crate) fn contains(&self, pid: Pid) -> bool {
        self.entries.contains_key(&pid)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn state(&self, pid: Pid) -> ProcessResult<ProcessState> {
        self.entries
            .get(&pid)
            .map(|r| r.state)
            .ok_or(ProcessError::NotFound(pid))
    }

    /// Set the state, returning the previous one.
    pub(crate) fn set_state(&self, pid: Pid, state: ProcessState) -> ProcessResult<ProcessState> {
        let mut record = self.entries.get_mut(&pid).ok_or(ProcessError::NotFound(pid))?;
        Ok(std::mem::replace(&mut record.state, state))
    }

    pub(crate) fn name(&self, pid: Pid) -> &'static str {
        self.entries.get(&pid).map(|r| r.name).unwrap_or("<unknown>")
    }

    pub(crate) fn process(&self, pid: Pid) -> ProcessResult<Arc<Mutex<dyn Process>>> {
        self.entries
            .get(&pid)
            .map(|r| Arc::clone(&r.process))
            .ok_or(ProcessError::NotFound(pid))
    }

    pub(crate) fn handler(&self, pid: Pid) -> Option<Arc<dyn ResourceHandler>> {
        self.entries.get(&pid).and_then(|r| r.handler.clone())
    }

    pub(crate) fn take_coroutine(&self, pid: Pid) -> ProcessResult<Option<Coroutine>> {
        let mut record = self.entries.get_mut(&pid).ok_or(ProcessError::NotFound(pid))?;
        Ok(record.coroutine.take())
    }

    pub(crate) fn put_coroutine(&self, pid: Pid, coroutine: Coroutine) -> ProcessResult<()> {
        let mut record = self.entries.get_mut(&pid).ok_or(ProcessError::NotFound(pid))?;
        record.coroutine = Some(coroutine);
        Ok(())
    }

    pub(crate) fn set_parent(&self, pid: Pid, parent: Option<Pid>) -> ProcessResult<()> {
        let mut record = self.entries.get_mut(&pid).ok_or(ProcessError::NotFound(pid))?;
        record.parent = parent;
        Ok(())
    }

    /// Track `child` under `parent` for recursive teardown.
    pub(crate) fn add_child(&self, parent: Pid, child: Pid) -> ProcessResult<()> {
        let mut record = self
            .entries
            .get_mut(&parent)
            .ok_or(ProcessError::NotFound(parent))?;
        if !record.children.contains(&child) {
            record.children.push(child);
        }
        Ok(())
    }

    pub(crate) fn children(&self, pid: Pid) -> Vec<Pid> {
        self.entries
            .get(&pid)
            .map(|r| r.children.clone())
            .unwrap_or_default()
    }

    pub(crate) fn waiting_for(&self, pid: Pid) -> ProcessResult<Option<Pid>> {
        self.entries
            .get(&pid)
            .map(|r| r.waiting_for)
            .ok_or(ProcessError::NotFound(pid))
    }

    pub(crate) fn set_waiting_for(&self, pid: Pid, target: Option<Pid>) -> ProcessResult<()> {
        let mut record = self.entries.get_mut(&pid).ok_or(ProcessError::NotFound(pid))?;
        record.waiting_for = target;
        Ok(())
    }

    pub(crate) fn waiter(&self, pid: Pid) -> ProcessResult<Option<Pid>> {
        self.entries
            .get(&pid)
            .map(|r| r.waiter)
            .ok_or(ProcessError::NotFound(pid))
    }

    pub(crate) fn set_waiter(&self, pid: Pid, waiter: Option<Pid>) -> ProcessResult<()> {
        let mut record = self.entries.get_mut(&pid).ok_or(ProcessError::NotFound(pid))?;
        record.waiter = waiter;
        Ok(())
    }

    pub(crate) fn take_waiter(&self, pid: Pid) -> ProcessResult<Option<Pid>> {
        let mut record = self.entries.get_mut(&pid).ok_or(ProcessError::NotFound(pid))?;
        Ok(record.waiter.take())
    }

    pub(crate) fn info(&self, pid: Pid) -> Option<ProcessInfo> {
        self.entries.get(&pid).map(|r| ProcessInfo {
            pid,
            name: r.name,
            state: r.state,
            parent: r.parent,
            children: r.children.clone(),
        })
    }
}
