/*!
 * Process Types
 * States, errors, and metadata for simulated processes
 */

use crate::core::types::{Pid, ResourceId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process operation result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Process and scheduler errors.
///
/// Protocol violations (invalid transitions, operations issued by the
/// wrong coroutine, duplicate activation) indicate a defect in the
/// simulation model and are surfaced as `Err` so the host can abort the
/// run with full context. Benign redundant operations (stale wake, kill
/// of an inactive process) are logged and never reach this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("process {0} not found in process table")]
    NotFound(Pid),

    #[error("process {pid} ({name}) is {state:?}: cannot {op}")]
    InvalidState {
        pid: Pid,
        name: &'static str,
        state: ProcessState,
        op: &'static str,
    },

    #[error("process {pid} ({name}) is {state:?}: must be inactive to be scheduled")]
    AlreadyLive {
        pid: Pid,
        name: &'static str,
        state: ProcessState,
    },

    #[error("{op} issued for process {pid} while {current:?} is the active coroutine")]
    NotCurrent {
        pid: Pid,
        current: Option<Pid>,
        op: &'static str,
    },

    #[error("process {0} cannot kill itself or its own subtree")]
    SelfKill(Pid),

    #[error("process {pid} is already awaited by process {waiter}")]
    AlreadyAwaited { pid: Pid, waiter: Pid },

    #[error("unexpected {event} for process {pid} ({name}) in state {state:?}")]
    UnexpectedEvent {
        event: &'static str,
        pid: Pid,
        name: &'static str,
        state: ProcessState,
    },

    #[error("no coroutine bound to process {pid} ({name})")]
    LostCoroutine { pid: Pid, name: &'static str },

    #[error("failed to start coroutine for process {pid} ({name}): {reason}")]
    SpawnFailed {
        pid: Pid,
        name: &'static str,
        reason: String,
    },

    #[error("resource {0} does not exist")]
    NoSuchResource(ResourceId),

    #[error("process {pid} has no resource scheduler: cannot {op}")]
    NoResourceHandler { pid: Pid, op: &'static str },
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Activation message posted, not yet delivered
    Scheduled,
    /// Coroutine currently running (at most one system-wide)
    Active,
    /// Suspended until a wake message arrives
    Sleeping,
    /// Suspended until the awaited process completes
    WaitingForChild,
    /// Suspended until a resource is granted
    WaitingOnResource,
    /// Created but never scheduled, finished, or killed
    Inactive,
}

impl ProcessState {
    /// A live record may not be scheduled again and is killable.
    pub fn is_live(&self) -> bool {
        !matches!(self, ProcessState::Inactive)
    }
}

/// Process metadata snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: &'static str,
    pub state: ProcessState,
    pub parent: Option<Pid>,
    pub children: Vec<Pid>,
}
