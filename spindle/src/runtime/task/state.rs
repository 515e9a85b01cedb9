use std::fmt;

/// Task has been allocated but not yet handed to the scheduler.
pub(crate) const CREATED: usize = 0;

/// Task is queued for execution.
///
/// The task sits in the ready queue waiting for an idle carrier.
pub(crate) const QUEUED: usize = 1;

/// Task is currently being executed by a carrier.
///
/// At most one thread may observe this state at a time; whoever moved the
/// task into it owns the future.
pub(crate) const RUNNING: usize = 2;

/// Task returned `Poll::Pending` and sits in the scheduler's parked set.
pub(crate) const PARKED: usize = 3;

/// Task has been woken while running.
///
/// The carrier re-queues it once the current poll returns.
pub(crate) const NOTIFIED: usize = 4;

/// Task produced a value.
pub(crate) const COMPLETED: usize = 5;

/// Task produced an error or panicked.
pub(crate) const FAILED: usize = 6;

/// Task was cancelled.
pub(crate) const CANCELLED: usize = 7;

pub(crate) fn is_terminal(state: usize) -> bool {
    state >= COMPLETED
}

/// Externally visible status of a logical task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Created,
    Runnable,
    Running,
    Parked,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub(crate) fn from_raw(state: usize) -> Self {
        match state {
            CREATED => Self::Created,
            QUEUED => Self::Runnable,
            RUNNING | NOTIFIED => Self::Running,
            PARKED => Self::Parked,
            COMPLETED => Self::Completed,
            FAILED => Self::Failed,
            _ => Self::Cancelled,
        }
    }

    /// Returns `true` once the task can no longer change status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Unique identifier of a logical task.
///
/// Identifiers grow monotonically with submission order within a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique identifier of a task scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub(crate) u64);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// Lifecycle of a [`TaskScope`](super::TaskScope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeState {
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        })
    }
}
