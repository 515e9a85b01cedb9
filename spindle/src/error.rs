//! Error types shared by the scheduler, scopes and handles.
//!
//! Failures of individual tasks ([`TaskError`]) stay attached to their
//! [`TaskHandle`](crate::task::TaskHandle) until somebody observes them,
//! either by joining the handle or by closing the owning scope. Everything
//! else surfaces through the top-level [`Error`].

use crate::task::{ScopeId, ScopeState, TaskId};

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// A boxed error produced by a unit of work.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A task could not be submitted.
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// A task failed, panicked or was cancelled.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// One or more tasks of a collect-all scope failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// A bounded wait elapsed before the awaited work was terminal.
    #[error("wait timed out after {0:?}")]
    Timeout(Duration),

    /// A blocking wait was attempted on a carrier thread.
    #[error("blocking wait attempted on carrier thread {0}")]
    CarrierBlocked(usize),

    /// A carrier loop crashed outside of any task body.
    #[error("scheduler fatal error: {0}")]
    Fatal(String),

    /// A runtime thread could not be started.
    #[error("failed to spawn runtime thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Reasons a submission is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("scope {scope} is {state} and rejects new tasks")]
    ScopeClosed { scope: ScopeId, state: ScopeState },

    #[error("ready queue is full ({capacity} tasks)")]
    Saturated { capacity: usize },

    #[error("runtime is shut down")]
    Shutdown,
}

/// The failure outcome of a single task.
///
/// Stored in the task's result slot and cloned out to every observer.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The unit of work returned an error.
    #[error("task {id} failed: {source}")]
    Failed {
        id: TaskId,
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The unit of work panicked.
    #[error("task {id} panicked: {message}")]
    Panicked { id: TaskId, message: Arc<str> },

    /// The task was cancelled before or during execution.
    #[error("task {id} was cancelled")]
    Cancelled { id: TaskId },
}

impl TaskError {
    pub(crate) fn failed(id: TaskId, source: BoxError) -> Self {
        Self::Failed {
            id,
            source: Arc::from(source),
        }
    }

    /// Identifier of the task this error belongs to.
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Failed { id, .. } | Self::Panicked { id, .. } | Self::Cancelled { id } => *id,
        }
    }

    /// Returns `true` for [`TaskError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Every failure observed by a collect-all scope, in submission order.
#[derive(Debug, Clone, Error)]
#[error("{} task(s) failed; first: {}", .failures.len(), first(&.failures))]
pub struct AggregateError {
    pub failures: Vec<TaskError>,
}

fn first(failures: &[TaskError]) -> String {
    failures
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> Arc<str> {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Arc::from(*s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        Arc::from(s.as_str())
    } else {
        Arc::from("opaque panic payload")
    }
}
