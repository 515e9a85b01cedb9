use super::state::TaskStatus;
use super::{Runnable, Task, TaskId};
use crate::error::{Error, Result, TaskError};
use crate::runtime::context::current_carrier;
use crate::utils::{lock, wait, wait_timeout};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// A handle to a submitted task.
///
/// The handle is a view onto the task's write-once result slot: joining
/// never moves the value out, so any number of joins return the same
/// outcome.
///
/// Dropping the handle does **not** cancel the task; it only discards the
/// ability to observe its result. The owning scope still waits for it.
pub struct TaskHandle<T> {
    /// Shared reference to the underlying task.
    task: Arc<Task<T>>,
}

impl<T: Send + Sync + 'static> TaskHandle<T> {
    pub(crate) fn new(task: Arc<Task<T>>) -> Self {
        Self { task }
    }

    pub fn id(&self) -> TaskId {
        self.task.header.id
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_raw(self.task.state())
    }

    /// Returns `true` once the task is completed, failed or cancelled.
    pub fn is_done(&self) -> bool {
        self.task.result.get().is_some()
    }

    /// Requests cancellation of the task.
    ///
    /// A task that has not started yet is cancelled immediately and its
    /// body never runs. A running task is cancelled at its next suspension
    /// point; if it completes first, the request has no effect.
    pub fn cancel(&self) {
        let task: Arc<dyn Runnable> = self.task.clone();
        task.cancel();
    }

    /// Returns the outcome without blocking, if the task is terminal.
    pub fn try_join(&self) -> Option<Result<&T, TaskError>> {
        self.task.result.get().map(outcome)
    }

    /// Blocks the calling thread until the task is terminal.
    ///
    /// # Errors
    ///
    /// - [`Error::Task`] with the task's failure or cancellation,
    /// - [`Error::CarrierBlocked`] when called on a carrier thread; use
    ///   [`joined`](Self::joined) inside tasks instead.
    pub fn join(&self) -> Result<&T> {
        self.join_deadline(None)
    }

    /// Like [`join`](Self::join), but gives up after `timeout`.
    ///
    /// An expired wait only affects the caller: the task keeps running
    /// unless it is cancelled separately.
    pub fn join_timeout(&self, timeout: Duration) -> Result<&T> {
        self.join_deadline(Some((Instant::now() + timeout, timeout)))
    }

    fn join_deadline(&self, deadline: Option<(Instant, Duration)>) -> Result<&T> {
        if let Some(result) = self.task.result.get() {
            return outcome(result).map_err(Error::Task);
        }

        if let Some(carrier) = current_carrier() {
            return Err(Error::CarrierBlocked(carrier));
        }

        let mut waiters = lock(&self.task.waiters);

        loop {
            if let Some(result) = self.task.result.get() {
                return outcome(result).map_err(Error::Task);
            }

            match deadline {
                None => waiters = wait(&self.task.done, waiters),
                Some((deadline, timeout)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::Timeout(timeout));
                    }

                    waiters = wait_timeout(&self.task.done, waiters, deadline - now).0;
                }
            }
        }
    }

    /// Returns a future resolving to the task's outcome.
    ///
    /// Awaiting it from inside another task is a suspension point: the
    /// awaiting task is parked, not its carrier.
    pub fn joined(&self) -> Joined<'_, T> {
        Joined { task: &self.task }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.task.header.id)
            .finish_non_exhaustive()
    }
}

fn outcome<T>(result: &Result<T, TaskError>) -> Result<&T, TaskError> {
    result.as_ref().map_err(Clone::clone)
}

/// Future returned by [`TaskHandle::joined`].
pub struct Joined<'a, T> {
    task: &'a Arc<Task<T>>,
}

impl<'a, T> Future for Joined<'a, T> {
    type Output = Result<&'a T, TaskError>;

    /// Polls the task's result slot.
    ///
    /// The waker is registered **before** re-checking the slot to avoid
    /// missed wake-ups.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let task = self.task;

        if let Some(result) = task.result.get() {
            return Poll::Ready(outcome(result));
        }

        lock(&task.waiters).push(cx.waker().clone());

        if let Some(result) = task.result.get() {
            return Poll::Ready(outcome(result));
        }

        Poll::Pending
    }
}
