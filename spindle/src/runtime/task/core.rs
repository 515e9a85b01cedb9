use super::scope::ScopeShared;
use super::state::{CANCELLED, COMPLETED, CREATED, FAILED, NOTIFIED, PARKED, QUEUED, RUNNING};
use super::waker::make_waker;
use super::TaskId;
use crate::error::{BoxError, TaskError, panic_message};
use crate::runtime::context::enter_task;
use crate::runtime::scheduler::SchedulerHandle;
use crate::utils::lock;

use std::cell::UnsafeCell;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};
use std::task::{Context, Poll, Waker};

/// The boxed body of a logical task.
type Body<T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send>>;

/// Type-erased part of a task, readable by the scheduler and the scope.
pub(crate) struct Header {
    pub(crate) id: TaskId,

    /// Raw lifecycle state, one of the constants in [`super::state`].
    pub(crate) state: AtomicUsize,

    /// Set once by [`Runnable::cancel`]; never cleared.
    pub(crate) cancel_requested: AtomicBool,
}

/// A runnable unit of work that can be executed by the scheduler.
///
/// The `Runnable` trait abstracts the specific return type of a task,
/// allowing the scheduler and scopes to manage a heterogeneous collection
/// of tasks through `Arc<dyn Runnable>`.
pub(crate) trait Runnable: Send + Sync {
    fn header(&self) -> &Header;

    /// Executes one slice of the task on the calling carrier.
    fn run(self: Arc<Self>);

    /// Requests cancellation.
    ///
    /// A task that is not on a carrier is finalized on the spot; a running
    /// task observes the request at its next suspension point.
    fn cancel(self: Arc<Self>);

    /// Whether the task should stop: cancellation was requested or the
    /// runtime is shutting down.
    fn cancel_pending(&self) -> bool;
}

/// A logical task managed by the scheduler.
///
/// A `Task` owns the boxed body, the write-once result slot and the list of
/// observers waiting for that slot to be filled.
pub(crate) struct Task<T> {
    pub(crate) header: Header,

    /// The body, `None` once the task is terminal.
    ///
    /// Only the thread that moved the task into `RUNNING` touches it.
    body: UnsafeCell<Option<Body<T>>>,

    /// Written exactly once, by whoever finalizes the task.
    pub(crate) result: OnceLock<Result<T, TaskError>>,

    scheduler: SchedulerHandle,

    /// Owning scope. Non-owning so a finished scope is not kept alive.
    scope: Weak<ScopeShared>,

    /// Wakers of futures awaiting the result.
    pub(crate) waiters: Mutex<Vec<Waker>>,

    /// Signalled once the result is set, for blocking joins.
    pub(crate) done: Condvar,
}

// Safety: `body` is only accessed by the thread that owns the `RUNNING`
// state, and the result slot requires `T: Sync` to be shared.
unsafe impl<T: Send> Send for Task<T> {}
unsafe impl<T: Send + Sync> Sync for Task<T> {}

impl<T: Send + Sync + 'static> Task<T> {
    /// Creates a task in the `CREATED` state.
    pub(crate) fn new<F, E>(
        id: TaskId,
        work: F,
        scheduler: SchedulerHandle,
        scope: Weak<ScopeShared>,
    ) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let body: Body<T> = Box::pin(async move { work.await.map_err(Into::into) });

        Self {
            header: Header {
                id,
                state: AtomicUsize::new(CREATED),
                cancel_requested: AtomicBool::new(false),
            },
            body: UnsafeCell::new(Some(body)),
            result: OnceLock::new(),
            scheduler,
            scope,
            waiters: Mutex::new(Vec::new()),
            done: Condvar::new(),
        }
    }

    /// Moves a created task to `QUEUED`.
    ///
    /// Fails if the task was cancelled in the meantime.
    pub(crate) fn mark_runnable(&self) -> bool {
        self.header
            .state
            .compare_exchange(CREATED, QUEUED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Performs one slice of execution.
    ///
    /// The task transitions to `RUNNING`, polls its body once and handles
    /// the outcome:
    /// - `Poll::Pending`: the task is parked, or re-queued if it was woken
    ///   while running,
    /// - `Poll::Ready`: the value or error is stored and observers are woken,
    /// - a panic: caught here and stored as [`TaskError::Panicked`].
    ///
    /// A task whose cancellation was requested before this slice is
    /// finalized without touching its body.
    fn run_slice(self: Arc<Self>) {
        if self
            .header
            .state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Claimed by a canceller after it was queued.
            return;
        }

        if self.cancel_pending() {
            self.finish(Err(TaskError::Cancelled { id: self.header.id }));
            return;
        }

        let waker = make_waker(self.clone());
        let mut cx = Context::from_waker(&waker);

        let runnable: Arc<dyn Runnable> = self.clone();
        let polled = enter_task(runnable, || {
            // Safety: the RUNNING state guarantees that no other thread is
            // touching the body.
            let body = unsafe { &mut *self.body.get() };

            panic::catch_unwind(AssertUnwindSafe(|| match body.as_mut() {
                Some(body) => body.as_mut().poll(&mut cx),
                None => Poll::Pending,
            }))
        });

        match polled {
            Ok(Poll::Pending) => {
                if self.cancel_pending() {
                    self.finish(Err(TaskError::Cancelled { id: self.header.id }));
                } else {
                    self.scheduler.clone().park(self);
                }
            }
            Ok(Poll::Ready(Ok(value))) => self.finish(Ok(value)),
            Ok(Poll::Ready(Err(source))) => {
                let id = self.header.id;
                self.finish(Err(TaskError::failed(id, source)));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(task = %self.header.id, %message, "task panicked");

                let id = self.header.id;
                self.finish(Err(TaskError::Panicked { id, message }));
            }
        }
    }

    /// Stores the outcome, notifies every observer and drops the body.
    ///
    /// Must only be called by the thread owning the `RUNNING` state. The
    /// outcome is published before the body is dropped, so a panicking
    /// destructor cannot leave the task non-terminal.
    fn finish(&self, outcome: Result<T, TaskError>) {
        // Safety: see `run_slice`; taking the body here is the end of the
        // exclusive access.
        let body = unsafe { (*self.body.get()).take() };

        let (state, failure) = match &outcome {
            Ok(_) => (COMPLETED, None),
            Err(err) if err.is_cancelled() => (CANCELLED, Some(err.clone())),
            Err(err) => (FAILED, Some(err.clone())),
        };

        let _ = self.result.set(outcome);
        self.header.state.store(state, Ordering::Release);

        tracing::trace!(task = %self.header.id, ?state, "finished");

        let waiters = std::mem::take(&mut *lock(&self.waiters));
        self.done.notify_all();

        for waker in waiters {
            waker.wake();
        }

        if let Some(scope) = self.scope.upgrade() {
            scope.task_finished(self.header.id, failure);
        }

        // Destructors of a suspended body run user code.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| drop(body))) {
            let message = panic_message(payload.as_ref());
            tracing::warn!(task = %self.header.id, %message, "task body panicked while being dropped");
        }
    }

    /// Reschedules the task. Called by its waker.
    pub(crate) fn reschedule(self: Arc<Self>) {
        let scheduler = self.scheduler.clone();
        scheduler.wake(self);
    }

    pub(crate) fn state(&self) -> usize {
        self.header.state.load(Ordering::Acquire)
    }
}

impl<T: Send + Sync + 'static> Runnable for Task<T> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn run(self: Arc<Self>) {
        Task::run_slice(self)
    }

    fn cancel_pending(&self) -> bool {
        self.header.cancel_requested.load(Ordering::Acquire) || self.scheduler.is_shutdown()
    }

    fn cancel(self: Arc<Self>) {
        self.header.cancel_requested.store(true, Ordering::Release);

        loop {
            match self.state() {
                state @ (CREATED | QUEUED) => {
                    if self
                        .header
                        .state
                        .compare_exchange(state, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.finish(Err(TaskError::Cancelled { id: self.header.id }));
                        return;
                    }
                }
                PARKED => {
                    if self.scheduler.claim_parked(&self.header) {
                        self.finish(Err(TaskError::Cancelled { id: self.header.id }));
                        return;
                    }
                }
                RUNNING => {
                    // Observed by the carrier when the current poll returns.
                    if self
                        .header
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }
}
