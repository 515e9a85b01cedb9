use super::state::is_terminal;
use super::{Runnable, ScopeId, ScopeState, Task, TaskHandle, TaskId};
use crate::error::{AggregateError, BoxError, Error, Result, SubmissionError, TaskError};
use crate::runtime::context::current_carrier;
use crate::runtime::scheduler::SchedulerHandle;
use crate::utils::{lock, wait_timeout};

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::{Duration, Instant};

/// How often a blocked `close` re-checks the scheduler for a fatal error.
const FATAL_POLL: Duration = Duration::from_millis(20);

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// How a scope reacts to failing tasks when it is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FailurePolicy {
    /// The first task to fail or be cancelled cancels every other pending
    /// task; `close` reports that first failure.
    #[default]
    FailFast,

    /// Every task runs to a terminal state; `close` reports all failures
    /// together.
    CollectAll,
}

/// Mutable bookkeeping of a scope, guarded by one lock.
struct ScopeInner {
    state: ScopeState,

    /// Registered tasks that are not yet terminal.
    pending: usize,

    /// Every task submitted while the scope was open.
    registry: HashMap<TaskId, Arc<dyn Runnable>>,

    /// Fail-fast: the failure that tripped the scope.
    first_failure: Option<TaskError>,

    /// Collect-all: every failure, reported in submission order.
    failures: Vec<TaskError>,

    /// Futures awaiting `pending == 0`.
    close_waiters: Vec<Waker>,
}

/// State shared between a [`TaskScope`] and the tasks registered in it.
pub(crate) struct ScopeShared {
    id: ScopeId,
    policy: FailurePolicy,
    scheduler: SchedulerHandle,
    inner: Mutex<ScopeInner>,

    /// Signalled whenever `pending` drops to zero.
    drained: Condvar,
}

enum Drain {
    Drained,
    TimedOut,
    Fatal(String),
}

impl ScopeShared {
    /// Called by a task once it reached a terminal state.
    pub(crate) fn task_finished(&self, id: TaskId, failure: Option<TaskError>) {
        let (to_cancel, waiters) = {
            let mut inner = lock(&self.inner);
            inner.pending = inner.pending.saturating_sub(1);

            let mut to_cancel = Vec::new();

            if let Some(err) = failure {
                match self.policy {
                    FailurePolicy::FailFast if inner.first_failure.is_none() => {
                        tracing::debug!(scope = %self.id, task = %id, "fail-fast tripped");

                        inner.first_failure = Some(err);
                        to_cancel = live_tasks(&inner.registry);
                    }
                    FailurePolicy::FailFast => {}
                    FailurePolicy::CollectAll => inner.failures.push(err),
                }
            }

            let waiters = if inner.pending == 0 {
                self.drained.notify_all();
                mem::take(&mut inner.close_waiters)
            } else {
                Vec::new()
            };

            (to_cancel, waiters)
        };

        for task in to_cancel {
            task.cancel();
        }

        for waker in waiters {
            waker.wake();
        }
    }

    /// Moves an open scope to `Closing`. Idempotent.
    fn begin_close(&self) {
        let mut inner = lock(&self.inner);

        if inner.state == ScopeState::Open {
            tracing::debug!(scope = %self.id, pending = inner.pending, "closing");
            inner.state = ScopeState::Closing;
        }
    }

    fn cancel_all(&self) {
        let tasks = live_tasks(&lock(&self.inner).registry);

        for task in tasks {
            task.cancel();
        }
    }

    /// Blocks until no registered task is pending.
    fn wait_drained(&self, deadline: Option<Instant>) -> Drain {
        let mut inner = lock(&self.inner);

        loop {
            if inner.pending == 0 {
                return Drain::Drained;
            }

            if let Some(message) = self.scheduler.fatal() {
                return Drain::Fatal(message.to_owned());
            }

            let wait_for = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Drain::TimedOut;
                    }
                    (deadline - now).min(FATAL_POLL)
                }
                None => FATAL_POLL,
            };

            inner = wait_timeout(&self.drained, inner, wait_for).0;
        }
    }

    /// Marks the scope closed, releases the registry and applies the
    /// failure policy. Only the first call does any work.
    fn teardown(&self) -> Result<()> {
        let mut inner = lock(&self.inner);

        if inner.state == ScopeState::Closed {
            return Ok(());
        }

        inner.state = ScopeState::Closed;
        let submitted = inner.registry.len();
        inner.registry.clear();

        tracing::debug!(scope = %self.id, submitted, "closed");

        match self.policy {
            FailurePolicy::FailFast => match inner.first_failure.take() {
                Some(err) => Err(Error::Task(err)),
                None => Ok(()),
            },
            FailurePolicy::CollectAll => {
                let mut failures = mem::take(&mut inner.failures);

                if failures.is_empty() {
                    return Ok(());
                }

                failures.sort_by_key(TaskError::task_id);
                Err(Error::Aggregate(AggregateError { failures }))
            }
        }
    }

    /// Rolls back a registration whose enqueue was refused.
    fn reject(&self, task: &Arc<dyn Runnable>) {
        let header = task.header();

        // If a canceller finished the task meanwhile, `task_finished` has
        // already settled the pending count.
        let owned = header
            .state
            .compare_exchange(
                super::state::QUEUED,
                super::state::CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        let waiters = {
            let mut inner = lock(&self.inner);
            inner.registry.remove(&header.id);

            if owned {
                inner.pending = inner.pending.saturating_sub(1);
            }

            if inner.pending == 0 {
                self.drained.notify_all();
                mem::take(&mut inner.close_waiters)
            } else {
                Vec::new()
            }
        };

        for waker in waiters {
            waker.wake();
        }
    }
}

fn live_tasks(registry: &HashMap<TaskId, Arc<dyn Runnable>>) -> Vec<Arc<dyn Runnable>> {
    registry
        .values()
        .filter(|task| !is_terminal(task.header().state.load(Ordering::Acquire)))
        .cloned()
        .collect()
}

/// A structured-concurrency scope.
///
/// Tasks are submitted into an open scope and receive a [`TaskHandle`].
/// Closing the scope stops further submissions and blocks until every
/// registered task is terminal, then reports failures according to the
/// scope's [`FailurePolicy`].
///
/// A scope is torn down exactly once: the first `close*` call reports the
/// failures, later calls return `Ok(())`. Dropping an unclosed scope
/// performs the same wait; when the drop happens during a panic, pending
/// tasks are cancelled first so that no task outlives its scope.
///
/// Carrier threads never block on a scope. Closing or dropping a scope
/// from inside a task cancels its pending tasks instead of waiting for
/// them; use [`close_async`](Self::close_async) to wait from a task.
/// The guarantee that no task outlives its scope therefore holds only when
/// the scope is closed or dropped off-carrier, or closed through
/// `close_async`: a task cancelled mid-slice on another carrier may finish
/// after the scope is already `Closed`.
///
/// # Examples
///
/// ```rust,ignore
/// let scope = runtime.open_scope();
///
/// let handles: Vec<_> = (0..100)
///     .map(|i| scope.submit(async move { Ok::<_, std::io::Error>(i * 2) }))
///     .collect::<Result<_, _>>()?;
///
/// scope.close()?;
/// assert_eq!(*handles[21].join()?, 42);
/// ```
pub struct TaskScope {
    shared: Arc<ScopeShared>,
}

impl TaskScope {
    pub(crate) fn open(scheduler: SchedulerHandle, policy: FailurePolicy) -> Self {
        let id = ScopeId(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed));

        tracing::debug!(scope = %id, ?policy, "opened");

        Self {
            shared: Arc::new(ScopeShared {
                id,
                policy,
                scheduler,
                inner: Mutex::new(ScopeInner {
                    state: ScopeState::Open,
                    pending: 0,
                    registry: HashMap::new(),
                    first_failure: None,
                    failures: Vec::new(),
                    close_waiters: Vec::new(),
                }),
                drained: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.shared.id
    }

    pub fn policy(&self) -> FailurePolicy {
        self.shared.policy
    }

    pub fn state(&self) -> ScopeState {
        lock(&self.shared.inner).state
    }

    /// Number of registered tasks that are not yet terminal.
    pub fn pending(&self) -> usize {
        lock(&self.shared.inner).pending
    }

    /// Submits a unit of work and returns a handle to its eventual result.
    ///
    /// The call never blocks. The task is registered with this scope and
    /// queued behind every task submitted before it.
    ///
    /// # Errors
    ///
    /// - [`SubmissionError::ScopeClosed`] if the scope is no longer open,
    /// - [`SubmissionError::Saturated`] if the ready queue is bounded and full,
    /// - [`SubmissionError::Shutdown`] if the runtime has shut down.
    pub fn submit<F, T, E>(&self, work: F) -> Result<TaskHandle<T>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let shared = &self.shared;
        let id = shared.scheduler.next_task_id();

        let task = Arc::new(Task::new(
            id,
            work,
            shared.scheduler.clone(),
            Arc::downgrade(shared),
        ));

        let tripped = {
            let mut inner = lock(&shared.inner);

            if inner.state != ScopeState::Open {
                return Err(SubmissionError::ScopeClosed {
                    scope: shared.id,
                    state: inner.state,
                }
                .into());
            }

            inner.pending += 1;
            inner.registry.insert(id, task.clone());

            shared.policy == FailurePolicy::FailFast && inner.first_failure.is_some()
        };

        if tripped {
            // A sibling already failed; the task is cancelled before it runs.
            task.clone().cancel();
            return Ok(TaskHandle::new(task));
        }

        if task.mark_runnable() {
            if let Err(err) = shared.scheduler.submit(task.clone()) {
                let runnable: Arc<dyn Runnable> = task;
                shared.reject(&runnable);
                return Err(err.into());
            }

            tracing::trace!(scope = %shared.id, task = %id, "submitted");
        }

        Ok(TaskHandle::new(task))
    }

    /// Requests cancellation of every task that is not yet terminal.
    pub fn cancel_all(&self) {
        self.shared.cancel_all();
    }

    /// Closes the scope and blocks until every registered task is terminal.
    ///
    /// # Errors
    ///
    /// - fail-fast: the first failure or cancellation, as [`Error::Task`],
    /// - collect-all: every failure, as [`Error::Aggregate`],
    /// - [`Error::CarrierBlocked`] if called on a carrier thread; pending
    ///   tasks are then cancelled instead of awaited,
    /// - [`Error::Fatal`] if the scheduler lost a carrier.
    pub fn close(&self) -> Result<()> {
        self.close_inner(None)
    }

    /// Like [`close`](Self::close), but gives up waiting after `timeout`.
    ///
    /// On expiry every pending task is cancelled and awaited before the
    /// scope is closed, and [`Error::Timeout`] is returned.
    pub fn close_timeout(&self, timeout: Duration) -> Result<()> {
        self.close_inner(Some(timeout))
    }

    /// Closes the scope from inside a task without blocking its carrier.
    ///
    /// Awaiting the returned future is a suspension point: the calling task
    /// is parked until every task of this scope is terminal.
    pub fn close_async(&self) -> Closing<'_> {
        Closing { scope: self }
    }

    fn close_inner(&self, timeout: Option<Duration>) -> Result<()> {
        let shared = &self.shared;

        shared.begin_close();

        if let Some(carrier) = current_carrier() {
            shared.cancel_all();
            let _ = shared.teardown();

            return Err(Error::CarrierBlocked(carrier));
        }

        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        match shared.wait_drained(deadline) {
            Drain::Drained => shared.teardown(),
            Drain::TimedOut => {
                tracing::debug!(scope = %shared.id, "close timed out, cancelling pending tasks");

                shared.cancel_all();
                let drained = shared.wait_drained(None);
                let _ = shared.teardown();

                match drained {
                    Drain::Fatal(message) => Err(Error::Fatal(message)),
                    _ => Err(Error::Timeout(timeout.unwrap_or_default())),
                }
            }
            Drain::Fatal(message) => {
                let _ = shared.teardown();
                Err(Error::Fatal(message))
            }
        }
    }
}

impl fmt::Debug for TaskScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScope")
            .field("id", &self.shared.id)
            .field("policy", &self.shared.policy)
            .finish_non_exhaustive()
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        let shared = &self.shared;

        if lock(&shared.inner).state == ScopeState::Closed {
            return;
        }

        shared.begin_close();

        let on_carrier = current_carrier().is_some();

        if thread::panicking() || on_carrier {
            shared.cancel_all();
        }

        if !on_carrier && let Drain::Fatal(message) = shared.wait_drained(None) {
            tracing::error!(scope = %shared.id, %message, "scope dropped after scheduler failure");
        }

        if let Err(err) = shared.teardown() {
            tracing::warn!(scope = %shared.id, %err, "scope dropped with unobserved failures");
        }
    }
}

/// Future returned by [`TaskScope::close_async`].
pub struct Closing<'a> {
    scope: &'a TaskScope,
}

impl Future for Closing<'_> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let shared = &self.scope.shared;

        shared.begin_close();

        {
            let mut inner = lock(&shared.inner);

            if inner.state == ScopeState::Closed {
                return Poll::Ready(Ok(()));
            }

            if inner.pending > 0 {
                if let Some(message) = shared.scheduler.fatal() {
                    drop(inner);
                    let _ = shared.teardown();
                    return Poll::Ready(Err(Error::Fatal(message.to_owned())));
                }

                // Registered under the lock so the last `task_finished`
                // cannot slip in between the check and the registration.
                inner.close_waiters.push(cx.waker().clone());
                return Poll::Pending;
            }
        }

        Poll::Ready(shared.teardown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::scheduler::Scheduler;
    use crate::task::TaskStatus;

    use std::io;

    fn scope(policy: FailurePolicy, capacity: Option<usize>) -> TaskScope {
        TaskScope::open(Arc::new(Scheduler::new(capacity)), policy)
    }

    fn idle() -> impl Future<Output = Result<(), io::Error>> + Send + 'static {
        async { Ok(()) }
    }

    #[test]
    fn test_cancel_all_settles_pending_without_carriers() {
        let scope = scope(FailurePolicy::FailFast, None);

        let handles: Vec<_> = (0..3).map(|_| scope.submit(idle()).unwrap()).collect();
        assert_eq!(scope.pending(), 3);

        scope.cancel_all();

        assert_eq!(scope.pending(), 0);
        assert!(handles.iter().all(|h| h.status() == TaskStatus::Cancelled));
        assert!(matches!(
            scope.close(),
            Err(Error::Task(TaskError::Cancelled { .. }))
        ));
    }

    #[test]
    fn test_collect_all_orders_failures_by_task_id() {
        let scope = scope(FailurePolicy::CollectAll, None);
        let shared = &scope.shared;

        lock(&shared.inner).pending = 2;
        shared.task_finished(TaskId(7), Some(TaskError::Cancelled { id: TaskId(7) }));
        shared.task_finished(TaskId(3), Some(TaskError::Cancelled { id: TaskId(3) }));

        let Err(Error::Aggregate(aggregate)) = scope.close() else {
            panic!("expected an aggregate error");
        };

        let ids: Vec<_> = aggregate.failures.iter().map(TaskError::task_id).collect();
        assert_eq!(ids, vec![TaskId(3), TaskId(7)]);
    }

    #[test]
    fn test_tripped_scope_cancels_new_submissions() {
        let scope = scope(FailurePolicy::FailFast, None);

        lock(&scope.shared.inner).pending = 1;
        scope
            .shared
            .task_finished(TaskId(1), Some(TaskError::Cancelled { id: TaskId(1) }));

        let handle = scope.submit(idle()).unwrap();

        assert_eq!(handle.status(), TaskStatus::Cancelled);
        assert_eq!(scope.pending(), 0);
    }

    #[test]
    fn test_saturated_submission_is_rolled_back() {
        let scope = scope(FailurePolicy::FailFast, Some(1));

        scope.submit(idle()).unwrap();
        let err = scope.submit(idle()).unwrap_err();

        assert!(matches!(
            err,
            Error::Submission(SubmissionError::Saturated { capacity: 1 })
        ));
        assert_eq!(scope.pending(), 1);
        assert_eq!(lock(&scope.shared.inner).registry.len(), 1);

        scope.cancel_all();
    }

    #[test]
    fn test_teardown_runs_once() {
        let scope = scope(FailurePolicy::FailFast, None);

        scope.submit(idle()).unwrap();
        scope.cancel_all();

        assert!(scope.close().is_err());
        assert_eq!(scope.state(), ScopeState::Closed);
        assert!(scope.close().is_ok());
    }

    #[test]
    fn test_fatal_scheduler_fails_blocked_close() {
        let scope = scope(FailurePolicy::FailFast, None);

        let handle = scope.submit(idle()).unwrap();
        scope
            .shared
            .scheduler
            .report_fatal("carrier 0 crashed: boom".into());

        let Err(Error::Fatal(message)) = scope.close() else {
            panic!("expected a fatal error");
        };
        assert_eq!(message, "carrier 0 crashed: boom");
        assert_eq!(scope.state(), ScopeState::Closed);
        assert_eq!(handle.status(), TaskStatus::Runnable);

        handle.cancel();
        assert_eq!(scope.pending(), 0);
    }

    #[test]
    fn test_fatal_scheduler_fails_close_async() {
        let scope = scope(FailurePolicy::CollectAll, None);

        let handle = scope.submit(idle()).unwrap();
        scope
            .shared
            .scheduler
            .report_fatal("carrier 1 crashed: boom".into());

        let mut closing = scope.close_async();
        let mut cx = Context::from_waker(Waker::noop());

        assert!(matches!(
            Pin::new(&mut closing).poll(&mut cx),
            Poll::Ready(Err(Error::Fatal(_)))
        ));
        assert_eq!(scope.state(), ScopeState::Closed);

        handle.cancel();
    }
}
