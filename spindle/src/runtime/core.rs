use super::builder::RuntimeConfig;
use super::carrier::CarrierState;
use super::carrier::pool::CarrierPool;
use super::context::{current_carrier, current_handle};
use super::scheduler::{Scheduler, SchedulerHandle};
use super::task::{FailurePolicy, TaskScope};
use crate::error::{Error, Result, TaskError};
use crate::time::driver::TimerDriver;

use std::convert::Infallible;
use std::future::Future;
use std::panic;
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};

/// A cloneable reference to a running runtime.
///
/// Tasks reach their runtime through [`Handle::current`], for instance to
/// open a nested scope.
#[derive(Clone)]
pub struct Handle {
    pub(crate) scheduler: SchedulerHandle,
    pub(crate) timers: Arc<TimerDriver>,
    default_policy: FailurePolicy,
}

impl Handle {
    /// Returns the handle of the runtime owning the current carrier.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a carrier thread.
    pub fn current() -> Self {
        match Self::try_current() {
            Some(handle) => handle,
            None => panic!("no spindle runtime is running on this thread"),
        }
    }

    pub fn try_current() -> Option<Self> {
        current_handle()
    }

    /// Opens a scope with the runtime's default failure policy.
    pub fn open_scope(&self) -> TaskScope {
        self.open_scope_with(self.default_policy)
    }

    pub fn open_scope_with(&self, policy: FailurePolicy) -> TaskScope {
        TaskScope::open(self.scheduler.clone(), policy)
    }
}

/// The main runtime.
///
/// `Runtime` owns:
/// - a fixed pool of carrier threads,
/// - the scheduler with its ready queue and parked set,
/// - the timer thread backing [`sleep`](crate::time::sleep).
///
/// All work enters through a [`TaskScope`]. Dropping the runtime shuts down
/// all internal components in an orderly fashion; tasks that have not
/// finished by then are cancelled.
pub struct Runtime {
    handle: Handle,

    pool: CarrierPool,

    timer: Option<JoinHandle<()>>,

    stopped: bool,
}

impl Runtime {
    pub(crate) fn new(config: RuntimeConfig) -> Result<Self> {
        let scheduler = Arc::new(Scheduler::new(config.ready_queue_capacity));
        let timers = Arc::new(TimerDriver::new());

        let timer = {
            let timers = timers.clone();
            thread::Builder::new()
                .name(format!("{}-timer", config.thread_name))
                .spawn(move || timers.run())?
        };

        let handle = Handle {
            scheduler,
            timers,
            default_policy: config.failure_policy,
        };

        let pool = match CarrierPool::start(&handle, config.carrier_count, &config.thread_name) {
            Ok(pool) => pool,
            Err(err) => {
                handle.timers.shutdown();
                let _ = timer.join();
                return Err(err.into());
            }
        };

        tracing::debug!(
            carriers = config.carrier_count,
            policy = ?config.failure_policy,
            capacity = ?config.ready_queue_capacity,
            "runtime started"
        );

        Ok(Self {
            handle,
            pool,
            timer: Some(timer),
            stopped: false,
        })
    }

    /// Opens a scope with the runtime's default failure policy.
    pub fn open_scope(&self) -> TaskScope {
        self.handle.open_scope()
    }

    pub fn open_scope_with(&self, policy: FailurePolicy) -> TaskScope {
        self.handle.open_scope_with(policy)
    }

    /// Runs `f` with a freshly opened scope and closes it afterwards, on
    /// every exit path.
    ///
    /// An error returned by `f` takes precedence over the outcome of
    /// closing the scope. If `f` panics, the scope's pending tasks are
    /// cancelled and awaited before the panic continues.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let total = runtime.scope(|scope| {
    ///     let a = scope.submit(async { Ok::<_, io::Error>(1) })?;
    ///     let b = scope.submit(async { Ok::<_, io::Error>(2) })?;
    ///     Ok((a, b))
    /// })?;
    /// ```
    pub fn scope<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&TaskScope) -> Result<R>,
    {
        let scope = self.open_scope();
        let value = f(&scope);
        let closed = scope.close();

        let value = value?;
        closed?;

        Ok(value)
    }

    /// Runs a future to completion as a task, blocking the current thread.
    ///
    /// This is the synchronous entry point of the runtime (e.g. in `main`
    /// or tests). The future runs inside its own scope; its output is sent
    /// back through a channel. A panic inside the future is resumed on the
    /// calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the task cannot be submitted or is cancelled,
    /// for instance because the runtime is shutting down.
    ///
    /// # Panics
    ///
    /// Panics if called from a carrier thread.
    pub fn block_on<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if let Some(carrier) = current_carrier() {
            panic!("`block_on` called from carrier thread {carrier}");
        }

        let (transmitter, receiver) = mpsc::channel();
        let scope = self.open_scope();

        scope.submit(async move {
            let _ = transmitter.send(future.await);
            Ok::<_, Infallible>(())
        })?;

        match scope.close() {
            Ok(()) => receiver
                .try_recv()
                .map_err(|_| Error::Fatal("block_on task finished without output".to_owned())),
            Err(Error::Task(TaskError::Panicked { message, .. })) => {
                panic::resume_unwind(Box::new(message.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Current state of every carrier, indexed by carrier id.
    pub fn carrier_states(&self) -> Vec<CarrierState> {
        self.pool.states()
    }

    /// Shuts the runtime down and reports whether a carrier crashed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fatal`] if the scheduler lost a carrier at any
    /// point.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop();

        match self.handle.scheduler.fatal() {
            Some(message) => Err(Error::Fatal(message.to_owned())),
            None => Ok(()),
        }
    }

    /// Stops the runtime.
    ///
    /// This performs the following steps:
    /// 1. Signals the carriers and closes the ready queue
    /// 2. Joins all carrier threads
    /// 3. Cancels every task still parked
    /// 4. Stops and joins the timer thread
    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let scheduler = &self.handle.scheduler;

        tracing::debug!(
            ready = scheduler.ready_len(),
            parked = scheduler.parked_len(),
            "runtime shutting down"
        );

        self.pool.shutdown();
        scheduler.shutdown();
        self.pool.join();

        scheduler.cancel_parked();

        self.handle.timers.shutdown();
        if let Some(timer) = self.timer.take() {
            let _ = timer.join();
        }

        tracing::debug!("runtime stopped");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::builder::RuntimeBuilder;
    use crate::runtime::task::state::QUEUED;
    use crate::runtime::task::{Header, Runnable, ScopeState, TaskId};

    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::{Duration, Instant};

    /// A runnable that fails outside of any task body.
    struct Crash(Header);

    impl Runnable for Crash {
        fn header(&self) -> &Header {
            &self.0
        }

        fn run(self: Arc<Self>) {
            panic!("scheduler bug");
        }

        fn cancel(self: Arc<Self>) {}

        fn cancel_pending(&self) -> bool {
            false
        }
    }

    fn crash_carrier(rt: &Runtime) {
        let crash = Arc::new(Crash(Header {
            id: TaskId(u64::MAX),
            state: AtomicUsize::new(QUEUED),
            cancel_requested: AtomicBool::new(false),
        }));
        rt.handle.scheduler.submit(crash).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while rt.carrier_states() != [CarrierState::Draining] {
            assert!(Instant::now() < deadline, "carrier never crashed");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_carrier_crash_fails_close_and_shutdown() {
        let rt = RuntimeBuilder::new().carrier_count(1).build().unwrap();

        crash_carrier(&rt);

        let scope = rt.open_scope();
        let handle = scope.submit(async { Ok::<_, io::Error>(()) }).unwrap();

        let Err(Error::Fatal(message)) = scope.close() else {
            panic!("expected a fatal error");
        };
        assert!(message.contains("carrier 0 crashed: scheduler bug"));
        assert_eq!(scope.state(), ScopeState::Closed);
        assert!(!handle.is_done());

        assert!(matches!(rt.shutdown(), Err(Error::Fatal(_))));
        assert!(handle.is_done());
    }
}
