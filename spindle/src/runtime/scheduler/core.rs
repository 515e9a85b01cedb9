use super::ready::{ReadyQueue, Rejected};
use crate::error::SubmissionError;
use crate::runtime::task::state::{NOTIFIED, PARKED, QUEUED, RUNNING};
use crate::runtime::task::{Header, Runnable, TaskId};
use crate::utils::lock;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Shared handle to the scheduler.
pub(crate) type SchedulerHandle = Arc<Scheduler>;

/// Owner of every logical task that is not currently on a carrier.
///
/// Runnable tasks wait in the FIFO [`ReadyQueue`]; suspended tasks sit in
/// the parked set until a waker moves them back. Transitions into and out
/// of the parked set happen under the same lock, so a wake-up racing with
/// a task that is just suspending is never lost.
pub(crate) struct Scheduler {
    ready: ReadyQueue,

    parked: Mutex<HashMap<TaskId, Arc<dyn Runnable>>>,

    next_id: AtomicU64,

    /// First fatal carrier failure, if any.
    fatal: OnceLock<String>,
}

impl Scheduler {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            ready: ReadyQueue::new(capacity),
            parked: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            fatal: OnceLock::new(),
        }
    }

    pub(crate) fn next_task_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Enqueues a freshly submitted task.
    ///
    /// The task must already be in the `QUEUED` state.
    pub(crate) fn submit(&self, task: Arc<dyn Runnable>) -> Result<(), SubmissionError> {
        match self.ready.submit(task) {
            Ok(()) => Ok(()),
            Err(Rejected::Full(_)) => Err(SubmissionError::Saturated {
                capacity: self.ready_capacity(),
            }),
            Err(Rejected::Shutdown(_)) => Err(SubmissionError::Shutdown),
        }
    }

    /// Takes the next task for an idle carrier.
    pub(crate) fn next(&self) -> Option<Arc<dyn Runnable>> {
        self.ready.pop()
    }

    pub(crate) fn wait_for_work(&self) {
        self.ready.park();
    }

    /// Records a task whose poll returned `Pending`.
    ///
    /// If the task was woken while it was running it goes straight back to
    /// the ready queue instead.
    pub(crate) fn park(&self, task: Arc<dyn Runnable>) {
        let header = task.header();
        let mut parked = lock(&self.parked);

        if header
            .state
            .compare_exchange(RUNNING, PARKED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::trace!(task = %header.id, "parked");
            parked.insert(header.id, task);
            return;
        }

        drop(parked);

        // Woken while running. A cancellation request is the usual cause and
        // is honoured here rather than after another trip through the queue.
        header.state.store(QUEUED, Ordering::Release);

        if header.cancel_requested.load(Ordering::Acquire) {
            task.cancel();
        } else {
            self.requeue(task);
        }
    }

    /// Moves a parked task back to the ready queue, preserving its resume
    /// point. Waking a running task marks it so it is re-queued after its
    /// current poll.
    pub(crate) fn wake(&self, task: Arc<dyn Runnable>) {
        let header = task.header();

        loop {
            match header.state.load(Ordering::Acquire) {
                PARKED => {
                    let mut parked = lock(&self.parked);

                    if header
                        .state
                        .compare_exchange(PARKED, QUEUED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        parked.remove(&header.id);
                        drop(parked);

                        self.requeue(task);
                        return;
                    }
                }
                RUNNING => {
                    if header
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                // Queued, already notified or terminal: nothing to do.
                _ => return,
            }
        }
    }

    /// Takes exclusive ownership of a parked task.
    ///
    /// Returns `true` if the task was parked; it is then `RUNNING` and no
    /// longer reachable from the parked set.
    pub(crate) fn claim_parked(&self, header: &Header) -> bool {
        let mut parked = lock(&self.parked);

        if header
            .state
            .compare_exchange(PARKED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            parked.remove(&header.id);
            return true;
        }

        false
    }

    fn requeue(&self, task: Arc<dyn Runnable>) {
        if let Err(Rejected::Shutdown(task) | Rejected::Full(task)) = self.ready.push(task) {
            task.cancel();
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.ready.is_shutdown()
    }

    /// Stops accepting work and wakes every carrier.
    ///
    /// Tasks still queued are cancelled.
    pub(crate) fn shutdown(&self) {
        for task in self.ready.shutdown() {
            task.cancel();
        }
    }

    /// Cancels every task left in the parked set.
    ///
    /// Called once all carriers have stopped.
    pub(crate) fn cancel_parked(&self) {
        let parked: Vec<_> = lock(&self.parked).values().cloned().collect();

        if !parked.is_empty() {
            tracing::debug!(count = parked.len(), "cancelling parked tasks");
        }

        for task in parked {
            task.cancel();
        }
    }

    pub(crate) fn report_fatal(&self, message: String) {
        let _ = self.fatal.set(message);
    }

    pub(crate) fn fatal(&self) -> Option<&str> {
        self.fatal.get().map(String::as_str)
    }

    pub(crate) fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub(crate) fn parked_len(&self) -> usize {
        lock(&self.parked).len()
    }

    fn ready_capacity(&self) -> usize {
        self.ready.capacity().unwrap_or(usize::MAX)
    }
}
