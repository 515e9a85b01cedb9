use crate::runtime::task::Runnable;
use crate::utils::{lock, wait_timeout};

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Upper bound on how long an idle carrier sleeps before re-checking the
/// shutdown flag.
const PARK_TIMEOUT: Duration = Duration::from_millis(10);

/// Why a task could not be pushed.
pub(crate) enum Rejected {
    /// The submission bound is reached.
    Full(Arc<dyn Runnable>),

    /// The scheduler is shutting down.
    Shutdown(Arc<dyn Runnable>),
}

struct Queue {
    tasks: VecDeque<Arc<dyn Runnable>>,
    shutdown: bool,
}

/// FIFO queue of runnable tasks shared by all carriers.
///
/// Tasks are pushed at the back and carriers take them from the front, so
/// among tasks that are ready at the same time the one pushed first is
/// dispatched first.
///
/// The queue also coordinates carrier parking through a condition variable.
pub(crate) struct ReadyQueue {
    queue: Mutex<Queue>,

    /// Bound applied to fresh submissions only.
    capacity: Option<usize>,

    /// Condition variable used to wake parked carriers.
    condvar: Condvar,
}

impl ReadyQueue {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
                shutdown: false,
            }),
            capacity,
            condvar: Condvar::new(),
        }
    }

    /// Pushes a freshly submitted task, honouring the capacity bound.
    pub(crate) fn submit(&self, task: Arc<dyn Runnable>) -> Result<(), Rejected> {
        let mut queue = lock(&self.queue);

        if queue.shutdown {
            return Err(Rejected::Shutdown(task));
        }

        if let Some(capacity) = self.capacity
            && queue.tasks.len() >= capacity
        {
            return Err(Rejected::Full(task));
        }

        queue.tasks.push_back(task);
        drop(queue);

        self.condvar.notify_one();
        Ok(())
    }

    /// Re-queues a woken task. Wake-ups are never refused for capacity.
    pub(crate) fn push(&self, task: Arc<dyn Runnable>) -> Result<(), Rejected> {
        let mut queue = lock(&self.queue);

        if queue.shutdown {
            return Err(Rejected::Shutdown(task));
        }

        queue.tasks.push_back(task);
        drop(queue);

        self.condvar.notify_one();
        Ok(())
    }

    /// Takes the oldest ready task.
    pub(crate) fn pop(&self) -> Option<Arc<dyn Runnable>> {
        lock(&self.queue).tasks.pop_front()
    }

    /// Parks the current carrier until work arrives or shutdown begins.
    ///
    /// The wait is bounded so a carrier never sleeps through a shutdown.
    pub(crate) fn park(&self) {
        let queue = lock(&self.queue);

        if queue.shutdown || !queue.tasks.is_empty() {
            return;
        }

        let _ = wait_timeout(&self.condvar, queue, PARK_TIMEOUT);
    }

    pub(crate) fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.queue).tasks.len()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        lock(&self.queue).shutdown
    }

    /// Refuses further pushes, wakes every carrier and hands back whatever
    /// was still queued.
    pub(crate) fn shutdown(&self) -> Vec<Arc<dyn Runnable>> {
        let mut queue = lock(&self.queue);
        queue.shutdown = true;
        let leftover = queue.tasks.drain(..).collect();
        drop(queue);

        self.condvar.notify_all();
        leftover
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::task::{Header, TaskId};

    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct Stub(Header);

    impl Runnable for Stub {
        fn header(&self) -> &Header {
            &self.0
        }

        fn run(self: Arc<Self>) {}

        fn cancel(self: Arc<Self>) {}

        fn cancel_pending(&self) -> bool {
            false
        }
    }

    fn stub(id: u64) -> Arc<dyn Runnable> {
        Arc::new(Stub(Header {
            id: TaskId(id),
            state: AtomicUsize::new(0),
            cancel_requested: AtomicBool::new(false),
        }))
    }

    fn id(task: Option<Arc<dyn Runnable>>) -> Option<u64> {
        task.map(|t| t.header().id.as_u64())
    }

    #[test]
    fn test_pops_in_push_order() {
        let queue = ReadyQueue::new(None);

        for i in 1..=3 {
            assert!(queue.submit(stub(i)).is_ok());
        }

        assert_eq!(id(queue.pop()), Some(1));
        assert_eq!(id(queue.pop()), Some(2));
        assert_eq!(id(queue.pop()), Some(3));
        assert_eq!(id(queue.pop()), None);
    }

    #[test]
    fn test_capacity_bounds_submissions_only() {
        let queue = ReadyQueue::new(Some(1));

        assert!(queue.submit(stub(1)).is_ok());
        assert!(matches!(queue.submit(stub(2)), Err(Rejected::Full(_))));

        // Wake-ups are never refused for capacity.
        assert!(queue.push(stub(3)).is_ok());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_shutdown_hands_back_leftovers_and_refuses_pushes() {
        let queue = ReadyQueue::new(None);
        assert!(queue.submit(stub(1)).is_ok());

        let leftover = queue.shutdown();

        assert_eq!(leftover.len(), 1);
        assert!(queue.is_shutdown());
        assert!(matches!(queue.push(stub(2)), Err(Rejected::Shutdown(_))));
    }
}
