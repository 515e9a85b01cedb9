use crate::runtime::task::Task;

use std::sync::Arc;
use std::task::{Wake, Waker};

/// Waking a task hands it back to its scheduler: a parked task moves to the
/// ready queue, a running task is marked so it is re-queued once its
/// current poll returns, anything else is left untouched.
impl<T: Send + Sync + 'static> Wake for Task<T> {
    fn wake(self: Arc<Self>) {
        Task::reschedule(self);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        Task::reschedule(self.clone());
    }
}

/// Creates the [`Waker`] handed to a task's body while it is polled.
///
/// The waker keeps the task alive, so a parked task stays reachable from
/// whatever resource it is suspended on.
pub(crate) fn make_waker<T: Send + Sync + 'static>(task: Arc<Task<T>>) -> Waker {
    Waker::from(task)
}
