//! Logical tasks and structured scopes.
//!
//! This module defines the core abstractions used by the runtime to
//! represent, schedule, and observe logical tasks:
//! - task state management,
//! - waker integration with the scheduler's parked set,
//! - task handles for awaiting a single result,
//! - task scopes, which own every task submitted into them.
//!
//! Most users interact with this module through
//! [`Runtime::open_scope`](crate::Runtime::open_scope),
//! [`TaskScope::submit`] and [`TaskHandle::join`].

pub(crate) mod core;
pub(crate) mod handle;
pub(crate) mod scope;
pub(crate) mod state;
pub(crate) mod waker;

pub(crate) use self::core::{Header, Runnable, Task};

pub use handle::{Joined, TaskHandle};
pub use scope::{Closing, FailurePolicy, TaskScope};
pub use state::{ScopeId, ScopeState, TaskId, TaskStatus};

pub use crate::runtime::yield_now::yield_now;

use crate::runtime::context::with_current_task;

/// Returns `true` if cancellation was requested for the task currently
/// being polled on this thread, or if its runtime is shutting down.
///
/// Cancellation is cooperative: a long-running body that never suspends
/// can use this as an explicit check and return early. Outside of a task
/// this always returns `false`.
pub fn is_cancelled() -> bool {
    with_current_task(|task| task.is_some_and(|task| task.cancel_pending()))
}

/// Identifier of the task currently being polled on this thread.
pub fn current_id() -> Option<TaskId> {
    with_current_task(|task| task.map(|task| task.header().id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::enter_task;
    use crate::runtime::scheduler::Scheduler;

    use std::io;
    use std::sync::{Arc, Weak};

    fn task(scheduler: &Arc<Scheduler>) -> Arc<dyn Runnable> {
        let work = async { Ok::<_, io::Error>(()) };
        Arc::new(Task::new(TaskId(1), work, scheduler.clone(), Weak::new()))
    }

    #[test]
    fn test_is_cancelled_outside_a_task() {
        assert!(!is_cancelled());
    }

    #[test]
    fn test_is_cancelled_observes_shutdown() {
        let scheduler = Arc::new(Scheduler::new(None));
        let task = task(&scheduler);

        assert!(!enter_task(task.clone(), is_cancelled));

        scheduler.shutdown();
        assert!(enter_task(task, is_cancelled));
    }
}
