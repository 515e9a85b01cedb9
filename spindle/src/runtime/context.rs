use crate::runtime::Handle;
use crate::runtime::task::Runnable;

use std::cell::{Cell, RefCell};
use std::sync::Arc;

thread_local! {
    /// Thread-local handle to the runtime owning the current carrier.
    ///
    /// This allows runtime components (timers, nested scopes) to reach the
    /// runtime without explicit parameter passing.
    pub(crate) static CURRENT_HANDLE: RefCell<Option<Handle>> =
        const { RefCell::new(None) };

    /// Thread-local identifier of the current carrier thread.
    pub(crate) static CURRENT_CARRIER: Cell<Option<usize>> =
        const { Cell::new(None) };

    /// The task whose body is being polled on this thread.
    pub(crate) static CURRENT_TASK: RefCell<Option<Arc<dyn Runnable>>> =
        const { RefCell::new(None) };
}

/// Enters the runtime execution context for the current thread.
///
/// The handle is installed for the duration of the closure `f`. After the
/// closure completes, the previous context is restored.
pub(crate) fn enter_context<R>(handle: Handle, f: impl FnOnce() -> R) -> R {
    let prev = CURRENT_HANDLE.with(|h| h.replace(Some(handle)));
    let out = f();
    CURRENT_HANDLE.with(|h| h.replace(prev));

    out
}

/// Marks `task` as the one being polled while `f` runs.
///
/// `f` must not unwind; task bodies are polled under `catch_unwind`.
pub(crate) fn enter_task<R>(task: Arc<dyn Runnable>, f: impl FnOnce() -> R) -> R {
    let prev = CURRENT_TASK.with(|t| t.replace(Some(task)));
    let out = f();
    CURRENT_TASK.with(|t| t.replace(prev));

    out
}

/// Returns the identifier of the carrier running on this thread, if any.
pub(crate) fn current_carrier() -> Option<usize> {
    CURRENT_CARRIER.with(Cell::get)
}

pub(crate) fn current_handle() -> Option<Handle> {
    CURRENT_HANDLE.with(|h| h.borrow().clone())
}

pub(crate) fn with_current_task<R>(f: impl FnOnce(Option<&Arc<dyn Runnable>>) -> R) -> R {
    CURRENT_TASK.with(|t| f(t.borrow().as_ref()))
}
