use crate::runtime::context::current_handle;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Creates a future that completes after the given duration.
///
/// Sleeping is a suspension point: the calling task is parked and its
/// carrier is free to run other tasks until the deadline passes. This is
/// how a task stands in for a blocking operation without pinning a thread.
///
/// # Panics
///
/// Panics if polled outside of a spindle runtime.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// sleep(Duration::from_millis(10)).await;
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(duration)
}

/// A future that completes once a specific deadline is reached.
///
/// The timer is registered with the runtime on first poll and cancelled if
/// the future is dropped before completion, which is what happens when a
/// sleeping task is cancelled.
pub struct Sleep {
    /// Absolute point in time when the sleep completes.
    deadline: Instant,

    /// Whether the timer has already been registered.
    registered: bool,

    /// Cancellation flag shared with the timer driver.
    cancelled: Arc<AtomicBool>,
}

impl Sleep {
    pub(crate) fn new(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
            registered: false,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if Instant::now() >= this.deadline {
            return Poll::Ready(());
        }

        if !this.registered {
            let Some(handle) = current_handle() else {
                panic!("`sleep` polled outside of a spindle runtime");
            };

            this.registered = true;
            handle
                .timers
                .register(this.deadline, cx.waker().clone(), this.cancelled.clone());
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
