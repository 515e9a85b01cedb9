use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future that gives up its carrier exactly once.
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    /// On the first poll the task wakes itself and returns `Pending`, which
    /// sends it to the back of the ready queue. The second poll completes.
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            return Poll::Ready(());
        }

        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Suspends the current task once, letting every task that was already
/// ready run before it continues.
///
/// This is also where a pending cancellation request is observed: a
/// cancelled task does not resume after yielding.
///
/// # Examples
///
/// ```rust,ignore
/// scope.submit(async {
///     for chunk in work {
///         process(chunk);
///         yield_now().await;
///     }
///     Ok::<_, std::io::Error>(())
/// })?;
/// ```
pub async fn yield_now() {
    YieldNow { yielded: false }.await
}
