use crate::utils::{lock, wait, wait_timeout};

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::Waker;
use std::time::Instant;

/// An entry in the timer queue.
///
/// `TimerEntry` represents a scheduled wake-up at a specific deadline.
/// The entry may be cancelled before it fires.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,

    /// Registration order, breaks ties between equal deadlines.
    seq: u64,

    /// Waker to notify when the deadline is reached.
    pub(crate) waker: Waker,

    /// Cancellation flag shared with the associated sleep future.
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline, then by registration.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// behaves as a min-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Timers {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
    shutdown: bool,
}

/// Fires the deadlines registered by [`Sleep`](super::Sleep) futures.
///
/// The driver runs on its own thread so that a sleeping task never holds a
/// carrier: the task is parked and its waker is called once the deadline
/// passes.
pub(crate) struct TimerDriver {
    timers: Mutex<Timers>,
    condvar: Condvar,
}

impl TimerDriver {
    pub(crate) fn new() -> Self {
        Self {
            timers: Mutex::new(Timers {
                heap: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn register(&self, deadline: Instant, waker: Waker, cancelled: Arc<AtomicBool>) {
        let mut timers = lock(&self.timers);

        let seq = timers.next_seq;
        timers.next_seq += 1;

        let earliest = timers.heap.peek().is_none_or(|first| deadline < first.deadline);

        timers.heap.push(TimerEntry {
            deadline,
            seq,
            waker,
            cancelled,
        });

        if earliest {
            self.condvar.notify_one();
        }
    }

    /// Runs the driver loop until [`shutdown`](Self::shutdown) is called.
    pub(crate) fn run(&self) {
        let mut timers = lock(&self.timers);

        loop {
            if timers.shutdown {
                break;
            }

            let now = Instant::now();
            let mut due = Vec::new();

            while let Some(first) = timers.heap.peek() {
                if first.cancelled.load(AtomicOrdering::Acquire) {
                    timers.heap.pop();
                } else if first.deadline <= now {
                    if let Some(entry) = timers.heap.pop() {
                        due.push(entry.waker);
                    }
                } else {
                    break;
                }
            }

            if !due.is_empty() {
                drop(timers);

                for waker in due {
                    waker.wake();
                }

                timers = lock(&self.timers);
                continue;
            }

            timers = match timers.heap.peek().map(|first| first.deadline) {
                Some(deadline) => wait_timeout(&self.condvar, timers, deadline - now).0,
                None => wait(&self.condvar, timers),
            };
        }

        let dropped = timers.heap.len();
        timers.heap.clear();

        tracing::trace!(dropped, "timer driver stopped");
    }

    pub(crate) fn shutdown(&self) {
        lock(&self.timers).shutdown = true;
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::task::Wake;
    use std::thread;
    use std::time::Duration;

    struct Counter(AtomicUsize);

    impl Wake for Counter {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    #[test]
    fn test_fires_due_timers_and_skips_cancelled_ones() {
        let driver = Arc::new(TimerDriver::new());
        let counter = Arc::new(Counter(AtomicUsize::new(0)));

        let runner = {
            let driver = driver.clone();
            thread::spawn(move || driver.run())
        };

        let soon = Instant::now() + Duration::from_millis(10);
        let cancelled = Arc::new(AtomicBool::new(true));

        driver.register(soon, Waker::from(counter.clone()), Arc::new(AtomicBool::new(false)));
        driver.register(soon, Waker::from(counter.clone()), cancelled);

        thread::sleep(Duration::from_millis(100));
        driver.shutdown();
        runner.join().unwrap();

        assert_eq!(counter.0.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_earlier_deadline_pops_first() {
        let now = Instant::now();
        let noop = Waker::noop().clone();
        let flag = Arc::new(AtomicBool::new(false));

        let mut heap = BinaryHeap::new();
        for (seq, offset) in [(0, 30), (1, 10), (2, 20), (3, 10)] {
            heap.push(TimerEntry {
                deadline: now + Duration::from_millis(offset),
                seq,
                waker: noop.clone(),
                cancelled: flag.clone(),
            });
        }

        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|e| e.seq)).collect();
        assert_eq!(order, vec![1, 3, 2, 0]);
    }
}
