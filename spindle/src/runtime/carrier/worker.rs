use crate::runtime::context::CURRENT_CARRIER;
use crate::runtime::scheduler::SchedulerHandle;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// What a carrier thread is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarrierState {
    /// Waiting for a runnable task.
    Idle,

    /// Polling a task body.
    Running,

    /// Leaving its loop because the runtime is shutting down, or because
    /// the loop itself failed.
    Draining,
}

/// Observable state of one carrier, shared with the pool.
pub(crate) struct CarrierSlot {
    state: AtomicU8,
}

impl CarrierSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(CarrierState::Idle as u8),
        }
    }

    pub(crate) fn set(&self, state: CarrierState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn get(&self) -> CarrierState {
        match self.state.load(Ordering::Acquire) {
            0 => CarrierState::Idle,
            1 => CarrierState::Running,
            _ => CarrierState::Draining,
        }
    }
}

/// A carrier thread of the pool.
///
/// A `Carrier` repeatedly takes the oldest runnable task from the
/// scheduler and polls it once. A task that suspends is handed back to the
/// scheduler, so the carrier is immediately free for the next one. It owns
/// at most one task at a time.
pub(crate) struct Carrier {
    /// Unique identifier of the carrier.
    id: usize,

    slot: Arc<CarrierSlot>,

    scheduler: SchedulerHandle,
}

impl Carrier {
    pub(crate) fn new(id: usize, slot: Arc<CarrierSlot>, scheduler: SchedulerHandle) -> Self {
        Self {
            id,
            slot,
            scheduler,
        }
    }

    /// Runs the carrier loop until a shutdown signal is received.
    ///
    /// # Execution loop
    ///
    /// - Take the next task from the ready queue and run one slice of it
    /// - Otherwise, park until work becomes available
    ///
    /// Task bodies are polled under `catch_unwind` by the task itself; a
    /// panic escaping this loop is a scheduler failure.
    pub(crate) fn run(&self, shutdown: &AtomicBool) {
        CURRENT_CARRIER.with(|id| id.set(Some(self.id)));

        tracing::trace!(carrier = self.id, "started");

        loop {
            if shutdown.load(Ordering::Acquire) {
                self.slot.set(CarrierState::Draining);
                break;
            }

            match self.scheduler.next() {
                Some(task) => {
                    self.slot.set(CarrierState::Running);
                    task.run();
                    self.slot.set(CarrierState::Idle);
                }
                None => self.scheduler.wait_for_work(),
            }
        }

        tracing::trace!(carrier = self.id, "stopped");
    }
}
