use super::worker::{Carrier, CarrierSlot, CarrierState};
use crate::error::panic_message;
use crate::runtime::Handle;
use crate::runtime::context::enter_context;

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Fixed-size pool of carrier threads.
///
/// The `CarrierPool` is responsible for:
/// - spawning carrier threads,
/// - installing the runtime context on each of them,
/// - turning a crash of a carrier loop into a scheduler-fatal error,
/// - managing orderly shutdown and thread joining.
pub(crate) struct CarrierPool {
    /// Join handles for carrier threads.
    handles: Vec<JoinHandle<()>>,

    slots: Vec<Arc<CarrierSlot>>,

    /// Shutdown flag shared with all carriers.
    shutdown: Arc<AtomicBool>,
}

impl CarrierPool {
    /// Starts `count` carrier threads named `{name}-{id}`.
    ///
    /// If a thread cannot be spawned, the carriers already started are
    /// stopped and joined before the error is returned.
    pub(crate) fn start(handle: &Handle, count: usize, name: &str) -> io::Result<Self> {
        let mut pool = Self {
            handles: Vec::with_capacity(count),
            slots: Vec::with_capacity(count),
            shutdown: Arc::new(AtomicBool::new(false)),
        };

        for id in 0..count {
            let slot = Arc::new(CarrierSlot::new());
            let carrier = Carrier::new(id, slot.clone(), handle.scheduler.clone());

            let handle = handle.clone();
            let shutdown = pool.shutdown.clone();
            let crashed = slot.clone();

            let spawned = thread::Builder::new()
                .name(format!("{name}-{id}"))
                .spawn(move || {
                    let scheduler = handle.scheduler.clone();

                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        enter_context(handle, || carrier.run(&shutdown));
                    }));

                    if let Err(payload) = outcome {
                        let message = panic_message(payload.as_ref());
                        tracing::error!(carrier = id, %message, "carrier loop crashed");

                        crashed.set(CarrierState::Draining);
                        scheduler.report_fatal(format!("carrier {id} crashed: {message}"));
                    }
                });

            match spawned {
                Ok(join) => {
                    pool.handles.push(join);
                    pool.slots.push(slot);
                }
                Err(err) => {
                    pool.shutdown();
                    pool.join();
                    return Err(err);
                }
            }
        }

        Ok(pool)
    }

    /// Signals all carriers to stop after their current slice.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Waits for all carrier threads to terminate.
    ///
    /// This should be called after initiating shutdown.
    pub(crate) fn join(&mut self) {
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }

    pub(crate) fn states(&self) -> Vec<CarrierState> {
        self.slots.iter().map(|slot| slot.get()).collect()
    }
}
