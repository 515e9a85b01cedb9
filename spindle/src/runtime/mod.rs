//! Core runtime components.
//!
//! It is responsible for:
//! - running logical tasks on a fixed pool of carrier threads,
//! - keeping runnable tasks in FIFO order and suspended tasks parked,
//! - providing runtime context and task-local facilities,
//! - enabling cooperative multitasking via yielding.
//!
//! Most users will interact with [`Runtime`], [`TaskScope`](task::TaskScope)
//! and [`TaskHandle`](task::TaskHandle) rather than with the pieces below.

mod carrier;
mod core;
mod scheduler;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod yield_now;

pub mod task;

pub use self::core::{Handle, Runtime};
pub use builder::RuntimeBuilder;
pub use carrier::CarrierState;
