//! Scheduling of logical tasks onto carriers.
//!
//! This module holds the data structures every carrier shares:
//! - [`ready`]: the FIFO queue of runnable tasks, optionally bounded for
//!   fresh submissions,
//! - [`core`]: the scheduler itself, which owns the parked set and moves
//!   tasks between the ready queue and the parked set.

pub(crate) mod core;
pub(crate) mod ready;

pub(crate) use self::core::{Scheduler, SchedulerHandle};
