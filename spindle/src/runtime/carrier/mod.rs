//! Carrier threads.
//!
//! This module contains the real OS threads that execute logical tasks:
//! - [`pool`]: the fixed-size pool and its lifecycle,
//! - [`worker`]: the loop each carrier runs.
//!
//! Together with the scheduler they form an M:N executor: any number of
//! logical tasks share a small, bounded set of carriers.

pub(crate) mod pool;
pub(crate) mod worker;

pub use worker::CarrierState;
