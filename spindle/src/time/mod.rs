//! Time utilities.
//!
//! - [`sleep`] parks the calling task until a deadline,
//! - [`timeout`] bounds how long a future may take.
//!
//! Deadlines are fired by a dedicated timer thread owned by the runtime.

pub(crate) mod driver;
mod sleep;
mod timeout;

#[doc(inline)]
pub use sleep::{Sleep, sleep};

#[doc(inline)]
pub use timeout::{Elapsed, Timeout, timeout};
