//! # Spindle
//!
//! **Spindle** multiplexes a very large number of cheap logical tasks onto a
//! small, fixed pool of carrier threads, and gives every task an owner: the
//! [`TaskScope`](task::TaskScope) it was submitted into. Closing a scope
//! blocks until every task registered in it has completed, failed or been
//! cancelled, so no task outlives the code that started it.
//!
//! It offers:
//!
//! - An **M:N scheduler** with a FIFO ready queue; a suspended task never
//!   occupies a carrier
//! - **Structured scopes** with fail-fast or collect-all failure policies
//! - **Write-once task handles** that can be joined any number of times,
//!   blocking from outside the runtime or as a suspension point from inside
//! - **Cooperative cancellation**, observed at suspension points
//! - **Lazy pipelines** where each stage maps one element to zero, one or
//!   many elements, in order
//! - **Macros** like `#[spindle::main]`, `#[spindle::test]` and `join!`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spindle::RuntimeBuilder;
//! use spindle::time::sleep;
//! use std::time::Duration;
//!
//! let runtime = RuntimeBuilder::new().carrier_count(4).build()?;
//! let scope = runtime.open_scope();
//!
//! let handles = (0..10_000)
//!     .map(|i| {
//!         scope.submit(async move {
//!             sleep(Duration::from_millis(10)).await;
//!             Ok::<_, std::io::Error>(i)
//!         })
//!     })
//!     .collect::<Result<Vec<_>, _>>()?;
//!
//! scope.close()?;
//! assert_eq!(*handles[42].join()?, 42);
//! ```
//!
//! ## Modules
//!
//! - [`task`]: scopes, handles and task-local helpers
//! - [`time`]: sleep and timeout
//! - [`pipeline`]: lazy one-to-many transformation pipelines

mod error;
mod runtime;
mod utils;

pub mod pipeline;
pub mod time;

pub use error::{AggregateError, BoxError, Error, Result, SubmissionError, TaskError};
pub use runtime::task;
pub use runtime::{CarrierState, Handle, Runtime, RuntimeBuilder};

pub use spindle_macros::*;
