use super::Runtime;
use crate::error::Result;
use crate::runtime::task::FailurePolicy;

use std::thread;

/// Default prefix of carrier thread names.
const DEFAULT_THREAD_NAME: &str = "spindle-carrier";

/// Settings a [`Runtime`] is started with.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) carrier_count: usize,
    pub(crate) failure_policy: FailurePolicy,
    pub(crate) ready_queue_capacity: Option<usize>,
    pub(crate) thread_name: String,
}

/// Builder for configuring and creating a runtime.
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .carrier_count(4)
///     .failure_policy(FailurePolicy::CollectAll)
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Creates a new `RuntimeBuilder` with default configuration.
    ///
    /// By default the number of carriers is the number of available logical
    /// CPUs, falling back to `1` if unavailable, scopes are fail-fast and
    /// the ready queue is unbounded.
    pub fn new() -> Self {
        let carrier_count = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            config: RuntimeConfig {
                carrier_count,
                failure_policy: FailurePolicy::default(),
                ready_queue_capacity: None,
                thread_name: DEFAULT_THREAD_NAME.to_owned(),
            },
        }
    }

    /// Sets the number of carrier threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn carrier_count(mut self, n: usize) -> Self {
        assert!(n > 0, "carrier_count must be > 0");

        self.config.carrier_count = n;
        self
    }

    /// Sets the policy of scopes opened without an explicit one.
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Bounds the number of tasks waiting in the ready queue.
    ///
    /// Once the bound is reached, submissions fail with
    /// [`SubmissionError::Saturated`](crate::SubmissionError::Saturated)
    /// instead of blocking. Tasks that were already submitted and are only
    /// being woken up are never refused.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn ready_queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "ready_queue_capacity must be > 0");

        self.config.ready_queue_capacity = Some(capacity);
        self
    }

    /// Sets the name prefix of carrier threads; carriers are named
    /// `{prefix}-{index}`.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name = prefix.into();
        self
    }

    /// Builds the runtime and starts its threads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`](crate::Error::Spawn) if a thread cannot be
    /// started.
    pub fn build(self) -> Result<Runtime> {
        Runtime::new(self.config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
