//! Bounded retry of conflicting mutations
//!
//! A mutation attempt that loses a race fails with `WriteConflict`. The whole
//! attempt (reads, checks and writes) is re-run against fresh state, up to
//! `max_retries` more times. Any other error ends the loop immediately, as
//! does the caller's deadline or cancellation.

use docmaster_core::{CallContext, MasterError, MasterResult};
use std::time::Duration;
use tracing::warn;

/// Retry settings with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: usize,
    /// Base delay between retries in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay_ms: 0,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Create a new RetryConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a RetryConfig with no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between retries
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delay before retry number `attempt + 1`
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let shift = attempt.min(63);
        let multiplier = 1u64 << shift;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// How one attempt ended
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    /// Committed; stop with this value
    Committed(T),
    /// Lost a race; run again if attempts remain
    Conflict(MasterError),
    /// Failed for a reason retrying cannot fix
    Terminal(MasterError),
}

impl<T> AttemptOutcome<T> {
    /// Classify the result of an attempt
    pub fn classify(result: MasterResult<T>) -> Self {
        match result {
            Ok(value) => AttemptOutcome::Committed(value),
            Err(e) if e.is_conflict() => AttemptOutcome::Conflict(e),
            Err(e) => AttemptOutcome::Terminal(e),
        }
    }
}

/// Run `attempt` until it commits, fails terminally, or retries run out
///
/// `attempt` receives the zero-based attempt number. `on_retry` is told about
/// every conflict that will be retried. When retries are exhausted the last
/// conflict is returned.
///
/// # Errors
///
/// The terminal error, the caller's interruption, or the last `WriteConflict`.
pub fn run_with_retry<T>(
    config: &RetryConfig,
    operation: &'static str,
    context: &CallContext,
    mut attempt: impl FnMut(usize) -> MasterResult<T>,
    mut on_retry: impl FnMut(&MasterError),
) -> MasterResult<T> {
    let mut last_conflict = None;

    for n in 0..=config.max_retries {
        context.check(operation)?;

        match AttemptOutcome::classify(attempt(n)) {
            AttemptOutcome::Committed(value) => return Ok(value),
            AttemptOutcome::Terminal(e) => return Err(e),
            AttemptOutcome::Conflict(e) => {
                if n < config.max_retries {
                    warn!(
                        target: "docmaster::master",
                        operation,
                        attempt = n + 1,
                        max_retries = config.max_retries,
                        error = %e,
                        "write conflict, retrying"
                    );
                    on_retry(&e);
                    let delay = config.calculate_delay(n);
                    if !delay.is_zero() {
                        let delay = context.remaining().map_or(delay, |left| delay.min(left));
                        std::thread::sleep(delay);
                    }
                }
                last_conflict = Some(e);
            }
        }
    }

    Err(last_conflict.unwrap_or_else(|| {
        MasterError::internal(format!("{} made no attempt", operation))
    }))
}
