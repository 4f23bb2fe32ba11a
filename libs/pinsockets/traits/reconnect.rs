use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// Implement this trait to control how the client should
/// behave after a failed connection attempt or a dropped session.
///
/// The connection owns the retry counter; strategies are stateless and
/// only map a counter value to a delay.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Arguments
    /// * `retry_count` - Consecutive failures so far, already including the
    ///   one that triggered this call (so never 0)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stop reconnecting
    fn next_delay(&self, retry_count: usize) -> Option<Duration>;

    /// Check if we should continue reconnecting
    fn should_reconnect(&self, retry_count: usize) -> bool;
}

/// Linear backoff reconnection strategy
///
/// Delay grows by `step` per consecutive failure and is capped at `max_delay`:
/// `min(step * retry_count, max_delay)`.
///
/// The default (1s step, 10s cap, unlimited attempts) retries forever. Against a
/// server whose key will never match the pin this keeps failing every 10 seconds,
/// emitting a `Failure` event each time; use [`LinearBackoff::bounded`] to stop.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    step: Duration,
    max_delay: Duration,
    max_attempts: Option<usize>,
}

impl LinearBackoff {
    /// Create a new linear backoff strategy
    ///
    /// # Arguments
    /// * `step` - Delay added per consecutive failure
    /// * `max_delay` - The maximum delay between reconnects
    /// * `max_attempts` - Maximum number of reconnects (None = unlimited)
    pub fn new(step: Duration, max_delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            step,
            max_delay,
            max_attempts,
        }
    }

    /// Default delays, but give up after `max_attempts` consecutive failures
    pub fn bounded(max_attempts: usize) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(10_000), None)
    }
}

impl ReconnectionStrategy for LinearBackoff {
    fn next_delay(&self, retry_count: usize) -> Option<Duration> {
        if !self.should_reconnect(retry_count) {
            return None;
        }

        let step_ms = self.step.as_millis() as u64;
        let delay = step_ms.saturating_mul(retry_count as u64);
        Some(Duration::from_millis(delay.min(self.max_delay.as_millis() as u64)))
    }

    fn should_reconnect(&self, retry_count: usize) -> bool {
        self.max_attempts.map_or(true, |max| retry_count <= max)
    }
}

/// Fixed delay reconnection strategy
///
/// Always waits the same amount of time between reconnection attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
}

impl FixedDelay {
    /// Create a new fixed delay strategy
    ///
    /// # Arguments
    /// * `delay` - The fixed delay between reconnects
    /// * `max_attempts` - Maximum number of reconnects (None = unlimited)
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self { delay, max_attempts }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, retry_count: usize) -> Option<Duration> {
        if !self.should_reconnect(retry_count) {
            return None;
        }
        Some(self.delay)
    }

    fn should_reconnect(&self, retry_count: usize) -> bool {
        self.max_attempts.map_or(true, |max| retry_count <= max)
    }
}

/// Never reconnect strategy
///
/// The first failure ends the session
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _retry_count: usize) -> Option<Duration> {
        None
    }

    fn should_reconnect(&self, _retry_count: usize) -> bool {
        false
    }
}
