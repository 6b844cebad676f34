//! # Fixed-Delay Retry
//!
//! Tracks reconnect attempts for a watch session. Every reconnect waits the
//! same delay, so the worst-case reconnect latency is exactly the configured
//! `retryDelaySec`.

use std::time::Duration;

/// Fixed-delay retry counter
///
/// The counter increases once per reconnect attempt, whatever triggered it
/// (resync, network error, stale cursor), and is reset once a stream has
/// proven healthy by delivering a well-formed event.
#[derive(Debug, Clone)]
pub struct FixedRetry {
    /// Maximum number of attempts, `None` for unlimited
    max_attempts: Option<u32>,
    /// Delay before every attempt
    delay: Duration,
    /// Attempts made since the last reset
    attempts: u32,
}

impl FixedRetry {
    /// Create a retry counter with an optional attempt limit and a fixed delay
    #[must_use]
    pub fn new(max_attempts: Option<u32>, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            attempts: 0,
        }
    }

    /// Whether another attempt is allowed
    pub fn can_retry(&self) -> bool {
        self.max_attempts.is_none_or(|max| self.attempts < max)
    }

    /// Record an attempt and return its 1-based number
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Attempts made since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay to wait before the next attempt
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Reset the counter after a healthy stream
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
