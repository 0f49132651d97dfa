//! # Fibonacci Backoff
//!
//! Progressive retry delays for optimistic-concurrency conflicts and transient
//! API failures. Grows more slowly than an exponential backoff so a handful of
//! retries stays within a single request budget.
//!
//! ```rust
//! use cnative_deployer::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(100, 1_000);
//! assert_eq!(backoff.next_delay_ms(), 100);
//! assert_eq!(backoff.next_delay_ms(), 100);
//! assert_eq!(backoff.next_delay_ms(), 200);
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator working in milliseconds
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    start_ms: u64,
    prev_ms: u64,
    current_ms: u64,
    max_ms: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(start_ms: u64, max_ms: u64) -> Self {
        Self {
            start_ms,
            prev_ms: 0,
            current_ms: start_ms,
            max_ms,
        }
    }

    /// Return the current delay and advance the sequence, capped at `max_ms`
    pub fn next_delay_ms(&mut self) -> u64 {
        let delay = self.current_ms;
        let next = self.prev_ms.saturating_add(self.current_ms);
        self.prev_ms = self.current_ms;
        self.current_ms = next.min(self.max_ms);
        delay
    }

    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        Duration::from_millis(self.next_delay_ms())
    }

    pub fn reset(&mut self) {
        self.prev_ms = 0;
        self.current_ms = self.start_ms;
    }
}
