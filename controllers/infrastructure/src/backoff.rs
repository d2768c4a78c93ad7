//! # Fibonacci Backoff
//!
//! Requeue delays for objects whose last reconciliation failed.
//! Steps are counted in minutes (1m, 1m, 2m, 3m, 5m, 8m, 10m max) and handed
//! out in seconds; a success resets the sequence for that object.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

const MIN_MINUTES: u64 = 1;
const MAX_MINUTES: u64 = 10;

/// Fibonacci backoff calculator
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes,
        }
    }

    /// Current step in seconds; advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result_seconds = self.current_minutes * 60;
        let next_minutes = self.prev_minutes + self.current_minutes;
        self.prev_minutes = self.current_minutes;
        self.current_minutes = std::cmp::min(next_minutes, self.max_minutes);
        result_seconds
    }

    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
    retry_at: Option<Instant>,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(MIN_MINUTES, MAX_MINUTES),
            error_count: 0,
            retry_at: None,
        }
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.retry_at = None;
        self.backoff.reset();
    }
}

/// Per-object backoff, keyed by `kind/namespace/name`
#[derive(Debug, Default)]
pub struct BackoffTracker {
    states: Mutex<HashMap<String, BackoffState>>,
}

impl BackoffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return the delay before the next attempt with the
    /// consecutive failure count
    pub fn record_failure(&self, key: &str, now: Instant) -> (Duration, u32) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(key.to_string()).or_insert_with(BackoffState::new);
        state.error_count += 1;
        let delay = Duration::from_secs(state.backoff.next_backoff_seconds());
        state.retry_at = Some(now + delay);
        (delay, state.error_count)
    }

    /// Time left before a failed object may be retried, if any
    pub fn pending_retry(&self, key: &str, now: Instant) -> Option<Duration> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states
            .get(key)
            .and_then(|s| s.retry_at)
            .map(|retry_at| retry_at.saturating_duration_since(now))
            .filter(|remaining| !remaining.is_zero())
    }

    /// Forget the failures of an object after a success
    pub fn reset(&self, key: &str) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = states.get_mut(key) {
            state.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        let steps: Vec<u64> = (0..9).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(steps, vec![60, 60, 120, 180, 300, 480, 600, 600, 600]);
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();

        backoff.reset();

        assert_eq!(backoff.next_backoff_seconds(), 60);
        assert_eq!(backoff.next_backoff_seconds(), 60);
        assert_eq!(backoff.next_backoff_seconds(), 120);
    }

    #[test]
    fn test_tracker_keys_are_independent() {
        let tracker = BackoffTracker::new();
        let now = Instant::now();
        assert_eq!(tracker.record_failure("a", now), (Duration::from_secs(60), 1));
        assert_eq!(tracker.record_failure("a", now), (Duration::from_secs(60), 2));
        assert_eq!(tracker.record_failure("a", now), (Duration::from_secs(120), 3));
        assert_eq!(tracker.record_failure("b", now), (Duration::from_secs(60), 1));
        assert_eq!(tracker.record_failure("a", now), (Duration::from_secs(180), 4));
    }

    #[test]
    fn test_tracker_reset_restarts_sequence() {
        let tracker = BackoffTracker::new();
        let now = Instant::now();
        tracker.record_failure("a", now);
        tracker.record_failure("a", now);
        tracker.record_failure("a", now);

        tracker.reset("a");

        assert_eq!(tracker.pending_retry("a", now), None);
        assert_eq!(tracker.record_failure("a", now), (Duration::from_secs(60), 1));
    }

    #[test]
    fn test_pending_retry_counts_down() {
        let tracker = BackoffTracker::new();
        let now = Instant::now();
        assert_eq!(tracker.pending_retry("a", now), None);

        tracker.record_failure("a", now);

        assert_eq!(tracker.pending_retry("a", now), Some(Duration::from_secs(60)));
        assert_eq!(
            tracker.pending_retry("a", now + Duration::from_secs(45)),
            Some(Duration::from_secs(15))
        );
        assert_eq!(tracker.pending_retry("a", now + Duration::from_secs(60)), None);
    }
}
