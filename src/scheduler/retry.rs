//! Backoff formula and circuit breaker (§4.5).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::{DateTime, Utc};

/// `delay = min(base * multiplier^(retry_count - 1), max_seconds)`, rounded up to whole seconds.
///
/// `retry_count` must be at least 1; the formula is undefined at 0 per the design notes, so
/// callers increment `RetryCount` before calling this.
pub fn backoff_delay_seconds(
	retry_count: u32,
	base_seconds: u64,
	multiplier: u64,
	max_seconds: u64,
) -> u64 {
	debug_assert!(retry_count >= 1, "RetryCount=0 is invalid for the backoff formula");
	let exponent = retry_count.saturating_sub(1);
	let scaled = base_seconds.saturating_mul(multiplier.saturating_pow(exponent));
	scaled.min(max_seconds)
}

pub fn retry_after(now: DateTime<Utc>, delay_seconds: u64) -> DateTime<Utc> {
	now + chrono::Duration::seconds(delay_seconds as i64)
}

/// Tracks consecutive chunk failures and trips a stop request once a threshold is crossed.
///
/// Only chunks completing with `Severity::Error`/`Fatal` increment the counter (§9 decision:
/// `CheckCircuitBreaker` is invoked only from the Error/Fatal branch of the completion handler).
#[derive(Debug)]
pub struct CircuitBreaker {
	consecutive_failures: AtomicU32,
	threshold: u32,
	tripped: AtomicBool,
}

impl CircuitBreaker {
	pub fn new(threshold: u32) -> Self {
		Self {
			consecutive_failures: AtomicU32::new(0),
			threshold,
			tripped: AtomicBool::new(false),
		}
	}

	/// Record a failure. Returns `Some(message)` the instant the breaker trips on this call.
	pub fn record_failure(&self, chunk_id: u64, err_message: &str) -> Option<String> {
		let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
		if failures >= self.threshold {
			self.tripped.store(true, Ordering::Release);
			Some(format!(
				"Circuit breaker tripped after {failures} consecutive failures (chunk {chunk_id}: {err_message})"
			))
		} else {
			None
		}
	}

	pub fn reset_on_success(&self) {
		self.consecutive_failures.store(0, Ordering::Release);
	}

	pub fn reset(&self) {
		self.consecutive_failures.store(0, Ordering::Release);
		self.tripped.store(false, Ordering::Release);
	}

	pub fn is_tripped(&self) -> bool {
		self.tripped.load(Ordering::Acquire)
	}

	pub fn consecutive_failures(&self) -> u32 {
		self.consecutive_failures.load(Ordering::Acquire)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_is_monotonic_and_capped() {
		let mut prev = 0;
		for retry_count in 1..=10 {
			let delay = backoff_delay_seconds(retry_count, 5, 2, 300);
			assert!(delay >= prev, "delay must be non-decreasing");
			assert!(delay <= 300);
			prev = delay;
		}
	}

	#[test]
	fn backoff_matches_formula_before_cap() {
		assert_eq!(backoff_delay_seconds(1, 5, 2, 300), 5);
		assert_eq!(backoff_delay_seconds(2, 5, 2, 300), 10);
		assert_eq!(backoff_delay_seconds(3, 5, 2, 300), 20);
	}

	#[test]
	fn breaker_trips_at_threshold() {
		let breaker = CircuitBreaker::new(3);
		assert!(breaker.record_failure(1, "boom").is_none());
		assert!(breaker.record_failure(2, "boom").is_none());
		let trip = breaker.record_failure(3, "boom");
		assert!(trip.is_some());
		assert!(trip.unwrap().contains("Circuit breaker tripped"));
		assert!(breaker.is_tripped());
	}

	#[test]
	fn success_resets_counter_but_not_trip_flag() {
		let breaker = CircuitBreaker::new(2);
		breaker.record_failure(1, "boom");
		breaker.record_failure(2, "boom");
		assert!(breaker.is_tripped());
		breaker.reset_on_success();
		assert_eq!(breaker.consecutive_failures(), 0);
		assert!(breaker.is_tripped(), "reset_on_success must not untrip");
	}

	#[test]
	fn explicit_reset_untrips() {
		let breaker = CircuitBreaker::new(1);
		breaker.record_failure(1, "boom");
		assert!(breaker.is_tripped());
		breaker.reset();
		assert!(!breaker.is_tripped());
		assert_eq!(breaker.consecutive_failures(), 0);
	}
}
