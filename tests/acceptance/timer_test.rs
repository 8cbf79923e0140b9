//! Elapsed timer acceptance tests against the host monotonic clock.
//!
//! # Acceptance Criteria
//!
//! - Elapsed time is never below the requested sleep
//! - Elapsed time stays within scheduling tolerance of the request

use super::common::sleep_upper_bound;
use cyclebench_common::error::BenchError;
use cyclebench_runtime::sleep::{Sleeper, ThreadSleeper};
use cyclebench_runtime::timer::ElapsedTimer;
use std::time::Duration;

fn timed_sleep(delay: Duration) -> f64 {
    let mut timer = ElapsedTimer::start().unwrap();
    ThreadSleeper.sleep(delay);
    timer.stop().unwrap();
    timer.elapsed().unwrap()
}

/// Elapsed time tracks the requested delay.
#[test]
fn test_elapsed_proportional_to_delay() {
    for delay in [
        Duration::from_micros(100),
        Duration::from_millis(1),
        Duration::from_millis(10),
    ] {
        let elapsed_ns = timed_sleep(delay);
        let requested_ns = delay.as_nanos() as f64;
        let upper_ns = sleep_upper_bound(delay).as_nanos() as f64;

        assert!(
            elapsed_ns >= requested_ns,
            "slept {elapsed_ns}ns for a {requested_ns}ns request"
        );
        assert!(
            elapsed_ns <= upper_ns,
            "slept {elapsed_ns}ns for a {requested_ns}ns request (limit {upper_ns}ns)"
        );
    }
}

/// A zero-length interval is small and non-negative.
#[test]
fn test_zero_delay_non_negative() {
    let elapsed_ns = timed_sleep(Duration::ZERO);
    assert!(elapsed_ns >= 0.0);
    assert!(elapsed_ns < sleep_upper_bound(Duration::ZERO).as_nanos() as f64);
}

/// Reading before stopping is an explicit error.
#[test]
fn test_not_stopped() {
    let timer = ElapsedTimer::start().unwrap();
    assert_eq!(timer.elapsed(), Err(BenchError::NotStopped));
}
