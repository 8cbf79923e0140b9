//! Common utilities for acceptance tests.
//!
//! Provides helpers for:
//! - Opening a hardware counter or skipping when the host has none
//! - Tolerance checks for scheduler-dependent timings

use cyclebench_common::config::CounterSource;
use cyclebench_common::error::BenchError;
use cyclebench_runtime::counter::{CycleCounter, HardwareCounter};
use std::time::Duration;

/// Open and configure a hardware counter, or `None` if the host has none
/// or the kernel refuses to open it.
pub fn hardware_counter(
    source: CounterSource,
    reset: bool,
    divider: bool,
) -> Option<HardwareCounter> {
    let mut counter = HardwareCounter::new(source);
    match counter.init_counters(reset, divider) {
        Ok(()) => Some(counter),
        Err(BenchError::UnsupportedPlatform(reason) | BenchError::Counter(reason)) => {
            eprintln!("Skipping test: {reason}");
            None
        }
        Err(e) => panic!("unexpected counter error: {e}"),
    }
}

/// Upper bound for a sleep of `requested`: the request plus generous
/// scheduling slack for loaded CI machines.
pub fn sleep_upper_bound(requested: Duration) -> Duration {
    requested * 3 + Duration::from_millis(50)
}

/// Whether `perf_event_open` is likely to be permitted for an unprivileged user.
pub fn perf_events_allowed() -> bool {
    std::fs::read_to_string("/proc/sys/kernel/perf_event_paranoid")
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .is_some_and(|level| level <= 2)
}
