//! Cycle counter acceptance tests on real hardware.
//!
//! # Acceptance Criteria
//!
//! - Successive reads never decrease
//! - A read right after reset is below any read after a delay
//! - Back-to-back reads stay within a small bound of each other

use super::common::{hardware_counter, perf_events_allowed};
use cyclebench_common::config::CounterSource;
use cyclebench_runtime::counter::CycleCounter;
use std::time::Duration;

/// Successive reads without a reset are non-decreasing.
#[test]
fn test_reads_non_decreasing() {
    let Some(counter) = hardware_counter(CounterSource::Auto, true, false) else {
        return;
    };

    let mut last = counter.cycle_count().unwrap();
    for _ in 0..10_000 {
        let now = counter.cycle_count().unwrap();
        assert!(now >= last, "counter went backwards: {last} -> {now}");
        last = now;
    }
}

/// A post-reset read is below a read taken after a delay.
#[test]
fn test_reset_then_delay_increases() {
    let Some(counter) = hardware_counter(CounterSource::Tsc, true, true) else {
        return;
    };

    let first = counter.cycle_count().unwrap();
    std::thread::sleep(Duration::from_millis(2));
    let later = counter.cycle_count().unwrap();
    assert!(first < later, "first={first} later={later}");
}

/// Back-to-back reads differ by a bounded amount.
#[test]
fn test_back_to_back_reads_bounded() {
    let Some(counter) = hardware_counter(CounterSource::Tsc, true, false) else {
        return;
    };

    // Best of many pairs, so a single preemption cannot fail the test
    let min_gap = (0..1_000)
        .map(|_| {
            let a = counter.cycle_count().unwrap();
            let b = counter.cycle_count().unwrap();
            b.saturating_sub(a)
        })
        .min()
        .unwrap();

    // A few thousand ticks is far above any real back-to-back read cost.
    assert!(min_gap < 10_000, "min gap between reads: {min_gap} ticks");
}

/// Re-initializing with reset brings the count back near zero.
#[test]
fn test_reinit_resets_baseline() {
    let Some(mut counter) = hardware_counter(CounterSource::Tsc, true, false) else {
        return;
    };

    std::thread::sleep(Duration::from_millis(5));
    let before_reset = counter.cycle_count().unwrap();

    counter.init_counters(true, false).unwrap();
    let after_reset = counter.cycle_count().unwrap();
    assert!(
        after_reset < before_reset,
        "after_reset={after_reset} before_reset={before_reset}"
    );
}

/// The perf backend counts cycles the thread executes.
#[cfg(target_os = "linux")]
#[test]
fn test_perf_counts_busy_work() {
    if !perf_events_allowed() {
        eprintln!("Skipping test: perf_event_paranoid forbids user-space counters");
        return;
    }
    let Some(counter) = hardware_counter(CounterSource::Perf, true, false) else {
        return;
    };
    assert_eq!(counter.source(), CounterSource::Perf);

    let before = counter.cycle_count().unwrap();
    let mut acc = 0u64;
    for i in 0..1_000_000u64 {
        acc = acc.wrapping_mul(31).wrapping_add(std::hint::black_box(i));
    }
    std::hint::black_box(acc);
    let after = counter.cycle_count().unwrap();

    assert!(after > before, "before={before} after={after}");
}
