//! The lab measurement sequence.
//!
//! 1. Configure the cycle counter (reset + divider by default)
//! 2. Sample the counter, sleep, sample again
//! 3. Start a timer, sleep, stop it
//!
//! Both halves sleep for the same delay, so the two readings describe the
//! same interval through different clocks.

use crate::counter::{counter_for, CycleCounter, DIVIDER_RATIO};
use crate::realtime::{apply_realtime, current_cpu};
use crate::sleep::{Sleeper, ThreadSleeper};
use crate::timer::{ElapsedTimer, MonotonicClock, SystemClock};
use cyclebench_common::config::{BenchConfig, CounterSource};
use cyclebench_common::error::BenchResult;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Result of one run of the sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Requested sleep per half, in microseconds.
    pub delay_us: u64,
    /// Counter backend that produced `cycle_count`.
    pub source: CounterSource,
    /// Whether `cycle_count` is in units of 64 ticks.
    pub divider: bool,
    /// Counter delta across the first sleep, in reported units.
    pub cycle_count: u64,
    /// Timer reading across the second sleep, in nanoseconds.
    pub elapsed_ns: f64,
}

impl Measurement {
    /// Timer reading in seconds.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_ns / 1_000_000_000.0
    }

    /// Counter delta in underlying ticks, undoing the divider.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        if self.divider {
            self.cycle_count.saturating_mul(DIVIDER_RATIO)
        } else {
            self.cycle_count
        }
    }
}

/// Run the sequence against the given counter, clock and sleeper.
///
/// The counter delta uses wrapping subtraction; a wrap between the two
/// samples is reported as-is.
///
/// # Errors
///
/// Returns an error if the counter cannot be configured or read, or the
/// clock cannot be read.
pub fn run_measurement<C, K, S>(
    counter: &mut C,
    clock: K,
    sleeper: &S,
    config: &BenchConfig,
) -> BenchResult<Measurement>
where
    C: CycleCounter + ?Sized,
    K: MonotonicClock,
    S: Sleeper + ?Sized,
{
    let delay = config.delay;

    counter.init_counters(config.counter.reset, config.counter.divider)?;

    let before = counter.cycle_count()?;
    sleeper.sleep(delay);
    let after = counter.cycle_count()?;

    let cycle_count = after.wrapping_sub(before);
    debug!(before, after, cycle_count, "Counter sampled");

    let mut timer = ElapsedTimer::start_with(clock)?;
    sleeper.sleep(delay);
    timer.stop()?;
    let elapsed_ns = timer.elapsed()?;
    debug!(elapsed_ns, "Timer sampled");

    Ok(Measurement {
        delay_us: duration_micros(delay),
        source: counter.source(),
        divider: counter.divider_enabled(),
        cycle_count,
        elapsed_ns,
    })
}

/// Run the sequence on the host: pin the thread if configured, open the
/// configured counter, and use the system clock and a blocking sleep.
///
/// # Errors
///
/// Returns an error if thread placement fails, the counter is unsupported,
/// or the clock cannot be read.
pub fn measure(config: &BenchConfig) -> BenchResult<Measurement> {
    let pinned = apply_realtime(&config.realtime)?;
    let mut counter = counter_for(&config.counter);

    info!(
        delay_us = duration_micros(config.delay),
        source = %config.counter.source,
        ?pinned,
        cpu = ?current_cpu(),
        "Starting measurement"
    );

    run_measurement(&mut counter, SystemClock, &ThreadSleeper, config)
}

fn duration_micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
