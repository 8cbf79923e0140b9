//! Two-phase elapsed timer over a monotonic clock.
//!
//! The timer starts on construction, is stopped explicitly, and only then
//! reports the elapsed interval:
//!
//! ```text
//! start() ──► Running ──stop()──► Stopped ──elapsed()──► f64 ns
//!                                    │ ▲
//!                                    └─┘ stop() again moves the stop point
//! ```
//!
//! Reading a running timer is an error rather than a zero.

use cyclebench_common::error::{BenchError, BenchResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A clock that never moves backward.
///
/// Timestamps are offsets from an arbitrary, clock-specific origin; only
/// differences between two readings of the same clock are meaningful.
pub trait MonotonicClock {
    /// Read the current timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::ClockUnavailable`] if the clock source cannot be read.
    fn now(&self) -> BenchResult<Duration>;
}

/// The host's monotonic clock (`CLOCK_MONOTONIC` on Unix).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[cfg(unix)]
impl MonotonicClock for SystemClock {
    fn now(&self) -> BenchResult<Duration> {
        use nix::time::{clock_gettime, ClockId};

        let ts = clock_gettime(ClockId::CLOCK_MONOTONIC)
            .map_err(|e| BenchError::ClockUnavailable(format!("clock_gettime failed: {e}")))?;

        let secs = u64::try_from(ts.tv_sec()).map_err(|_| {
            BenchError::ClockUnavailable(format!("negative monotonic seconds: {}", ts.tv_sec()))
        })?;
        let nanos = u32::try_from(ts.tv_nsec()).map_err(|_| {
            BenchError::ClockUnavailable(format!("invalid nanoseconds: {}", ts.tv_nsec()))
        })?;

        Ok(Duration::new(secs, nanos))
    }
}

#[cfg(not(unix))]
impl MonotonicClock for SystemClock {
    fn now(&self) -> BenchResult<Duration> {
        use std::sync::OnceLock;
        use std::time::Instant;

        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        Ok(ORIGIN.get_or_init(Instant::now).elapsed())
    }
}

/// Manually advanced clock.
///
/// Clones share the same time, so a test can hand one clone to a timer or
/// simulated counter and advance it through another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ns: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let ns = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.now_ns.fetch_add(ns, Ordering::AcqRel);
    }

    /// Current reading in nanoseconds.
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::Acquire)
    }
}

impl MonotonicClock for ManualClock {
    fn now(&self) -> BenchResult<Duration> {
        Ok(Duration::from_nanos(self.now_ns()))
    }
}

/// Timer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Started, not yet stopped.
    Running {
        /// Timestamp captured at construction.
        start: Duration,
    },
    /// Stopped; the interval is readable.
    Stopped {
        /// Timestamp captured at construction.
        start: Duration,
        /// Timestamp captured by the latest `stop()`.
        stop: Duration,
    },
}

/// Elapsed-time timer with an explicit stop step.
#[derive(Debug, Clone)]
pub struct ElapsedTimer<K: MonotonicClock = SystemClock> {
    clock: K,
    state: TimerState,
}

impl ElapsedTimer<SystemClock> {
    /// Start a timer on the system monotonic clock.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::ClockUnavailable`] if the clock cannot be read.
    pub fn start() -> BenchResult<Self> {
        Self::start_with(SystemClock)
    }
}

impl<K: MonotonicClock> ElapsedTimer<K> {
    /// Start a timer on the given clock.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::ClockUnavailable`] if the clock cannot be read.
    pub fn start_with(clock: K) -> BenchResult<Self> {
        let start = clock.now()?;
        Ok(Self {
            clock,
            state: TimerState::Running { start },
        })
    }

    /// Capture the stop timestamp.
    ///
    /// Calling this again replaces the previous stop point with a later one.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::ClockUnavailable`] if the clock cannot be read;
    /// the timer keeps its previous state in that case.
    pub fn stop(&mut self) -> BenchResult<()> {
        let stop = self.clock.now()?;
        let start = match self.state {
            TimerState::Running { start } | TimerState::Stopped { start, .. } => start,
        };
        self.state = TimerState::Stopped { start, stop };
        Ok(())
    }

    /// Elapsed interval in nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::NotStopped`] if `stop()` has not been called.
    // Precision loss only above ~104 days.
    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed(&self) -> BenchResult<f64> {
        self.elapsed_duration().map(|d| d.as_nanos() as f64)
    }

    /// Elapsed interval as a `Duration`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::NotStopped`] if `stop()` has not been called.
    pub fn elapsed_duration(&self) -> BenchResult<Duration> {
        match self.state {
            TimerState::Running { .. } => Err(BenchError::NotStopped),
            TimerState::Stopped { start, stop } => Ok(stop.saturating_sub(start)),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Whether `stop()` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self.state, TimerState::Stopped { .. })
    }
}
