//! Blocking sleep used between counter samples.

use crate::timer::ManualClock;
use std::time::Duration;

/// Blocks the calling thread for at least the requested duration.
pub trait Sleeper {
    /// Sleep for `duration`. Zero returns promptly.
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the host monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

#[cfg(target_os = "linux")]
impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        use nix::errno::Errno;
        use nix::time::{clock_gettime, clock_nanosleep, ClockId, ClockNanosleepFlags};
        use tracing::{debug, warn};

        let now = match clock_gettime(ClockId::CLOCK_MONOTONIC) {
            Ok(now) => now,
            Err(e) => {
                warn!(error = %e, "clock_gettime failed, falling back to thread::sleep");
                std::thread::sleep(duration);
                return;
            }
        };

        // Absolute deadline so an interrupted sleep resumes without drift.
        let Some(deadline) = absolute_deadline(now, duration) else {
            debug!(?duration, "Deadline not representable, using thread::sleep");
            std::thread::sleep(duration);
            return;
        };

        loop {
            match clock_nanosleep(
                ClockId::CLOCK_MONOTONIC,
                ClockNanosleepFlags::TIMER_ABSTIME,
                &deadline,
            ) {
                Ok(_) => return,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    warn!(error = %e, "clock_nanosleep failed, falling back to thread::sleep");
                    std::thread::sleep(duration);
                    return;
                }
            }
        }
    }
}

/// `now + duration` as a `timespec`, or `None` if it overflows `time_t`.
#[cfg(target_os = "linux")]
fn absolute_deadline(
    now: nix::sys::time::TimeSpec,
    duration: Duration,
) -> Option<nix::sys::time::TimeSpec> {
    use nix::sys::time::TimeSpec;

    let secs = u64::try_from(now.tv_sec()).ok()?;
    let nanos = u32::try_from(now.tv_nsec()).ok()?;
    let deadline = Duration::new(secs, nanos).checked_add(duration)?;

    let tv_sec = libc::time_t::try_from(deadline.as_secs()).ok()?;
    let tv_nsec = deadline.subsec_nanos().try_into().ok()?;
    Some(TimeSpec::new(tv_sec, tv_nsec))
}

#[cfg(not(target_os = "linux"))]
impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Advances a [`ManualClock`] instead of blocking.
#[derive(Debug, Clone, Default)]
pub struct ManualSleeper {
    clock: ManualClock,
}

impl ManualSleeper {
    /// Sleeper that advances `clock`.
    #[must_use]
    pub fn new(clock: ManualClock) -> Self {
        Self { clock }
    }
}

impl Sleeper for ManualSleeper {
    fn sleep(&self, duration: Duration) {
        self.clock.advance(duration);
    }
}
