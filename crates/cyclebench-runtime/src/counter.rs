//! Cycle counter capability and its backends.
//!
//! A counter is configured once with [`CycleCounter::init_counters`] and then
//! read any number of times with [`CycleCounter::cycle_count`]:
//!
//! - [`HardwareCounter`] reads the host's counter: the architectural
//!   timestamp counter (`rdtsc` on x86_64, `cntvct_el0` on aarch64) or the
//!   Linux `perf_event_open` CPU cycle counter.
//! - [`SimulatedCounter`] derives ticks from a [`MonotonicClock`] at a
//!   nominal frequency, for tests and machines without a usable counter.
//!
//! # Units
//!
//! With the divider enabled the reported value advances once per
//! [`DIVIDER_RATIO`] underlying ticks. Multiply a reported value by
//! [`CycleCounter::ticks_per_count`] for underlying ticks.
//!
//! The timestamp counter runs at a constant rate whether or not the thread
//! is scheduled. The perf counter only advances while the calling thread
//! executes in user space, so a sleep barely moves it.

#![allow(unsafe_code)] // Counter instructions and perf_event_open

use crate::timer::{MonotonicClock, SystemClock};
use cyclebench_common::config::{CounterConfig, CounterSource};
use cyclebench_common::error::{BenchError, BenchResult};
use tracing::{debug, info};

/// Underlying ticks per reported count when the divider is enabled.
pub const DIVIDER_RATIO: u64 = 64;

/// A configurable, monotonically increasing tick counter.
pub trait CycleCounter {
    /// Configure the counter.
    ///
    /// `reset` clears the count to zero and enables counting. `enable_divider`
    /// makes the count advance once per [`DIVIDER_RATIO`] ticks. Calling this
    /// again re-arms the counter; values read before become incomparable with
    /// values read after.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::UnsupportedPlatform`] if the host has no counter
    /// this backend can use.
    fn init_counters(&mut self, reset: bool, enable_divider: bool) -> BenchResult<()>;

    /// Read the current count.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::CounterNotConfigured`] before `init_counters`.
    fn cycle_count(&self) -> BenchResult<u64>;

    /// Backend actually in use.
    fn source(&self) -> CounterSource;

    /// Whether the divider is enabled.
    fn divider_enabled(&self) -> bool;

    /// Underlying ticks represented by one reported count.
    fn ticks_per_count(&self) -> u64 {
        if self.divider_enabled() {
            DIVIDER_RATIO
        } else {
            1
        }
    }
}

impl<C: CycleCounter + ?Sized> CycleCounter for Box<C> {
    fn init_counters(&mut self, reset: bool, enable_divider: bool) -> BenchResult<()> {
        (**self).init_counters(reset, enable_divider)
    }

    fn cycle_count(&self) -> BenchResult<u64> {
        (**self).cycle_count()
    }

    fn source(&self) -> CounterSource {
        (**self).source()
    }

    fn divider_enabled(&self) -> bool {
        (**self).divider_enabled()
    }
}

/// Build the counter selected by the configuration.
///
/// Nothing touches the hardware until `init_counters` is called.
#[must_use]
pub fn counter_for(config: &CounterConfig) -> Box<dyn CycleCounter> {
    match config.source {
        CounterSource::Simulated => Box::new(SimulatedCounter::new(
            SystemClock,
            config.simulated_frequency_hz,
        )),
        source => Box::new(HardwareCounter::new(source)),
    }
}

/// Baseline and prescaler applied on top of a raw tick source.
#[derive(Debug, Clone, Copy, Default)]
struct Scaling {
    baseline: u64,
    divider: bool,
}

impl Scaling {
    fn apply(self, raw: u64) -> u64 {
        let ticks = raw.wrapping_sub(self.baseline);
        if self.divider {
            ticks / DIVIDER_RATIO
        } else {
            ticks
        }
    }
}

/// Host cycle counter.
#[derive(Debug)]
pub struct HardwareCounter {
    requested: CounterSource,
    backend: Option<Backend>,
    scaling: Scaling,
}

#[derive(Debug)]
enum Backend {
    Tsc,
    #[cfg(target_os = "linux")]
    Perf(perf::PerfEventCounter),
}

impl Backend {
    fn source(&self) -> CounterSource {
        match self {
            Self::Tsc => CounterSource::Tsc,
            #[cfg(target_os = "linux")]
            Self::Perf(_) => CounterSource::Perf,
        }
    }

    fn raw(&self) -> BenchResult<u64> {
        match self {
            Self::Tsc => tsc::read().ok_or_else(|| {
                BenchError::UnsupportedPlatform("no timestamp counter on this architecture".into())
            }),
            #[cfg(target_os = "linux")]
            Self::Perf(counter) => counter.read(),
        }
    }
}

impl HardwareCounter {
    /// Create an unconfigured counter for the requested backend.
    ///
    /// `Auto` prefers the timestamp counter and falls back to perf.
    /// `Simulated` is not a hardware backend and fails at `init_counters`.
    #[must_use]
    pub fn new(requested: CounterSource) -> Self {
        Self {
            requested,
            backend: None,
            scaling: Scaling::default(),
        }
    }

    fn open(requested: CounterSource) -> BenchResult<Backend> {
        match requested {
            CounterSource::Tsc => open_tsc(),
            CounterSource::Perf => open_perf(),
            CounterSource::Auto => open_tsc().or_else(|tsc_err| {
                debug!(error = %tsc_err, "Timestamp counter unavailable, trying perf");
                open_perf().map_err(|perf_err| {
                    BenchError::UnsupportedPlatform(format!(
                        "no cycle counter available ({tsc_err}; {perf_err})"
                    ))
                })
            }),
            CounterSource::Simulated => Err(BenchError::Config(
                "the simulated source is not a hardware counter".into(),
            )),
        }
    }
}

fn open_tsc() -> BenchResult<Backend> {
    if tsc::read().is_some() {
        Ok(Backend::Tsc)
    } else {
        Err(BenchError::UnsupportedPlatform(format!(
            "no timestamp counter on {}",
            std::env::consts::ARCH
        )))
    }
}

#[cfg(target_os = "linux")]
fn open_perf() -> BenchResult<Backend> {
    perf::PerfEventCounter::open().map(Backend::Perf)
}

#[cfg(not(target_os = "linux"))]
fn open_perf() -> BenchResult<Backend> {
    Err(BenchError::UnsupportedPlatform(
        "perf_event_open is only available on Linux".into(),
    ))
}

impl CycleCounter for HardwareCounter {
    fn init_counters(&mut self, reset: bool, enable_divider: bool) -> BenchResult<()> {
        if self.backend.is_none() {
            let backend = Self::open(self.requested)?;
            info!(
                requested = %self.requested,
                source = %backend.source(),
                "Cycle counter opened"
            );
            self.backend = Some(backend);
        }

        let backend = self
            .backend
            .as_ref()
            .ok_or(BenchError::CounterNotConfigured)?;

        let baseline = match backend {
            Backend::Tsc => {
                if reset {
                    backend.raw()?
                } else {
                    self.scaling.baseline
                }
            }
            #[cfg(target_os = "linux")]
            Backend::Perf(counter) => {
                if reset {
                    counter.reset()?;
                }
                counter.enable()?;
                0
            }
        };

        self.scaling = Scaling {
            baseline,
            divider: enable_divider,
        };

        debug!(reset, enable_divider, baseline, "Cycle counter configured");
        Ok(())
    }

    fn cycle_count(&self) -> BenchResult<u64> {
        let backend = self
            .backend
            .as_ref()
            .ok_or(BenchError::CounterNotConfigured)?;
        Ok(self.scaling.apply(backend.raw()?))
    }

    fn source(&self) -> CounterSource {
        self.backend
            .as_ref()
            .map_or(self.requested, Backend::source)
    }

    fn divider_enabled(&self) -> bool {
        self.scaling.divider
    }
}

/// Counter derived from a monotonic clock at a nominal frequency.
///
/// With a [`crate::timer::ManualClock`] the count is fully deterministic.
#[derive(Debug, Clone)]
pub struct SimulatedCounter<K: MonotonicClock = SystemClock> {
    clock: K,
    frequency_hz: u64,
    scaling: Scaling,
    configured: bool,
}

impl<K: MonotonicClock> SimulatedCounter<K> {
    /// Create an unconfigured counter ticking at `frequency_hz` on `clock`.
    #[must_use]
    pub fn new(clock: K, frequency_hz: u64) -> Self {
        Self {
            clock,
            frequency_hz,
            scaling: Scaling::default(),
            configured: false,
        }
    }

    fn raw(&self) -> BenchResult<u64> {
        let ns = self.clock.now()?.as_nanos();
        let ticks = ns * u128::from(self.frequency_hz) / 1_000_000_000;
        // Wraps like a free-running 64-bit register.
        #[allow(clippy::cast_possible_truncation)]
        Ok(ticks as u64)
    }
}

impl<K: MonotonicClock> CycleCounter for SimulatedCounter<K> {
    fn init_counters(&mut self, reset: bool, enable_divider: bool) -> BenchResult<()> {
        let baseline = if reset {
            self.raw()?
        } else {
            self.scaling.baseline
        };
        self.scaling = Scaling {
            baseline,
            divider: enable_divider,
        };
        self.configured = true;
        debug!(reset, enable_divider, baseline, "Simulated counter configured");
        Ok(())
    }

    fn cycle_count(&self) -> BenchResult<u64> {
        if !self.configured {
            return Err(BenchError::CounterNotConfigured);
        }
        Ok(self.scaling.apply(self.raw()?))
    }

    fn source(&self) -> CounterSource {
        CounterSource::Simulated
    }

    fn divider_enabled(&self) -> bool {
        self.scaling.divider
    }
}

/// Architectural timestamp counter.
mod tsc {
    #[cfg(target_arch = "x86_64")]
    #[inline(always)]
    pub fn read() -> Option<u64> {
        // SAFETY: RDTSC has no side effects and is available on every x86_64 CPU.
        Some(unsafe { core::arch::x86_64::_rdtsc() })
    }

    #[cfg(target_arch = "aarch64")]
    #[inline(always)]
    pub fn read() -> Option<u64> {
        let count: u64;
        // SAFETY: CNTVCT_EL0 is readable from EL0 on Linux and macOS.
        unsafe {
            core::arch::asm!("isb", "mrs {}, cntvct_el0", out(reg) count, options(nostack));
        }
        Some(count)
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[inline(always)]
    pub fn read() -> Option<u64> {
        None
    }
}

/// Linux hardware cycle counter via `perf_event_open(2)`.
#[cfg(target_os = "linux")]
mod perf {
    use cyclebench_common::error::{BenchError, BenchResult};
    use static_assertions::const_assert_eq;
    use std::fs::File;
    use std::io::Read;
    use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
    use tracing::warn;

    const PERF_TYPE_HARDWARE: u32 = 0;
    const PERF_COUNT_HW_CPU_CYCLES: u64 = 0;
    const PERF_ATTR_SIZE_VER5: u32 = 112;
    const PERF_FLAG_FD_CLOEXEC: libc::c_ulong = 1 << 3;

    // Bit positions in perf_event_attr's flag word.
    const ATTR_DISABLED: u64 = 1 << 0;
    const ATTR_EXCLUDE_KERNEL: u64 = 1 << 5;
    const ATTR_EXCLUDE_HV: u64 = 1 << 6;

    // _IO('$', n)
    const PERF_EVENT_IOC_ENABLE: u32 = 0x2400;
    const PERF_EVENT_IOC_RESET: u32 = 0x2403;

    /// `struct perf_event_attr` up to `PERF_ATTR_SIZE_VER5`.
    #[repr(C)]
    #[derive(Debug, Default)]
    #[allow(dead_code)] // read by the kernel
    struct PerfEventAttr {
        type_: u32,
        size: u32,
        config: u64,
        sample_period: u64,
        sample_type: u64,
        read_format: u64,
        flags: u64,
        wakeup_events: u32,
        bp_type: u32,
        config1: u64,
        config2: u64,
        branch_sample_type: u64,
        sample_regs_user: u64,
        sample_stack_user: u32,
        clockid: i32,
        sample_regs_intr: u64,
        aux_watermark: u32,
        sample_max_stack: u16,
        reserved_2: u16,
    }

    const_assert_eq!(std::mem::size_of::<PerfEventAttr>(), PERF_ATTR_SIZE_VER5 as usize);

    /// Per-thread, user-space-only CPU cycle counter.
    #[derive(Debug)]
    pub struct PerfEventCounter {
        file: File,
    }

    impl PerfEventCounter {
        /// Open a disabled cycle counter for the calling thread on any CPU.
        pub fn open() -> BenchResult<Self> {
            let attr = PerfEventAttr {
                type_: PERF_TYPE_HARDWARE,
                size: PERF_ATTR_SIZE_VER5,
                config: PERF_COUNT_HW_CPU_CYCLES,
                flags: ATTR_DISABLED | ATTR_EXCLUDE_KERNEL | ATTR_EXCLUDE_HV,
                ..Default::default()
            };

            // SAFETY: attr is a valid perf_event_attr that outlives the call.
            let ret = unsafe {
                libc::syscall(
                    libc::SYS_perf_event_open,
                    std::ptr::addr_of!(attr),
                    0 as libc::pid_t,
                    -1 as libc::c_int,
                    -1 as libc::c_int,
                    PERF_FLAG_FD_CLOEXEC,
                )
            };

            if ret < 0 {
                let err = std::io::Error::last_os_error();
                return Err(match err.raw_os_error() {
                    Some(libc::EACCES | libc::EPERM) => {
                        warn!(
                            "perf_event_open denied - check /proc/sys/kernel/perf_event_paranoid \
                             or grant CAP_PERFMON"
                        );
                        BenchError::UnsupportedPlatform(format!("perf_event_open denied: {err}"))
                    }
                    Some(libc::ENOENT | libc::ENODEV | libc::EOPNOTSUPP | libc::ENOSYS) => {
                        BenchError::UnsupportedPlatform(format!(
                            "no hardware cycle counter exposed: {err}"
                        ))
                    }
                    _ => BenchError::Counter(format!("perf_event_open failed: {err}")),
                });
            }

            let fd = RawFd::try_from(ret)
                .map_err(|_| BenchError::Counter(format!("perf_event_open returned {ret}")))?;

            // SAFETY: the kernel just handed us ownership of this descriptor.
            let file = unsafe { File::from_raw_fd(fd) };
            Ok(Self { file })
        }

        fn ioctl(&self, request: u32, name: &str) -> BenchResult<()> {
            // SAFETY: fd is a live perf event descriptor; these requests take no pointer.
            let result = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, 0 as libc::c_int) };
            if result < 0 {
                return Err(BenchError::Counter(format!(
                    "{name} failed: {}",
                    std::io::Error::last_os_error()
                )));
            }
            Ok(())
        }

        /// Zero the count.
        pub fn reset(&self) -> BenchResult<()> {
            self.ioctl(PERF_EVENT_IOC_RESET, "PERF_EVENT_IOC_RESET")
        }

        /// Start counting.
        pub fn enable(&self) -> BenchResult<()> {
            self.ioctl(PERF_EVENT_IOC_ENABLE, "PERF_EVENT_IOC_ENABLE")
        }

        /// Read the current count.
        pub fn read(&self) -> BenchResult<u64> {
            let mut buf = [0u8; 8];
            (&self.file)
                .read_exact(&mut buf)
                .map_err(|e| BenchError::Counter(format!("perf counter read failed: {e}")))?;
            Ok(u64::from_ne_bytes(buf))
        }
    }
}
