//! Thread placement for counter sampling.
//!
//! Timestamp and PMU counters are per-core; two reads only compare
//! reliably when the thread does not migrate between them.

use cyclebench_common::config::RealtimeConfig;
use cyclebench_common::error::{BenchError, BenchResult};
use tracing::{debug, info, warn};

/// Apply the thread placement described by the configuration.
///
/// Returns the CPU the thread is pinned to, if any.
///
/// # Errors
///
/// Returns an error if the OS rejects the affinity for a reason other than
/// the CPU not existing.
pub fn apply_realtime(config: &RealtimeConfig) -> BenchResult<Option<usize>> {
    pin_to_cpu(config.cpu)
}

/// Pin the calling thread to `cpu`.
///
/// Returns the CPU actually pinned to, or `None` when no CPU was requested
/// or the requested one does not exist.
///
/// # Errors
///
/// Returns [`BenchError::Config`] if the index is out of range or the OS
/// rejects the affinity.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu: Option<usize>) -> BenchResult<Option<usize>> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let Some(cpu) = cpu else {
        debug!("No CPU affinity configured");
        return Ok(None);
    };

    let mut cpu_set = CpuSet::new();
    cpu_set
        .set(cpu)
        .map_err(|e| BenchError::Config(format!("Invalid CPU index {cpu}: {e}")))?;

    match sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        Ok(()) => {
            info!(cpu, "Measuring thread pinned");
            Ok(Some(cpu))
        }
        Err(nix::errno::Errno::EINVAL) => {
            warn!(cpu, "CPU does not exist or is offline, running unpinned");
            Ok(None)
        }
        Err(e) => Err(BenchError::Config(format!("sched_setaffinity failed: {e}"))),
    }
}

/// Pin the calling thread to `cpu`.
///
/// Affinity is not supported off Linux; a requested CPU is ignored with a
/// warning.
#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(cpu: Option<usize>) -> BenchResult<Option<usize>> {
    if cpu.is_some() {
        warn!("CPU affinity not available on this platform");
    }
    Ok(None)
}

/// CPU the calling thread is currently running on, when the OS reports it.
#[cfg(target_os = "linux")]
#[must_use]
#[allow(unsafe_code)]
pub fn current_cpu() -> Option<usize> {
    // SAFETY: sched_getcpu has no preconditions.
    let cpu = unsafe { libc::sched_getcpu() };
    usize::try_from(cpu).ok()
}

#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn current_cpu() -> Option<usize> {
    None
}
