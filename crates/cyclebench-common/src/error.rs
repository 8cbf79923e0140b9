use thiserror::Error;

/// Errors raised while configuring or sampling the measurement primitives.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BenchError {
    /// The host exposes no cycle counter the requested backend can use.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The monotonic clock source could not be read.
    #[error("clock unavailable: {0}")]
    ClockUnavailable(String),

    /// Elapsed time was requested before the timer was stopped.
    #[error("timer read before stop() was called")]
    NotStopped,

    /// The cycle counter was read before `init_counters` configured it.
    #[error("cycle counter read before init_counters() was called")]
    CounterNotConfigured,

    /// The OS rejected a counter operation after it was configured.
    #[error("counter error: {0}")]
    Counter(String),

    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience type alias for measurement operations.
pub type BenchResult<T> = Result<T, BenchError>;
