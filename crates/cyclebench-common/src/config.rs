//! Configuration structures for a measurement run.
//!
//! Everything has a default matching the lab sequence, so a TOML file only
//! needs the keys it wants to change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Delay used when none is supplied or the supplied one cannot be parsed.
pub const DEFAULT_DELAY: Duration = Duration::from_micros(1);

/// Top-level measurement configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Sleep interval bracketed by each of the two measurements.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,

    /// Cycle counter configuration.
    pub counter: CounterConfig,

    /// Thread placement configuration.
    pub realtime: RealtimeConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            counter: CounterConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

/// Cycle counter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Which counter backend to read.
    pub source: CounterSource,

    /// Clear the counter to zero when it is configured.
    pub reset: bool,

    /// Advance the reported count once per 64 cycles instead of every cycle.
    pub divider: bool,

    /// Nominal frequency of the simulated counter.
    pub simulated_frequency_hz: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            source: CounterSource::Auto,
            reset: true,
            divider: true,
            simulated_frequency_hz: 1_000_000_000,
        }
    }
}

/// Cycle counter backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CounterSource {
    /// Timestamp counter where the architecture has one, else perf.
    #[default]
    Auto,
    /// Architectural timestamp counter (`rdtsc` / `cntvct_el0`).
    Tsc,
    /// Linux `perf_event_open` CPU cycle counter.
    Perf,
    /// Software counter driven by a manual clock.
    Simulated,
}

impl fmt::Display for CounterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Tsc => write!(f, "tsc"),
            Self::Perf => write!(f, "perf"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

impl FromStr for CounterSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "tsc" => Ok(Self::Tsc),
            "perf" => Ok(Self::Perf),
            "simulated" => Ok(Self::Simulated),
            other => Err(format!(
                "unknown counter source '{other}' (expected auto, tsc, perf or simulated)"
            )),
        }
    }
}

/// Thread placement configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Pin the measuring thread to this CPU before sampling.
    pub cpu: Option<usize>,
}

impl BenchConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper for `Duration` in humantime format ("1us", "2ms").
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
