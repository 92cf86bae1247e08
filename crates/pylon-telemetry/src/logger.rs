//! The level-gated logger carried in the global context.
//!
//! [`Logger`] does not install anything; it decides whether an event should
//! be emitted and forwards it to `tracing` under the `pylon` target. Plugins
//! and endpoints log through it so that the `logger.disabled` and
//! `logger.level` options apply uniformly.

use crate::error::TelemetryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Verbosity threshold, from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Failures only.
    Error,
    /// Failures and warnings.
    Warn,
    /// Informational events.
    Info,
    /// Everything.
    Debug,
}

impl LogLevel {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Error
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(TelemetryError::InvalidLevel(other.to_string())),
        }
    }
}

/// Level-gated logging handle.
///
/// # Example
///
/// ```
/// use pylon_telemetry::{LogLevel, Logger};
///
/// let logger = Logger::new(Some(LogLevel::Warn), false);
/// assert!(logger.enabled(LogLevel::Error));
/// assert!(!logger.enabled(LogLevel::Info));
/// logger.warn("session table is empty");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Logger {
    level: Option<LogLevel>,
    disabled: bool,
}

impl Logger {
    /// Creates a logger. `level` is `None` when the embedder did not set one,
    /// in which case only errors are emitted.
    #[must_use]
    pub const fn new(level: Option<LogLevel>, disabled: bool) -> Self {
        Self { level, disabled }
    }

    /// A logger that emits nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(None, true)
    }

    /// The configured level, if any.
    #[must_use]
    pub const fn level(&self) -> Option<LogLevel> {
        self.level
    }

    /// Returns true when the logger is switched off.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Whether an event at `level` passes the threshold.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        !self.disabled && level <= self.level.unwrap_or_default()
    }

    /// Whether typed API errors should be reported.
    ///
    /// Only an explicitly configured `error`, `warn` or `debug` level opts in;
    /// `info` and an unset level keep client errors out of the log.
    #[must_use]
    pub fn reports_api_errors(&self) -> bool {
        !self.disabled
            && matches!(
                self.level,
                Some(LogLevel::Error | LogLevel::Warn | LogLevel::Debug)
            )
    }

    /// Emits an error event.
    pub fn error(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Error) {
            tracing::error!(target: "pylon", "{message}");
        }
    }

    /// Emits an error event carrying the error detail as a structured field.
    pub fn error_with(&self, message: impl fmt::Display, error: &dyn fmt::Display) {
        if self.enabled(LogLevel::Error) {
            tracing::error!(target: "pylon", error = %error, "{message}");
        }
    }

    /// Emits a warning.
    pub fn warn(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Warn) {
            tracing::warn!(target: "pylon", "{message}");
        }
    }

    /// Emits an informational event.
    pub fn info(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Info) {
            tracing::info!(target: "pylon", "{message}");
        }
    }

    /// Emits a debug event.
    pub fn debug(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!(target: "pylon", "{message}");
        }
    }
}
