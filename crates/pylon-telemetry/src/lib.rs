//! Logging for the Pylon endpoint pipeline.
//!
//! Two pieces live here:
//!
//! - [`logging`]: installs a `tracing-subscriber` formatter (JSON or pretty)
//!   for the process.
//! - [`Logger`]: a cheap, copyable handle that applies the configured
//!   `logger.level` / `logger.disabled` options before forwarding events to
//!   `tracing`.
//!
//! # Example
//!
//! ```rust,ignore
//! use pylon_telemetry::{init_logging, LogConfig, LogLevel, Logger};
//!
//! init_logging(&LogConfig::production())?;
//! let logger = Logger::new(Some(LogLevel::Warn), false);
//! logger.warn("rate limit storage is in-memory");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
mod logger;
pub mod logging;

pub use error::TelemetryError;
pub use logger::{LogLevel, Logger};
pub use logging::{create_env_filter, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
