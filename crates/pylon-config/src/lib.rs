//! Typed configuration for the Pylon endpoint pipeline.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides (`PREFIX__SECTION__KEY`)
//! - Strict parsing (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use pylon_config::ConfigLoader;
//!
//! # fn main() -> Result<(), pylon_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()
//!     .with_optional_file("pylon.toml")?
//!     .with_env_prefix("PYLON")
//!     .load()?;
//!
//! println!("mounted at {}", config.base_path);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! base_url = "https://example.com"
//! base_path = "/api"
//! secret = "change-me"
//!
//! [logger]
//! disabled = false
//! level = "warn"
//!
//! [rate_limit]
//! enabled = true
//! window_secs = 10
//! max = 100
//!
//! [rate_limit.custom_rules."/sign-in"]
//! window_secs = 60
//! max = 3
//!
//! [on_api_error]
//! throw = false
//!
//! [advanced]
//! strict_endpoint_names = false
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{
    AdvancedConfig, LoggerConfig, OnApiErrorConfig, PylonConfig, RateLimitConfig,
    RateLimitRule, DEFAULT_BASE_PATH,
};
pub use error::ConfigError;
pub use loader::ConfigLoader;
