//! Build-time errors.

use pylon_config::ConfigError;
use thiserror::Error;

/// Errors raised while assembling a pipeline. Call-time failures are
/// [`CallError`](pylon_core::CallError)s instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Two sources registered the same endpoint name in strict mode.
    #[error("endpoint `{name}` is registered more than once")]
    DuplicateEndpoint {
        /// The colliding endpoint name.
        name: String,
    },

    /// A plugin's `init` callback failed.
    #[error("plugin `{plugin}` failed to initialize")]
    PluginInit {
        /// Plugin id.
        plugin: String,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },

    /// A plugin's options patch produced an invalid configuration.
    #[error("plugin `{plugin}` contributed invalid options")]
    PluginOptions {
        /// Plugin id.
        plugin: String,
        /// Underlying failure.
        #[source]
        source: ConfigError,
    },

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Create a duplicate endpoint error.
    pub fn duplicate_endpoint(name: impl Into<String>) -> Self {
        Self::DuplicateEndpoint { name: name.into() }
    }
}
