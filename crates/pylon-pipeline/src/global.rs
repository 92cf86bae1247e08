//! The global context shared by every call.
//!
//! Built once by [`init`](crate::init), then frozen behind an `Arc`. Nothing
//! in it changes while requests are being served.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use pylon_config::PylonConfig;
use pylon_core::{generate_id, Adapter, DEFAULT_ID_SIZE};
use pylon_telemetry::Logger;
use serde_json::{Map, Value};

/// A bag of named context values.
pub type Fields = Map<String, Value>;

/// Custom id generator: receives the model name and the requested size.
pub type IdGenerator = Arc<dyn Fn(&str, Option<usize>) -> String + Send + Sync>;

/// Configuration, storage and plugin-contributed state visible to every
/// endpoint, hook and plugin callback.
pub struct GlobalContext {
    pub(crate) config: PylonConfig,
    pub(crate) base_url: String,
    pub(crate) logger: Logger,
    pub(crate) adapter: Arc<dyn Adapter>,
    pub(crate) id_generator: Option<IdGenerator>,
    pub(crate) fields: Fields,
    pub(crate) schema: IndexMap<String, Value>,
}

impl GlobalContext {
    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &PylonConfig {
        &self.config
    }

    /// Origin of the configured base URL, or an empty string when none was
    /// configured.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Path prefix under which endpoints are mounted.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.config.base_path
    }

    /// Absolute URL of the endpoint mount point, e.g.
    /// `https://example.com/api`.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("{}{}", self.base_url, self.config.base_path)
    }

    /// Secret used for signed cookies, if configured.
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        self.config.secret.as_deref()
    }

    /// The level-gated logger.
    #[must_use]
    pub const fn logger(&self) -> &Logger {
        &self.logger
    }

    /// The storage adapter.
    #[must_use]
    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    /// Generates an identifier for a new `model` record.
    ///
    /// Uses the custom generator when one was configured, otherwise a random
    /// hex id of `size` (default 32) characters.
    #[must_use]
    pub fn generate_id(&self, model: &str, size: Option<usize>) -> String {
        match &self.id_generator {
            Some(generator) => generator(model, size),
            None => generate_id(size.unwrap_or(DEFAULT_ID_SIZE)),
        }
    }

    /// Context fields contributed by plugin `init` callbacks.
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// A single plugin-contributed field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Schema fragments collected from plugins, keyed by plugin id.
    #[must_use]
    pub fn schema(&self) -> &IndexMap<String, Value> {
        &self.schema
    }
}

impl fmt::Debug for GlobalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalContext")
            .field("base_url", &self.base_url)
            .field("base_path", &self.config.base_path)
            .field("logger", &self.logger)
            .field("adapter", &self.adapter.id())
            .field("custom_id_generator", &self.id_generator.is_some())
            .field("fields", &self.fields)
            .field("schema", &self.schema.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn test_context() -> GlobalContext {
    GlobalContext {
        config: PylonConfig::default(),
        base_url: String::new(),
        logger: Logger::default(),
        adapter: Arc::new(pylon_core::MemoryAdapter::new()),
        id_generator: None,
        fields: Fields::new(),
        schema: IndexMap::new(),
    }
}
