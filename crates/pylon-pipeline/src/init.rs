//! Building a pipeline.
//!
//! [`init`] turns a validated configuration and the plugin list into the
//! frozen [`GlobalContext`]. [`PylonBuilder`] wraps it with the options that
//! cannot live in a config file (callbacks, global hooks, storage) and
//! produces a ready [`Pylon`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use pylon_config::PylonConfig;
use pylon_core::{
    Adapter, BoxFuture, CallError, CallResult, MemoryAdapter, Reply, Request, Response,
};
use pylon_telemetry::Logger;

use crate::api::Api;
use crate::context::{CallContext, RequestContext};
use crate::endpoint::Endpoint;
use crate::error::PipelineError;
use crate::global::{Fields, GlobalContext, IdGenerator};
use crate::hook::{AfterHook, BeforeHook, Hook};
use crate::merger::{merge_contributions, GlobalHooks};
use crate::plugin::Plugin;
use crate::rate_limit::{MemoryStorage, RateLimitStorage, RateLimiter};
use crate::report::{ErrorReporter, OnApiError};
use crate::router::Router;

/// Builds the global context.
///
/// Validates `config`, resolves the base URL origin, falls back to the
/// in-memory adapter when none is given, then runs each plugin's `init`
/// once, in order. Fields returned by later plugins overwrite earlier ones,
/// and each plugin's options patch is merged over the configuration right
/// after its `init`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or a plugin fails to
/// initialize.
pub fn init(
    config: PylonConfig,
    plugins: &[Arc<dyn Plugin>],
    adapter: Option<Arc<dyn Adapter>>,
) -> Result<GlobalContext, PipelineError> {
    init_with(config, plugins, adapter, None)
}

fn init_with(
    config: PylonConfig,
    plugins: &[Arc<dyn Plugin>],
    adapter: Option<Arc<dyn Adapter>>,
    id_generator: Option<IdGenerator>,
) -> Result<GlobalContext, PipelineError> {
    config.validate()?;
    let base_url = config.base_origin()?.unwrap_or_default();
    let logger = Logger::new(config.logger.level, config.logger.disabled);

    let adapter: Arc<dyn Adapter> = adapter.unwrap_or_else(|| {
        logger.warn(
            "No database adapter configured, using the in-memory adapter. \
             Data will be lost when the process exits.",
        );
        Arc::new(MemoryAdapter::new())
    });

    let mut global = GlobalContext {
        config,
        base_url,
        logger,
        adapter,
        id_generator,
        fields: Fields::new(),
        schema: IndexMap::new(),
    };

    for plugin in plugins {
        if let Some(schema) = plugin.schema() {
            global.schema.insert(plugin.id().to_string(), schema);
        }
        let fields = plugin.init(&global).map_err(|source| PipelineError::PluginInit {
            plugin: plugin.id().to_string(),
            source,
        })?;
        global.fields.extend(fields);

        if let Some(patch) = plugin.options() {
            let config = global
                .config
                .merge_patch(&patch)
                .map_err(|source| PipelineError::PluginOptions {
                    plugin: plugin.id().to_string(),
                    source,
                })?;
            global.base_url = config.base_origin()?.unwrap_or_default();
            global.logger = Logger::new(config.logger.level, config.logger.disabled);
            global.config = config;
            tracing::debug!(plugin = %plugin.id(), "plugin patched the options");
        }
    }

    tracing::debug!(
        plugins = plugins.len(),
        adapter = global.adapter.id(),
        base_path = %global.base_path(),
        "pylon initialized"
    );

    Ok(global)
}

/// Builder for [`Pylon`].
///
/// # Example
///
/// ```
/// use pylon_config::PylonConfig;
/// use pylon_pipeline::{CallContext, Endpoint, PylonBuilder};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let pylon = PylonBuilder::new(PylonConfig::default())
///     .endpoint("hello", Endpoint::get("/hello", |_ctx| {
///         Box::pin(async { Ok(json!({"hello": "world"}).into()) })
///     }))
///     .build()
///     .unwrap();
///
/// let reply = pylon.call("hello", &CallContext::new()).await.unwrap();
/// assert_eq!(reply.json(), Some(&json!({"hello": "world"})));
/// # });
/// ```
pub struct PylonBuilder {
    config: PylonConfig,
    plugins: Vec<Arc<dyn Plugin>>,
    adapter: Option<Arc<dyn Adapter>>,
    endpoints: IndexMap<String, Endpoint>,
    global_hooks: GlobalHooks,
    on_api_error: Option<OnApiError>,
    id_generator: Option<IdGenerator>,
    rate_limit_storage: Option<Arc<dyn RateLimitStorage>>,
}

impl fmt::Debug for PylonBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PylonBuilder")
            .field("config", &self.config)
            .field("plugins", &self.plugins.iter().map(|p| p.id()).collect::<Vec<_>>())
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PylonBuilder {
    /// Starts from a configuration.
    #[must_use]
    pub fn new(config: PylonConfig) -> Self {
        Self {
            config,
            plugins: Vec::new(),
            adapter: None,
            endpoints: IndexMap::new(),
            global_hooks: GlobalHooks::default(),
            on_api_error: None,
            id_generator: None,
            rate_limit_storage: None,
        }
    }

    /// Adds a plugin. Plugins run in the order they are added.
    #[must_use]
    pub fn plugin(mut self, plugin: impl Plugin) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Sets the storage adapter.
    #[must_use]
    pub fn adapter(mut self, adapter: impl Adapter) -> Self {
        self.adapter = Some(Arc::new(adapter));
        self
    }

    /// Registers a base endpoint. Plugin endpoints with the same name win.
    #[must_use]
    pub fn endpoint(mut self, name: impl Into<String>, endpoint: Endpoint) -> Self {
        self.endpoints.insert(name.into(), endpoint);
        self
    }

    /// Sets the before-hook that runs after every plugin before-hook.
    #[must_use]
    pub fn before_hook<F>(mut self, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, CallResult<BeforeHook>>
            + Send
            + Sync
            + 'static,
    {
        self.global_hooks.before = Some(Hook::always(handler));
        self
    }

    /// Sets the after-hook that runs after every plugin after-hook.
    #[must_use]
    pub fn after_hook<F>(mut self, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, CallResult<AfterHook>>
            + Send
            + Sync
            + 'static,
    {
        self.global_hooks.after = Some(Hook::always(handler));
        self
    }

    /// Hands unhandled errors to `callback` instead of logging them.
    #[must_use]
    pub fn on_api_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CallError, &GlobalContext) + Send + Sync + 'static,
    {
        self.on_api_error = Some(Arc::new(callback));
        self
    }

    /// Replaces the default id generator.
    #[must_use]
    pub fn generate_id<F>(mut self, generator: F) -> Self
    where
        F: Fn(&str, Option<usize>) -> String + Send + Sync + 'static,
    {
        self.id_generator = Some(Arc::new(generator));
        self
    }

    /// Stores rate limit counters somewhere other than process memory.
    #[must_use]
    pub fn rate_limit_storage(mut self, storage: impl RateLimitStorage) -> Self {
        self.rate_limit_storage = Some(Arc::new(storage));
        self
    }

    /// Initializes plugins and merges their contributions.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a plugin fails to
    /// initialize, or strict endpoint naming finds a duplicate.
    pub fn build(self) -> Result<Pylon, PipelineError> {
        let global = Arc::new(init_with(
            self.config,
            &self.plugins,
            self.adapter,
            self.id_generator,
        )?);
        let strict = global.config().advanced.strict_endpoint_names;

        let contributions = merge_contributions(
            self.endpoints,
            &self.plugins,
            self.global_hooks,
            &global,
            strict,
        )?;
        let api = Arc::new(Api::new(Arc::clone(&global), contributions));

        let storage: Arc<dyn RateLimitStorage> = self
            .rate_limit_storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let rate_limiter = RateLimiter::new(
            global.config().rate_limit.clone(),
            global.base_path(),
            storage,
        );
        let reporter = ErrorReporter::new(Arc::clone(&global), self.on_api_error);
        let router = Router::new(Arc::clone(&api), self.plugins, rate_limiter, reporter);

        Ok(Pylon { global, api, router })
    }
}

/// A built pipeline.
#[derive(Debug, Clone)]
pub struct Pylon {
    global: Arc<GlobalContext>,
    api: Arc<Api>,
    router: Router,
}

impl Pylon {
    /// Starts a builder.
    #[must_use]
    pub fn builder(config: PylonConfig) -> PylonBuilder {
        PylonBuilder::new(config)
    }

    /// The global context.
    #[must_use]
    pub fn context(&self) -> &Arc<GlobalContext> {
        &self.global
    }

    /// The endpoint table.
    #[must_use]
    pub fn api(&self) -> &Arc<Api> {
        &self.api
    }

    /// The request lifecycle wrapper.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Calls an endpoint directly, bypassing the request lifecycle.
    ///
    /// # Errors
    ///
    /// See [`Api::call`].
    pub async fn call(&self, name: &str, call: &CallContext) -> CallResult<Reply> {
        self.api.call(name, call).await
    }

    /// Serves a transport request with the endpoint registered as `name`.
    ///
    /// # Errors
    ///
    /// See [`Router::dispatch`].
    pub async fn handle(&self, name: &str, request: Request) -> Result<Response, CallError> {
        self.router.dispatch(name, request).await
    }
}
