//! The callable endpoint table.

use std::sync::Arc;

use indexmap::IndexMap;
use pylon_core::{ApiError, CallResult, Reply};

use crate::context::{CallContext, RequestContext};
use crate::endpoint::Endpoint;
use crate::executor::execute;
use crate::global::GlobalContext;
use crate::hook::HookSet;
use crate::merger::Contributions;
use crate::middleware::Middleware;

/// Every endpoint, middleware and hook of a pipeline, ready to be called.
///
/// `Api` holds no per-call state: concurrent calls to the same endpoint each
/// get their own [`RequestContext`].
#[derive(Debug)]
pub struct Api {
    global: Arc<GlobalContext>,
    endpoints: IndexMap<String, Endpoint>,
    middlewares: Vec<Middleware>,
    hooks: HookSet,
}

impl Api {
    pub(crate) fn new(global: Arc<GlobalContext>, contributions: Contributions) -> Self {
        Self {
            global,
            endpoints: contributions.endpoints,
            middlewares: contributions.middlewares,
            hooks: contributions.hooks,
        }
    }

    /// The global context.
    #[must_use]
    pub fn context(&self) -> &Arc<GlobalContext> {
        &self.global
    }

    /// Looks up an endpoint by name.
    #[must_use]
    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.get(name)
    }

    /// Endpoint names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// All endpoints in registration order.
    #[must_use]
    pub fn endpoints(&self) -> &IndexMap<String, Endpoint> {
        &self.endpoints
    }

    /// Merged plugin middlewares.
    #[must_use]
    pub fn middlewares(&self) -> &[Middleware] {
        &self.middlewares
    }

    /// Merged hooks.
    #[must_use]
    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    /// Calls an endpoint by name through the full hook chain.
    ///
    /// `call` is only read; the chain works on a fresh context built from it.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for an unknown name, otherwise whatever the chain
    /// produced: a typed error carrying the accumulated response headers, or
    /// an unclassified failure.
    pub async fn call(&self, name: &str, call: &CallContext) -> CallResult<Reply> {
        let endpoint = self
            .endpoints
            .get(name)
            .ok_or_else(|| ApiError::not_found(format!("unknown endpoint: {name}")))?;

        let ctx = RequestContext::new(Arc::clone(&self.global), name, endpoint.path(), call);
        execute(endpoint, &self.hooks, ctx).await
    }
}
