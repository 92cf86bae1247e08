//! The plugin contract.
//!
//! A plugin bundles endpoints, middlewares, hooks, a schema fragment and
//! lifecycle callbacks. Everything except [`Plugin::id`] is optional.
//!
//! # Example
//!
//! ```
//! use indexmap::IndexMap;
//! use pylon_pipeline::{Endpoint, Plugin};
//! use serde_json::json;
//!
//! struct Health;
//!
//! impl Plugin for Health {
//!     fn id(&self) -> &str {
//!         "health"
//!     }
//!
//!     fn endpoints(&self) -> IndexMap<String, Endpoint> {
//!         let mut endpoints = IndexMap::new();
//!         endpoints.insert(
//!             "health".to_string(),
//!             Endpoint::get("/health", |_ctx| {
//!                 Box::pin(async { Ok(json!({ "status": "up" }).into()) })
//!             }),
//!         );
//!         endpoints
//!     }
//! }
//! ```

use indexmap::IndexMap;
use pylon_core::{BoxFuture, Request, Response};
use serde_json::Value;

use crate::endpoint::Endpoint;
use crate::global::{Fields, GlobalContext};
use crate::hook::HookSet;
use crate::middleware::PluginMiddleware;

/// A bundle of behaviour contributed to the pipeline.
pub trait Plugin: Send + Sync + 'static {
    /// Unique plugin identifier.
    fn id(&self) -> &str;

    /// Named endpoints. A later plugin's endpoint replaces an earlier one
    /// with the same name.
    fn endpoints(&self) -> IndexMap<String, Endpoint> {
        IndexMap::new()
    }

    /// Path-scoped middlewares.
    fn middlewares(&self) -> Vec<PluginMiddleware> {
        Vec::new()
    }

    /// Before and after hooks.
    fn hooks(&self) -> HookSet {
        HookSet::default()
    }

    /// Storage schema fragment. Collected, never interpreted.
    fn schema(&self) -> Option<Value> {
        None
    }

    /// Runs once at build time. Returned fields are merged into the global
    /// context.
    fn init(&self, ctx: &GlobalContext) -> anyhow::Result<Fields> {
        let _ = ctx;
        Ok(Fields::new())
    }

    /// Configuration patch deep-merged over the options right after this
    /// plugin's `init`. Later plugins and the rest of the pipeline see the
    /// patched options.
    fn options(&self) -> Option<Value> {
        None
    }

    /// Sees every request before routing. Returning a response answers the
    /// request immediately.
    fn on_request<'a>(
        &'a self,
        request: &'a Request,
        ctx: &'a GlobalContext,
    ) -> BoxFuture<'a, Option<Response>> {
        let _ = (request, ctx);
        Box::pin(async { None })
    }

    /// Sees every response. Returning a response replaces it.
    fn on_response<'a>(
        &'a self,
        response: &'a Response,
        ctx: &'a GlobalContext,
    ) -> BoxFuture<'a, Option<Response>> {
        let _ = (response, ctx);
        Box::pin(async { None })
    }
}
