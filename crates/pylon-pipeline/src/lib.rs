//! # Pylon Pipeline
//!
//! Plugin merging, hook chain execution and the request lifecycle.
//!
//! A pipeline is built once from a configuration and a list of plugins.
//! Each plugin may contribute endpoints, path-scoped middlewares, before and
//! after hooks, a schema fragment and global context fields. Every endpoint
//! call then runs through the same chain:
//!
//! ```text
//! before-hooks ──► handler ──► after-hooks ──► Reply
//!      │              │             │
//!      └─ Respond ────┴─ ApiError ──┴─► recovery / raise
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`plugin`] | The [`Plugin`] contract |
//! | [`merger`] | Folding plugin contributions into one table |
//! | [`context`] | Per-call input and the live [`RequestContext`] |
//! | [`hook`] | Before and after hooks |
//! | [`api`] | The callable endpoint table |
//! | [`router`] | Request/response interceptors, error policy, dispatch |
//! | [`rate_limit`] | Fixed-window rate limiting |
//! | [`report`] | Error classification and logging |
//!
//! ## Example
//!
//! ```
//! use pylon_config::PylonConfig;
//! use pylon_pipeline::{AfterHook, CallContext, Endpoint, PylonBuilder};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let pylon = PylonBuilder::new(PylonConfig::default())
//!     .endpoint("getUser", Endpoint::get("/user", |_ctx| {
//!         Box::pin(async { Ok(json!({"id": 1}).into()) })
//!     }))
//!     .after_hook(|ctx| {
//!         Box::pin(async move {
//!             ctx.set_header("x-served-by", http::HeaderValue::from_static("pylon"));
//!             Ok(AfterHook::Continue)
//!         })
//!     })
//!     .build()
//!     .unwrap();
//!
//! let reply = pylon.call("getUser", &CallContext::new()).await.unwrap();
//! assert_eq!(reply.json(), Some(&json!({"id": 1})));
//! assert_eq!(reply.headers["x-served-by"], "pylon");
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/pylon-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod context;
pub mod endpoint;
mod error;
mod executor;
pub mod global;
pub mod hook;
mod init;
pub mod merger;
pub mod middleware;
pub mod plugin;
pub mod rate_limit;
pub mod report;
pub mod router;
pub mod routes;

pub use api::Api;
pub use context::{CallContext, ContextPatch, RequestContext, Returned};
pub use endpoint::Endpoint;
pub use error::PipelineError;
pub use global::{Fields, GlobalContext, IdGenerator};
pub use hook::{AfterHook, BeforeHook, Hook, HookSet};
pub use init::{init, Pylon, PylonBuilder};
pub use merger::{merge_contributions, Contributions, GlobalHooks};
pub use middleware::{Middleware, PluginMiddleware};
pub use plugin::Plugin;
pub use rate_limit::{
    MemoryStorage, RateLimitDecision, RateLimitEntry, RateLimitStorage, RateLimiter,
};
pub use report::{ErrorDisposition, ErrorKind, ErrorReporter, OnApiError};
pub use router::Router;
