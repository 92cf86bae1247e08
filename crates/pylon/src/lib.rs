//! # Pylon
//!
//! **Pluggable endpoint-execution pipeline**
//!
//! Pylon runs named endpoints through an ordered chain of plugin-contributed
//! hooks and hands the result to whatever HTTP transport you use:
//!
//! - **Plugins** - Bundle endpoints, middlewares, hooks and schema fragments
//! - **Hooks** - Before-hooks can patch the context or answer the call;
//!   after-hooks can replace the result, set headers or recover from errors
//! - **Lifecycle** - Request and response interceptors, rate limiting and an
//!   error policy around every dispatch
//! - **Cookies** - Prefixed and HMAC-signed cookies on the request context
//!
//! ## Quick Start
//!
//! ```
//! use pylon::prelude::*;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let pylon = PylonBuilder::new(PylonConfig::default())
//!     .endpoint("getSession", Endpoint::get("/session", |ctx| {
//!         Box::pin(async move {
//!             match ctx.get_cookie("session", None) {
//!                 Some(id) => Ok(json!({ "session": id }).into()),
//!                 None => Err(ApiError::unauthorized("no session").into()),
//!             }
//!         })
//!     }))
//!     .build()
//!     .unwrap();
//!
//! let err = pylon.call("getSession", &CallContext::new()).await.unwrap_err();
//! assert_eq!(err.as_api().unwrap().status(), ApiStatus::Unauthorized);
//! # });
//! ```
//!
//! ## Architecture
//!
//! ```text
//! on_request → middlewares → before-hooks → handler → after-hooks
//!                                                         ↓
//!           on_response ← reconcile / on_error ←──────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/pylon/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use pylon_core as core;

// Re-export configuration types
pub use pylon_config as config;

// Re-export the pipeline
pub use pylon_pipeline as pipeline;

// Re-export logging types
pub use pylon_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use pylon::prelude::*;
/// ```
pub mod prelude {
    pub use pylon_core::{
        Adapter, ApiError, ApiStatus, BoxFuture, CallError, CallResult, EndpointOutput, Reply,
        Request, Response,
    };

    // Re-export cookie helpers
    pub use pylon_core::cookie::{CookiePrefix, SameSite, SetCookie};

    // Re-export configuration
    pub use pylon_config::{ConfigLoader, PylonConfig};

    // Re-export pipeline types
    pub use pylon_pipeline::{
        AfterHook, BeforeHook, CallContext, ContextPatch, Endpoint, GlobalContext, Hook, HookSet,
        Plugin, PluginMiddleware, Pylon, PylonBuilder, RequestContext, Router,
    };

    // Re-export logging
    pub use pylon_telemetry::{init_logging, LogConfig, LogLevel, Logger};
}
