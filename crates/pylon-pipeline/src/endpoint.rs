//! Endpoint definitions.
//!
//! An [`Endpoint`] is a route pattern, the methods it answers, free-form
//! JSON options and an async handler. The definition is immutable and
//! shared between calls; per-call state (headers included) lives on the
//! [`RequestContext`].

use std::fmt;
use std::sync::Arc;

use http::Method;
use pylon_core::{BoxFuture, CallResult, EndpointOutput};
use serde_json::{json, Value};

use crate::context::RequestContext;

/// The type-erased endpoint handler.
pub type HandlerFn = dyn for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, CallResult<EndpointOutput>>
    + Send
    + Sync;

/// A named request handler with route metadata.
///
/// Handlers are closures returning a boxed future that borrows the context:
///
/// ```
/// use pylon_pipeline::Endpoint;
/// use serde_json::json;
///
/// let endpoint = Endpoint::get("/user", |ctx| {
///     Box::pin(async move {
///         let id = ctx.field("user_id").cloned().unwrap_or_default();
///         Ok(json!({ "id": id }).into())
///     })
/// });
///
/// assert_eq!(endpoint.path(), "/user");
/// assert!(endpoint.allows(&http::Method::GET));
/// ```
#[derive(Clone)]
pub struct Endpoint {
    path: String,
    methods: Vec<Method>,
    options: Value,
    handler: Arc<HandlerFn>,
}

impl Endpoint {
    /// Creates an endpoint answering the given methods.
    pub fn new<F>(path: impl Into<String>, methods: impl IntoIterator<Item = Method>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, CallResult<EndpointOutput>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            path: path.into(),
            methods: methods.into_iter().collect(),
            options: json!({}),
            handler: Arc::new(handler),
        }
    }

    /// Creates a `GET` endpoint.
    pub fn get<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, CallResult<EndpointOutput>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(path, [Method::GET], handler)
    }

    /// Creates a `POST` endpoint.
    pub fn post<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, CallResult<EndpointOutput>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(path, [Method::POST], handler)
    }

    /// Replaces the handler options.
    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// Sets `options.metadata`.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        match self.options.as_object_mut() {
            Some(options) => {
                options.insert("metadata".to_string(), metadata);
            }
            None => self.options = json!({ "metadata": metadata }),
        }
        self
    }

    /// Route pattern.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Methods this endpoint answers.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Handler options.
    #[must_use]
    pub fn options(&self) -> &Value {
        &self.options
    }

    /// `options.metadata`, if set.
    #[must_use]
    pub fn metadata(&self) -> Option<&Value> {
        self.options.get("metadata")
    }

    /// Whether the endpoint answers `method`.
    #[must_use]
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.iter().any(|m| m == method)
    }

    pub(crate) fn invoke<'a>(
        &self,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, CallResult<EndpointOutput>> {
        (self.handler)(ctx)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Endpoint {
        Endpoint::post("/sign-in", |_ctx| Box::pin(async { Ok(Value::Null.into()) }))
    }

    #[test]
    fn test_methods() {
        let endpoint = noop();
        assert!(endpoint.allows(&Method::POST));
        assert!(!endpoint.allows(&Method::GET));

        let both = Endpoint::new("/x", [Method::GET, Method::POST], |_ctx| {
            Box::pin(async { Ok(Value::Null.into()) })
        });
        assert_eq!(both.methods().len(), 2);
    }

    #[test]
    fn test_metadata() {
        let endpoint = noop().with_metadata(json!({"isAction": false}));
        assert_eq!(endpoint.metadata(), Some(&json!({"isAction": false})));

        let endpoint = noop()
            .with_options(Value::Null)
            .with_metadata(json!({"scope": "server"}));
        assert_eq!(endpoint.options(), &json!({"metadata": {"scope": "server"}}));
    }

    #[test]
    fn test_debug_omits_handler() {
        let rendered = format!("{:?}", noop());
        assert!(rendered.contains("/sign-in"));
    }
}
