//! Path-scoped plugin middleware.
//!
//! Plugins declare middlewares as a path pattern plus an [`Endpoint`]. When
//! merged, each one is bound to the global context so that its handler sees
//! the same merged context fields an endpoint would, whatever the transport
//! passes in.
//!
//! A middleware's output steers the request:
//!
//! - a JSON object is merged into the call's context fields,
//! - any other JSON value is ignored,
//! - a transport response answers the request immediately.
//!
//! # Patterns
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | `*`, `/**` | every path |
//! | `/admin/**`, `/admin/*` | `/admin` and everything below it |
//! | `/sign-in` | exactly `/sign-in` |

use std::sync::Arc;

use pylon_core::{merge_headers, CallError, CallResult, Reply};

use crate::context::{CallContext, RequestContext};
use crate::endpoint::Endpoint;
use crate::global::GlobalContext;

/// A middleware as declared by a plugin.
#[derive(Debug, Clone)]
pub struct PluginMiddleware {
    /// Path pattern the middleware applies to.
    pub path: String,
    /// Handler and options.
    pub endpoint: Endpoint,
}

impl PluginMiddleware {
    /// Creates a middleware declaration.
    pub fn new(path: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            path: path.into(),
            endpoint,
        }
    }
}

/// A merged middleware bound to the global context.
#[derive(Debug, Clone)]
pub struct Middleware {
    plugin: String,
    path: String,
    endpoint: Endpoint,
    global: Arc<GlobalContext>,
}

impl Middleware {
    pub(crate) fn bind(plugin: &str, declared: PluginMiddleware, global: Arc<GlobalContext>) -> Self {
        Self {
            plugin: plugin.to_string(),
            path: declared.path,
            endpoint: declared.endpoint,
            global,
        }
    }

    /// Id of the plugin that declared this middleware.
    #[must_use]
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Declared path pattern.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared endpoint (options and methods preserved).
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Whether the pattern covers `path`.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        pattern_matches(&self.path, path)
    }

    /// Runs the middleware with the caller's context merged over the global
    /// context.
    ///
    /// Headers set before an [`ApiError`](pylon_core::ApiError) is raised
    /// travel on the error; headers the error already carries win.
    pub async fn call(&self, call: &CallContext) -> CallResult<Reply> {
        let mut ctx = RequestContext::new(Arc::clone(&self.global), &self.plugin, &self.path, call);
        match self.endpoint.invoke(&mut ctx).await {
            Ok(output) => Ok(Reply::new(output, ctx.take_response_headers())),
            Err(CallError::Api(mut error)) => {
                let mut headers = ctx.take_response_headers();
                merge_headers(&mut headers, error.headers());
                error.set_headers(headers);
                Err(error.into())
            }
            Err(error) => Err(error),
        }
    }
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern == "*" || pattern == "/**" {
        return true;
    }
    let prefix = pattern
        .strip_suffix("/**")
        .or_else(|| pattern.strip_suffix("/*"));
    match prefix {
        Some(prefix) => {
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        }
        None => pattern == path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::test_context;
    use http::HeaderValue;
    use pylon_core::{ApiError, ApiStatus};
    use serde_json::json;

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("*", "/anything"));
        assert!(pattern_matches("/**", "/"));
        assert!(pattern_matches("/admin/**", "/admin"));
        assert!(pattern_matches("/admin/**", "/admin/users/1"));
        assert!(pattern_matches("/admin/*", "/admin/users"));
        assert!(!pattern_matches("/admin/**", "/administrator"));
        assert!(pattern_matches("/sign-in", "/sign-in"));
        assert!(!pattern_matches("/sign-in", "/sign-in/email"));
    }

    #[tokio::test]
    async fn test_call_sees_merged_context() {
        let mut global = test_context();
        global.fields.insert("app".into(), json!("pylon"));
        let declared = PluginMiddleware::new(
            "/**",
            Endpoint::get("/**", |ctx| {
                Box::pin(async move {
                    ctx.set_header("x-mw", HeaderValue::from_static("1"));
                    Ok(json!({
                        "app": ctx.field("app").cloned(),
                        "caller": ctx.field("caller").cloned(),
                    })
                    .into())
                })
            }),
        );
        let middleware = Middleware::bind("audit", declared, Arc::new(global));

        let reply = middleware
            .call(&CallContext::new().field("caller", "transport"))
            .await
            .unwrap();

        assert_eq!(reply.json(), Some(&json!({"app": "pylon", "caller": "transport"})));
        assert_eq!(reply.headers.get("x-mw").unwrap(), "1");
        assert_eq!(middleware.plugin(), "audit");
        assert_eq!(middleware.path(), "/**");
    }

    #[tokio::test]
    async fn test_error_keeps_headers_set_before_failing() {
        let declared = PluginMiddleware::new(
            "/**",
            Endpoint::get("/**", |ctx| {
                Box::pin(async move {
                    ctx.set_header("x-mw", HeaderValue::from_static("1"));
                    ctx.set_header("x-shared", HeaderValue::from_static("ctx"));
                    let mut headers = http::HeaderMap::new();
                    headers.insert("x-shared", HeaderValue::from_static("error"));
                    Err(ApiError::unauthorized("no session").with_headers(headers).into())
                })
            }),
        );
        let middleware = Middleware::bind("session", declared, Arc::new(test_context()));

        let err = middleware.call(&CallContext::new()).await.unwrap_err();
        let api = err.as_api().unwrap();
        assert_eq!(api.status(), ApiStatus::Unauthorized);
        assert_eq!(api.headers().get("x-mw").unwrap(), "1");
        assert_eq!(api.headers().get("x-shared").unwrap(), "error");
    }
}
