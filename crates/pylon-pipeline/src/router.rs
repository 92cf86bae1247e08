//! The request lifecycle around the endpoint table.
//!
//! A [`Router`] does not match URLs; the transport maps a request to an
//! endpoint name and hands both to [`Router::dispatch`]:
//!
//! ```text
//! on_request ──► middlewares ──► Api::call ──► reconcile ──► on_response
//!     │               │              │
//!     │ response      │ response     │ error ─► on_error ─► error response
//!     ▼               ▼              ▼
//!  returned       reconcile     (or propagated)
//! ```

use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use http_body_util::BodyExt;
use pylon_core::{
    merge_headers, ApiError, ApiStatus, CallError, CallResult, EndpointOutput, Reply, Request,
    Response,
};
use serde_json::Value;

use crate::api::Api;
use crate::context::CallContext;
use crate::global::Fields;
use crate::middleware::Middleware;
use crate::plugin::Plugin;
use crate::rate_limit::RateLimiter;
use crate::report::{ErrorDisposition, ErrorReporter};

/// Lifecycle wrapper used by transports.
#[derive(Clone)]
pub struct Router {
    api: Arc<Api>,
    plugins: Vec<Arc<dyn Plugin>>,
    rate_limiter: RateLimiter,
    reporter: ErrorReporter,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("base_path", &self.base_path())
            .field("plugins", &self.plugins.iter().map(|p| p.id()).collect::<Vec<_>>())
            .field("rate_limiter", &self.rate_limiter)
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

impl Router {
    pub(crate) fn new(
        api: Arc<Api>,
        plugins: Vec<Arc<dyn Plugin>>,
        rate_limiter: RateLimiter,
        reporter: ErrorReporter,
    ) -> Self {
        Self {
            api,
            plugins,
            rate_limiter,
            reporter,
        }
    }

    /// Path prefix the transport should mount the router under.
    #[must_use]
    pub fn base_path(&self) -> &str {
        self.api.context().base_path()
    }

    /// The endpoint table.
    #[must_use]
    pub fn api(&self) -> &Arc<Api> {
        &self.api
    }

    /// Plugin middlewares, in merge order.
    #[must_use]
    pub fn middlewares(&self) -> &[Middleware] {
        self.api.middlewares()
    }

    /// Runs plugin request interceptors, then the rate limiter.
    ///
    /// The first plugin returning a response wins; later plugins and the
    /// rate limiter do not run.
    pub async fn on_request(&self, request: &Request) -> Option<Response> {
        let global = self.api.context();
        for plugin in &self.plugins {
            if let Some(response) = plugin.on_request(request, global).await {
                tracing::debug!(plugin = %plugin.id(), "plugin answered the request");
                return Some(response);
            }
        }
        self.rate_limiter.check(request).await
    }

    /// Runs plugin response interceptors. The first replacement wins.
    pub async fn on_response(&self, response: Response) -> Response {
        let global = self.api.context();
        for plugin in &self.plugins {
            if let Some(replacement) = plugin.on_response(&response, global).await {
                tracing::debug!(plugin = %plugin.id(), "plugin replaced the response");
                return replacement;
            }
        }
        response
    }

    /// Applies the error policy to a failed call.
    pub fn on_error(&self, error: &CallError) -> ErrorDisposition {
        self.reporter.report(error)
    }

    /// Serves one request with the endpoint registered as `name`.
    ///
    /// # Errors
    ///
    /// Only when the error policy propagates errors (`on_api_error.throw`);
    /// every other failure is rendered as an error response.
    pub async fn dispatch(&self, name: &str, request: Request) -> Result<Response, CallError> {
        if let Some(response) = self.on_request(&request).await {
            return Ok(response);
        }

        let response = match self.serve(name, request).await {
            Ok(reply) => reply.into_response(),
            Err(error) => match self.on_error(&error) {
                ErrorDisposition::Propagate => return Err(error),
                _ => error.into_response(),
            },
        };

        Ok(self.on_response(response).await)
    }

    async fn serve(&self, name: &str, request: Request) -> CallResult<Reply> {
        let endpoint = self
            .api
            .endpoint(name)
            .ok_or_else(|| ApiError::not_found(format!("unknown endpoint: {name}")))?;
        if !endpoint.allows(request.method()) {
            return Err(ApiError::new(
                ApiStatus::MethodNotAllowed,
                format!("{} is not allowed on {name}", request.method()),
            )
            .into());
        }

        let path = relative_path(self.base_path(), request.uri().path()).to_string();
        let mut call = call_context(request).await?;

        let mut headers = HeaderMap::new();
        for middleware in self.middlewares().iter().filter(|m| m.matches(&path)) {
            let reply = match middleware.call(&call).await {
                Ok(reply) => reply,
                Err(CallError::Api(mut error)) => {
                    merge_headers(&mut headers, error.headers());
                    error.set_headers(headers);
                    return Err(error.into());
                }
                Err(error) => return Err(error),
            };
            merge_headers(&mut headers, &reply.headers);
            match reply.output {
                EndpointOutput::Json(Value::Object(fields)) => call.context.extend(fields),
                EndpointOutput::Json(_) => {}
                response @ EndpointOutput::Response(_) => {
                    tracing::debug!(plugin = %middleware.plugin(), "middleware answered the request");
                    return Ok(Reply::new(response, headers));
                }
            }
        }

        match self.api.call(name, &call).await {
            Ok(mut reply) => {
                merge_headers(&mut headers, &reply.headers);
                reply.headers = headers;
                Ok(reply)
            }
            Err(CallError::Api(mut error)) => {
                merge_headers(&mut headers, error.headers());
                error.set_headers(headers);
                Err(error.into())
            }
            Err(error) => Err(error),
        }
    }
}

/// `path` relative to `base`, or `path` itself when it is not under `base`.
pub(crate) fn relative_path<'p>(base: &str, path: &'p str) -> &'p str {
    match path.strip_prefix(base) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

async fn call_context(request: Request) -> CallResult<CallContext> {
    let (parts, body) = request.into_parts();

    let query = parts
        .uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect::<Fields>()
        })
        .unwrap_or_default();

    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    };

    Ok(CallContext {
        method: parts.method,
        headers: parts.headers,
        body: parse_body(&bytes)?,
        query,
        params: Fields::new(),
        context: Fields::new(),
    })
}

fn parse_body(bytes: &Bytes) -> CallResult<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes)
        .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")).into())
}
