//! Call and per-request context types.
//!
//! A [`CallContext`] is what the caller hands to [`Api::call`](crate::Api::call):
//! headers, body, query, path params and extra context fields. The pipeline
//! never mutates it. Each call builds a fresh [`RequestContext`] from it,
//! with an empty response-header collection, that every hook and the
//! endpoint handler work against.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use http::header::{self, IntoHeaderName};
use http::{HeaderMap, HeaderValue, Method};
use pylon_core::cookie::{self, CookieError, CookiePrefix, SetCookie};
use pylon_core::{Adapter, ApiError, ApiStatus, EndpointOutput, Response};
use pylon_telemetry::Logger;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::global::{Fields, GlobalContext};

/// Caller-supplied input for one endpoint call.
///
/// # Example
///
/// ```
/// use http::{header, HeaderValue, Method};
/// use pylon_pipeline::CallContext;
///
/// let call = CallContext::new()
///     .method(Method::POST)
///     .header(header::COOKIE, HeaderValue::from_static("session=abc"))
///     .body(serde_json::json!({"email": "a@example.com"}))
///     .field("tenant", "acme");
///
/// assert_eq!(call.method, Method::POST);
/// assert_eq!(call.context["tenant"], "acme");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// HTTP method of the call.
    pub method: Method,
    /// Request headers.
    pub headers: HeaderMap,
    /// Parsed request body, `Null` when absent.
    pub body: Value,
    /// Query string values.
    pub query: Fields,
    /// Path parameters extracted by the transport's router.
    pub params: Fields,
    /// Extra context fields; these win over plugin-contributed fields.
    pub context: Fields,
}

impl CallContext {
    /// Creates an empty `GET` call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Adds a query value.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Adds a path parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Adds a context field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(name.into(), value.into());
        self
    }
}

/// The value a call is about to return, as seen by after-hooks.
#[derive(Debug)]
pub enum Returned {
    /// The handler (or a hook) produced a JSON value.
    Success(Value),
    /// A typed error that after-hooks may still replace.
    Recovered(ApiError),
    /// A complete transport response.
    Replaced(Response),
}

impl Returned {
    /// Returns the JSON value, if this is a success.
    #[must_use]
    pub fn as_success(&self) -> Option<&Value> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the error, if the call is currently failing.
    #[must_use]
    pub fn as_error(&self) -> Option<&ApiError> {
        match self {
            Self::Recovered(error) => Some(error),
            _ => None,
        }
    }
}

impl From<EndpointOutput> for Returned {
    fn from(output: EndpointOutput) -> Self {
        match output {
            EndpointOutput::Json(value) => Self::Success(value),
            EndpointOutput::Response(response) => Self::Replaced(response),
        }
    }
}

/// Changes a before-hook applies to the live request context.
///
/// Fields are merged (patch wins); body, query and params are replaced when
/// set.
#[derive(Debug, Clone, Default)]
pub struct ContextPatch {
    fields: Fields,
    body: Option<Value>,
    query: Option<Fields>,
    params: Option<Fields>,
}

impl ContextPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a context field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Replaces the query values.
    #[must_use]
    pub fn query(mut self, query: Fields) -> Self {
        self.query = Some(query);
        self
    }

    /// Replaces the path parameters.
    #[must_use]
    pub fn params(mut self, params: Fields) -> Self {
        self.params = Some(params);
        self
    }
}

/// Per-call state shared by the hooks and the endpoint handler of one call.
pub struct RequestContext {
    global: Arc<GlobalContext>,
    endpoint: String,
    path: String,
    method: Method,
    headers: HeaderMap,
    body: Value,
    query: Fields,
    params: Fields,
    fields: Fields,
    response_headers: HeaderMap,
    returned: Option<Returned>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl RequestContext {
    /// Builds a fresh context for one call.
    ///
    /// Plugin-contributed global fields are merged with the caller's fields,
    /// the caller winning on collisions. The response-header collection
    /// starts empty.
    pub(crate) fn new(
        global: Arc<GlobalContext>,
        endpoint: &str,
        path: &str,
        call: &CallContext,
    ) -> Self {
        let mut fields = global.fields().clone();
        fields.extend(call.context.clone());

        Self {
            global,
            endpoint: endpoint.to_string(),
            path: path.to_string(),
            method: call.method.clone(),
            headers: call.headers.clone(),
            body: call.body.clone(),
            query: call.query.clone(),
            params: call.params.clone(),
            fields,
            response_headers: HeaderMap::new(),
            returned: None,
            extensions: HashMap::new(),
        }
    }

    /// The global context.
    #[must_use]
    pub fn global(&self) -> &GlobalContext {
        &self.global
    }

    /// The level-gated logger.
    #[must_use]
    pub fn logger(&self) -> &Logger {
        self.global.logger()
    }

    /// The storage adapter.
    #[must_use]
    pub fn adapter(&self) -> &dyn Adapter {
        self.global.adapter()
    }

    /// Name of the endpoint being called.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Route pattern of the endpoint being called.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// HTTP method of the call.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body.
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Deserializes the body.
    ///
    /// # Errors
    ///
    /// Returns a `BAD_REQUEST` error if the body does not match `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))
    }

    /// Query string values.
    #[must_use]
    pub fn query(&self) -> &Fields {
        &self.query
    }

    /// Path parameters.
    #[must_use]
    pub fn params(&self) -> &Fields {
        &self.params
    }

    /// Merged context fields.
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// A single context field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets a context field for the rest of this call.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Stores a typed value for the rest of this call.
    pub fn insert_extension<T: Any + Send + Sync>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a typed value stored earlier in this call.
    #[must_use]
    pub fn extension<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref())
    }

    /// Sets a response header, replacing earlier values.
    pub fn set_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.response_headers.insert(name, value);
    }

    /// Appends a `Set-Cookie` response header.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie cannot be encoded as a header value.
    pub fn set_cookie(&mut self, cookie: &SetCookie) -> Result<(), CookieError> {
        self.response_headers
            .append(header::SET_COOKIE, cookie.to_header()?);
        Ok(())
    }

    /// Appends a signed `Set-Cookie` response header.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is unusable or the cookie cannot be
    /// encoded.
    pub fn set_signed_cookie(&mut self, cookie: SetCookie, secret: &[u8]) -> Result<(), CookieError> {
        let signed = cookie.signed(secret)?;
        self.set_cookie(&signed)
    }

    /// Reads a cookie from the request's `Cookie` header.
    #[must_use]
    pub fn get_cookie(&self, name: &str, prefix: Option<CookiePrefix>) -> Option<String> {
        cookie::get_cookie(&self.headers, name, prefix)
    }

    /// Reads and verifies a signed cookie. Tampered or unsigned values read
    /// as absent.
    #[must_use]
    pub fn get_signed_cookie(
        &self,
        name: &str,
        secret: &[u8],
        prefix: Option<CookiePrefix>,
    ) -> Option<String> {
        cookie::get_signed_cookie(&self.headers, name, secret, prefix)
    }

    /// Sets `Location` and returns the `FOUND` signal for the caller to
    /// return or raise.
    pub fn redirect(&mut self, url: &str) -> ApiError {
        match HeaderValue::from_str(url) {
            Ok(location) => {
                self.response_headers.insert(header::LOCATION, location);
                ApiError::from_status(ApiStatus::Found)
            }
            Err(_) => ApiError::internal(format!("invalid redirect location: {url:?}")),
        }
    }

    /// Headers accumulated for the response so far.
    #[must_use]
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Mutable access to the accumulated response headers.
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    /// What the call will return, once the handler has run.
    #[must_use]
    pub fn returned(&self) -> Option<&Returned> {
        self.returned.as_ref()
    }

    pub(crate) fn apply(&mut self, patch: ContextPatch) {
        self.fields.extend(patch.fields);
        if let Some(body) = patch.body {
            self.body = body;
        }
        if let Some(query) = patch.query {
            self.query = query;
        }
        if let Some(params) = patch.params {
            self.params = params;
        }
    }

    pub(crate) fn set_returned(&mut self, returned: Returned) {
        self.returned = Some(returned);
    }

    pub(crate) fn take_returned(&mut self) -> Option<Returned> {
        self.returned.take()
    }

    pub(crate) fn replace_response_headers(&mut self, headers: HeaderMap) {
        self.response_headers = headers;
    }

    pub(crate) fn take_response_headers(&mut self) -> HeaderMap {
        std::mem::take(&mut self.response_headers)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("endpoint", &self.endpoint)
            .field("path", &self.path)
            .field("method", &self.method)
            .field("fields", &self.fields)
            .field("response_headers", &self.response_headers)
            .field("returned", &self.returned)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::test_context;
    use serde_json::json;

    fn request_context(call: &CallContext) -> RequestContext {
        let mut global = test_context();
        global.fields.insert("tenant".into(), json!("global"));
        global.fields.insert("region".into(), json!("eu"));
        RequestContext::new(Arc::new(global), "getUser", "/user", call)
    }

    #[test]
    fn test_caller_fields_win() {
        let call = CallContext::new().field("tenant", "caller");
        let ctx = request_context(&call);
        assert_eq!(ctx.field("tenant"), Some(&json!("caller")));
        assert_eq!(ctx.field("region"), Some(&json!("eu")));
        assert_eq!(ctx.endpoint(), "getUser");
        assert_eq!(ctx.path(), "/user");
    }

    #[test]
    fn test_caller_context_not_mutated() {
        let call = CallContext::new().field("tenant", "caller");
        let mut ctx = request_context(&call);
        ctx.set_field("tenant", "changed");
        ctx.apply(ContextPatch::new().field("extra", 1).body(json!({"a": 1})));

        assert_eq!(call.context.len(), 1);
        assert_eq!(call.context["tenant"], "caller");
        assert_eq!(call.body, Value::Null);
        assert_eq!(ctx.body(), &json!({"a": 1}));
        assert_eq!(ctx.field("extra"), Some(&json!(1)));
    }

    #[test]
    fn test_header_helpers() {
        let mut ctx = request_context(&CallContext::new());
        assert!(ctx.response_headers().is_empty());

        ctx.set_header("x-one", HeaderValue::from_static("a"));
        ctx.set_header("x-one", HeaderValue::from_static("b"));
        ctx.set_cookie(&SetCookie::new("a", "1")).unwrap();
        ctx.set_cookie(&SetCookie::new("b", "2")).unwrap();

        assert_eq!(ctx.response_headers().get("x-one").unwrap(), "b");
        assert_eq!(
            ctx.response_headers()
                .get_all(header::SET_COOKIE)
                .iter()
                .count(),
            2
        );
    }

    #[test]
    fn test_cookie_readers() {
        let signed = cookie::sign_value("u1", b"secret").unwrap();
        let call = CallContext::new().header(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; __Secure-sid={signed}")).unwrap(),
        );
        let ctx = request_context(&call);

        assert_eq!(ctx.get_cookie("theme", None).as_deref(), Some("dark"));
        assert_eq!(ctx.get_cookie("missing", None), None);
        assert_eq!(
            ctx.get_signed_cookie("sid", b"secret", Some(CookiePrefix::Secure))
                .as_deref(),
            Some("u1")
        );
        assert_eq!(
            ctx.get_signed_cookie("sid", b"other", Some(CookiePrefix::Secure)),
            None
        );
    }

    #[test]
    fn test_redirect_sets_location() {
        let mut ctx = request_context(&CallContext::new());
        let err = ctx.redirect("/login");
        assert_eq!(err.status(), ApiStatus::Found);
        assert_eq!(ctx.response_headers().get(header::LOCATION).unwrap(), "/login");

        let err = ctx.redirect("bad\nurl");
        assert_eq!(err.status(), ApiStatus::InternalServerError);
    }

    #[test]
    fn test_extensions() {
        #[derive(Debug, PartialEq)]
        struct Session(&'static str);

        let mut ctx = request_context(&CallContext::new());
        assert!(ctx.extension::<Session>().is_none());
        ctx.insert_extension(Session("s1"));
        assert_eq!(ctx.extension::<Session>(), Some(&Session("s1")));
    }

    #[test]
    fn test_body_as() {
        #[derive(Debug, serde::Deserialize)]
        struct SignIn {
            email: String,
        }

        let call = CallContext::new().body(json!({"email": "a@example.com"}));
        let ctx = request_context(&call);
        let body: SignIn = ctx.body_as().unwrap();
        assert_eq!(body.email, "a@example.com");

        let ctx = request_context(&CallContext::new());
        let err = ctx.body_as::<SignIn>().unwrap_err();
        assert_eq!(err.status(), ApiStatus::BadRequest);
    }
}
