//! Error types for Pylon.
//!
//! Two families of failure flow through the pipeline:
//!
//! - [`ApiError`]: an expected, classifiable failure carrying a symbolic
//!   [`ApiStatus`]. After-hooks may observe and recover from it.
//! - Anything else, carried as `anyhow::Error` inside
//!   [`CallError::Unhandled`]. These are integration or programming errors and
//!   propagate unchanged.
//!
//! `ApiStatus::Found` is special: it is the redirect signal produced by
//! `redirect()` and is never reported as a failure.

use crate::reply::merge_headers;
use crate::response::{json_response, Response};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type alias for endpoint, hook and middleware calls.
pub type CallResult<T> = Result<T, CallError>;

/// Symbolic status names carried by an [`ApiError`].
///
/// Serialized in `SCREAMING_SNAKE_CASE` (`"NOT_FOUND"`, `"FOUND"`, ...), the
/// same spelling used in error bodies and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiStatus {
    /// 200
    Ok,
    /// 201
    Created,
    /// 202
    Accepted,
    /// 204
    NoContent,
    /// 301
    MovedPermanently,
    /// 302, the redirect signal.
    Found,
    /// 303
    SeeOther,
    /// 304
    NotModified,
    /// 307
    TemporaryRedirect,
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 402
    PaymentRequired,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 405
    MethodNotAllowed,
    /// 408
    RequestTimeout,
    /// 409
    Conflict,
    /// 410
    Gone,
    /// 415
    UnsupportedMediaType,
    /// 422
    UnprocessableEntity,
    /// 429
    TooManyRequests,
    /// 500
    InternalServerError,
    /// 501
    NotImplemented,
    /// 502
    BadGateway,
    /// 503
    ServiceUnavailable,
    /// 504
    GatewayTimeout,
}

impl ApiStatus {
    /// Returns the HTTP status code for this status name.
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::Ok => StatusCode::OK,
            Self::Created => StatusCode::CREATED,
            Self::Accepted => StatusCode::ACCEPTED,
            Self::NoContent => StatusCode::NO_CONTENT,
            Self::MovedPermanently => StatusCode::MOVED_PERMANENTLY,
            Self::Found => StatusCode::FOUND,
            Self::SeeOther => StatusCode::SEE_OTHER,
            Self::NotModified => StatusCode::NOT_MODIFIED,
            Self::TemporaryRedirect => StatusCode::TEMPORARY_REDIRECT,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Gone => StatusCode::GONE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            Self::BadGateway => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Returns the symbolic name, e.g. `"NOT_FOUND"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "CREATED",
            Self::Accepted => "ACCEPTED",
            Self::NoContent => "NO_CONTENT",
            Self::MovedPermanently => "MOVED_PERMANENTLY",
            Self::Found => "FOUND",
            Self::SeeOther => "SEE_OTHER",
            Self::NotModified => "NOT_MODIFIED",
            Self::TemporaryRedirect => "TEMPORARY_REDIRECT",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::PaymentRequired => "PAYMENT_REQUIRED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::Conflict => "CONFLICT",
            Self::Gone => "GONE",
            Self::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            Self::UnprocessableEntity => "UNPROCESSABLE_ENTITY",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::BadGateway => "BAD_GATEWAY",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::GatewayTimeout => "GATEWAY_TIMEOUT",
        }
    }

    /// Returns true for the redirect signal.
    #[must_use]
    pub const fn is_redirect(self) -> bool {
        matches!(self, Self::Found)
    }

    /// Returns true for server-error class statuses (5xx).
    #[must_use]
    pub fn is_server_error(self) -> bool {
        self.status_code().is_server_error()
    }
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, classifiable failure.
///
/// `ApiError` is what handlers return for expected failures (validation,
/// authentication, not-found, internal). The pipeline attaches the response
/// headers accumulated during the call before the error leaves it, so
/// `headers()` is always present, possibly empty.
///
/// # Example
///
/// ```
/// use pylon_core::{ApiError, ApiStatus};
///
/// let err = ApiError::not_found("user not found");
/// assert_eq!(err.status(), ApiStatus::NotFound);
/// assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);
/// assert!(err.headers().is_empty());
/// ```
#[derive(Error, Debug, Clone)]
#[error("{status}: {message}")]
pub struct ApiError {
    status: ApiStatus,
    message: String,
    body: Option<Value>,
    headers: HeaderMap,
}

impl ApiError {
    /// Creates an error with a status and message.
    #[must_use]
    pub fn new(status: ApiStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// Creates an error whose message is the canonical reason phrase.
    #[must_use]
    pub fn from_status(status: ApiStatus) -> Self {
        let reason = status.status_code().canonical_reason().unwrap_or_default();
        Self::new(status, reason)
    }

    /// Creates the redirect signal.
    #[must_use]
    pub fn found() -> Self {
        Self::from_status(ApiStatus::Found)
    }

    /// Creates a `BAD_REQUEST` error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiStatus::BadRequest, message)
    }

    /// Creates an `UNAUTHORIZED` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ApiStatus::Unauthorized, message)
    }

    /// Creates a `FORBIDDEN` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ApiStatus::Forbidden, message)
    }

    /// Creates a `NOT_FOUND` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiStatus::NotFound, message)
    }

    /// Creates a `TOO_MANY_REQUESTS` error.
    #[must_use]
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(ApiStatus::TooManyRequests, message)
    }

    /// Creates an `INTERNAL_SERVER_ERROR` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ApiStatus::InternalServerError, message)
    }

    /// Attaches an explicit JSON body, replacing the default `{code, message}`.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns a copy of this error carrying the given headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Replaces the attached headers.
    pub fn set_headers(&mut self, headers: HeaderMap) {
        self.headers = headers;
    }

    /// Returns the symbolic status.
    #[must_use]
    pub const fn status(&self) -> ApiStatus {
        self.status
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.status.status_code()
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the explicit body, if one was attached.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Returns the attached response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns true if this is the redirect signal.
    #[must_use]
    pub const fn is_redirect(&self) -> bool {
        self.status.is_redirect()
    }

    /// Converts this error into a protocol-level response.
    ///
    /// The body is the explicit body if set, otherwise
    /// `{"code": "<STATUS>", "message": "<message>"}`. Attached headers are
    /// copied onto the response, `set-cookie` values appended.
    #[must_use]
    pub fn into_response(self) -> Response {
        let body = self.body.unwrap_or_else(|| {
            serde_json::json!({
                "code": self.status.as_str(),
                "message": self.message,
            })
        });
        let mut response = json_response(self.status.status_code(), &body);
        merge_headers(response.headers_mut(), &self.headers);
        response
    }
}

/// Any failure raised by an endpoint, hook or middleware.
#[derive(Error, Debug)]
pub enum CallError {
    /// A typed failure, eligible for after-hook recovery.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// An unclassified failure. Never recovered, always propagated.
    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

impl CallError {
    /// Wraps any error as an unclassified failure.
    pub fn unhandled<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unhandled(anyhow::Error::new(error))
    }

    /// Returns the typed error, if this is one.
    #[must_use]
    pub const fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            Self::Unhandled(_) => None,
        }
    }

    /// Returns true if this is the redirect signal.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        self.as_api().is_some_and(ApiError::is_redirect)
    }

    /// Returns the full message, including the cause chain for unclassified errors.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Api(err) => err.message().to_string(),
            Self::Unhandled(err) => format!("{err:#}"),
        }
    }

    /// Converts into a protocol-level response.
    ///
    /// Unclassified errors never leak their message to clients.
    #[must_use]
    pub fn into_response(self) -> Response {
        match self {
            Self::Api(err) => err.into_response(),
            Self::Unhandled(_) => ApiError::from_status(ApiStatus::InternalServerError).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_status_names_round_trip_through_serde() {
        let json = serde_json::to_string(&ApiStatus::InternalServerError).unwrap();
        assert_eq!(json, "\"INTERNAL_SERVER_ERROR\"");
        let status: ApiStatus = serde_json::from_str("\"NOT_FOUND\"").unwrap();
        assert_eq!(status, ApiStatus::NotFound);
        assert_eq!(status.as_str(), "NOT_FOUND");
    }

    #[test]
    fn test_found_is_redirect() {
        let err = ApiError::found();
        assert!(err.is_redirect());
        assert_eq!(err.status_code(), StatusCode::FOUND);
        assert_eq!(err.message(), "Found");
        assert!(!ApiError::not_found("x").is_redirect());
    }

    #[test]
    fn test_server_error_classification() {
        assert!(ApiStatus::InternalServerError.is_server_error());
        assert!(ApiStatus::BadGateway.is_server_error());
        assert!(!ApiStatus::NotFound.is_server_error());
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::unauthorized("missing session");
        assert_eq!(err.to_string(), "UNAUTHORIZED: missing session");
    }

    #[test]
    fn test_into_response_default_body() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace", HeaderValue::from_static("t1"));
        headers.append(http::header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(http::header::SET_COOKIE, HeaderValue::from_static("b=2"));

        let response = ApiError::forbidden("nope").with_headers(headers).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers().get("x-trace").unwrap(), "t1");
        assert_eq!(
            response.headers().get_all(http::header::SET_COOKIE).iter().count(),
            2
        );
    }

    #[test]
    fn test_call_error_conversions() {
        let err: CallError = ApiError::bad_request("bad").into();
        assert!(err.as_api().is_some());
        assert_eq!(err.message(), "bad");

        let err: CallError = anyhow::anyhow!("boom").context("while loading").into();
        assert!(err.as_api().is_none());
        assert!(err.message().contains("boom"));
        assert!(err.message().contains("while loading"));
    }

    #[test]
    fn test_unhandled_response_hides_message() {
        let err: CallError = anyhow::anyhow!("secret connection string").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
