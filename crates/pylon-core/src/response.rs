//! Request, response and output types used throughout the pipeline.

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// The HTTP request type handed to the pipeline by the transport.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type returned to the transport.
pub type Response = http::Response<Full<Bytes>>;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The value produced by an endpoint, a short-circuiting before-hook or a
/// replacing after-hook.
#[derive(Debug)]
pub enum EndpointOutput {
    /// A JSON value, rendered as `200 OK` by the transport.
    Json(Value),
    /// A complete transport response.
    Response(Response),
}

impl EndpointOutput {
    /// Serializes any value into a JSON output.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Json)
    }

    /// Returns the JSON value, if this is one.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Response(_) => None,
        }
    }

    /// Returns the response, if this is one.
    #[must_use]
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Self::Json(_) => None,
            Self::Response(response) => Some(response),
        }
    }
}

impl From<Value> for EndpointOutput {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Response> for EndpointOutput {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

/// Builds a JSON response with the given status.
#[must_use]
pub fn json_response(status: StatusCode, body: &Value) -> Response {
    let mut response = http::Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_json_response() {
        let response = json_response(StatusCode::CREATED, &serde_json::json!({"id": 7}));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"id":7}"#);
    }

    #[test]
    fn test_output_accessors() {
        let output = EndpointOutput::from(serde_json::json!({"ok": true}));
        assert_eq!(output.as_json(), Some(&serde_json::json!({"ok": true})));
        assert!(output.as_response().is_none());

        #[derive(Serialize)]
        struct User {
            id: u32,
        }
        let output = EndpointOutput::json(&User { id: 1 }).unwrap();
        assert_eq!(output.as_json(), Some(&serde_json::json!({"id": 1})));
    }
}
