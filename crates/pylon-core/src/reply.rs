//! Successful call results and header reconciliation.

use crate::response::{json_response, EndpointOutput, Response};
use http::{header, HeaderMap, StatusCode};
use serde_json::Value;

/// Copies every header from `source` into `target`.
///
/// `set-cookie` values are appended so that several cookies survive; any
/// other name replaces what `target` already holds.
pub fn merge_headers(target: &mut HeaderMap, source: &HeaderMap) {
    for name in source.keys() {
        if name == header::SET_COOKIE {
            for value in source.get_all(name) {
                target.append(name.clone(), value.clone());
            }
        } else if let Some(value) = source.get_all(name).iter().last() {
            target.insert(name.clone(), value.clone());
        }
    }
}

/// The result of a successful endpoint call: the output plus the response
/// headers accumulated while producing it.
#[derive(Debug)]
pub struct Reply {
    /// What the endpoint (or a hook) produced.
    pub output: EndpointOutput,
    /// Headers set during the call.
    pub headers: HeaderMap,
}

impl Reply {
    /// Creates a reply.
    #[must_use]
    pub fn new(output: EndpointOutput, headers: HeaderMap) -> Self {
        Self { output, headers }
    }

    /// Returns the JSON value, if the output is one.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        self.output.as_json()
    }

    /// Converts into a transport response.
    ///
    /// JSON outputs become `200 OK`. Accumulated headers are merged on top of
    /// whatever a replaced response already carries.
    #[must_use]
    pub fn into_response(self) -> Response {
        let mut response = match self.output {
            EndpointOutput::Json(value) => json_response(StatusCode::OK, &value),
            EndpointOutput::Response(response) => response,
        };
        merge_headers(response.headers_mut(), &self.headers);
        response
    }
}
