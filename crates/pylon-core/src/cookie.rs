//! Cookie parsing, `Set-Cookie` building and HMAC signing.
//!
//! Reading is a pure operation over the request's `Cookie` header(s).
//! Writing produces `Set-Cookie` header values which the pipeline appends to
//! the per-call response headers.
//!
//! Signed cookies carry `value.signature`, where the signature is the
//! URL-safe base64 HMAC-SHA256 of the value under the application secret.
//!
//! # Example
//!
//! ```
//! use pylon_core::cookie::{sign_value, verify_signed_value, SameSite, SetCookie};
//!
//! let signed = sign_value("abc123", b"secret").unwrap();
//! assert_eq!(verify_signed_value(&signed, b"secret").as_deref(), Some("abc123"));
//! assert_eq!(verify_signed_value(&signed, b"other"), None);
//!
//! let cookie = SetCookie::new("session", signed)
//!     .http_only(true)
//!     .same_site(SameSite::Lax)
//!     .path("/");
//! assert!(cookie.to_header_value().starts_with("session=abc123."));
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use http::{header, HeaderMap, HeaderValue};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Errors raised while writing cookies.
#[derive(Debug, Error)]
pub enum CookieError {
    /// The signing secret was rejected by the MAC.
    #[error("invalid cookie signing secret")]
    InvalidSecret,

    /// The cookie could not be encoded as a header value.
    #[error("cookie `{name}` is not a valid header value")]
    InvalidHeaderValue {
        /// Name of the offending cookie.
        name: String,
    },
}

impl From<CookieError> for crate::CallError {
    fn from(error: CookieError) -> Self {
        Self::unhandled(error)
    }
}

/// Name prefixes with browser-enforced semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookiePrefix {
    /// `__Secure-`: the cookie must be set with `Secure`.
    Secure,
    /// `__Host-`: `Secure`, no `Domain`, `Path=/`.
    Host,
}

impl CookiePrefix {
    /// Returns the literal prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Secure => "__Secure-",
            Self::Host => "__Host-",
        }
    }

    /// Returns the prefixed cookie name.
    #[must_use]
    pub fn apply(self, name: &str) -> String {
        format!("{}{name}", self.as_str())
    }
}

fn prefixed(name: &str, prefix: Option<CookiePrefix>) -> String {
    prefix.map_or_else(|| name.to_string(), |p| p.apply(name))
}

/// Parsed request cookies.
#[derive(Debug, Clone, Default)]
pub struct Cookies {
    cookies: HashMap<String, String>,
}

impl Cookies {
    /// Parses a single `Cookie` header value.
    #[must_use]
    pub fn parse(header_value: &str) -> Self {
        let mut cookies = Self::default();
        cookies.extend_from(header_value);
        cookies
    }

    /// Parses every `Cookie` header in a header map.
    ///
    /// Values that are not valid UTF-8 are skipped.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = Self::default();
        for value in headers.get_all(header::COOKIE) {
            if let Ok(value) = value.to_str() {
                cookies.extend_from(value);
            }
        }
        cookies
    }

    fn extend_from(&mut self, header_value: &str) {
        for pair in header_value.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                let value = value.trim().trim_matches('"');
                self.cookies
                    .entry(name.trim().to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
    }

    /// Returns a cookie value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Returns the number of cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Returns true if no cookies were sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// Reads a cookie from request headers, honoring an optional name prefix.
#[must_use]
pub fn get_cookie(headers: &HeaderMap, name: &str, prefix: Option<CookiePrefix>) -> Option<String> {
    Cookies::from_headers(headers)
        .get(&prefixed(name, prefix))
        .map(ToString::to_string)
}

/// Reads and verifies a signed cookie.
///
/// Returns `None` when the cookie is missing or its signature does not verify.
#[must_use]
pub fn get_signed_cookie(
    headers: &HeaderMap,
    name: &str,
    secret: &[u8],
    prefix: Option<CookiePrefix>,
) -> Option<String> {
    let raw = get_cookie(headers, name, prefix)?;
    let verified = verify_signed_value(&raw, secret);
    if verified.is_none() {
        tracing::debug!(cookie = %name, "signed cookie failed verification");
    }
    verified
}

/// Signs a value, producing `value.signature`.
pub fn sign_value(value: &str, secret: &[u8]) -> Result<String, CookieError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| CookieError::InvalidSecret)?;
    mac.update(value.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{value}.{signature}"))
}

/// Verifies a `value.signature` string, returning the value if it is authentic.
#[must_use]
pub fn verify_signed_value(signed: &str, secret: &[u8]) -> Option<String> {
    let (value, signature) = signed.rsplit_once('.')?;
    let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(value.as_bytes());
    mac.verify_slice(&signature).ok()?;
    Some(value.to_string())
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    /// Cookie is sent with cross-site requests.
    None,
    /// Cookie is sent with same-site and cross-site top-level navigations.
    #[default]
    Lax,
    /// Cookie is only sent with same-site requests.
    Strict,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Lax => write!(f, "Lax"),
            Self::Strict => write!(f, "Strict"),
        }
    }
}

/// Builder for a `Set-Cookie` header value.
#[derive(Debug, Clone)]
pub struct SetCookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    max_age: Option<Duration>,
    expires: Option<String>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
    prefix: Option<CookiePrefix>,
}

impl SetCookie {
    /// Creates a new `Set-Cookie` builder.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            max_age: None,
            expires: None,
            secure: false,
            http_only: false,
            same_site: None,
            prefix: None,
        }
    }

    /// Creates a cookie that removes the named cookie (`Max-Age=0`).
    #[must_use]
    pub fn remove(name: impl Into<String>) -> Self {
        Self::new(name, "").max_age_secs(0)
    }

    /// Sets the `Domain` attribute.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets the `Path` attribute.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the `Max-Age` attribute.
    #[must_use]
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.max_age = Some(duration);
        self
    }

    /// Sets the `Max-Age` attribute in seconds.
    #[must_use]
    pub fn max_age_secs(self, seconds: u64) -> Self {
        self.max_age(Duration::from_secs(seconds))
    }

    /// Sets the `Expires` attribute (HTTP date format).
    #[must_use]
    pub fn expires(mut self, date: impl Into<String>) -> Self {
        self.expires = Some(date.into());
        self
    }

    /// Sets the `Secure` attribute.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the `HttpOnly` attribute.
    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Sets the `SameSite` attribute.
    #[must_use]
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Prefixes the cookie name.
    ///
    /// `Host` also forces `Secure`, `Path=/` and drops `Domain`; `Secure`
    /// forces `Secure`.
    #[must_use]
    pub fn prefix(mut self, prefix: CookiePrefix) -> Self {
        self.prefix = Some(prefix);
        self.secure = true;
        if prefix == CookiePrefix::Host {
            self.path = Some("/".to_string());
            self.domain = None;
        }
        self
    }

    /// Returns the cookie name as sent, including any prefix.
    #[must_use]
    pub fn name(&self) -> String {
        prefixed(&self.name, self.prefix)
    }

    /// Returns the cookie value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    pub(crate) fn with_value(mut self, value: String) -> Self {
        self.value = value;
        self
    }

    /// Renders the `Set-Cookie` header value.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name(), self.value)];

        if let Some(ref domain) = self.domain {
            parts.push(format!("Domain={domain}"));
        }
        if let Some(ref path) = self.path {
            parts.push(format!("Path={path}"));
        }
        if let Some(max_age) = self.max_age {
            parts.push(format!("Max-Age={}", max_age.as_secs()));
        }
        if let Some(ref expires) = self.expires {
            parts.push(format!("Expires={expires}"));
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        if let Some(same_site) = self.same_site {
            parts.push(format!("SameSite={same_site}"));
        }

        parts.join("; ")
    }

    /// Renders the cookie as a header value.
    pub fn to_header(&self) -> Result<HeaderValue, CookieError> {
        HeaderValue::from_str(&self.to_header_value()).map_err(|_| CookieError::InvalidHeaderValue {
            name: self.name(),
        })
    }

    /// Signs the value under `secret`.
    pub fn signed(self, secret: &[u8]) -> Result<Self, CookieError> {
        let value = sign_value(&self.value, secret)?;
        Ok(self.with_value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(cookie: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static(cookie));
        headers
    }

    #[test]
    fn test_parse_multiple_cookies() {
        let cookies = Cookies::parse("session=abc123; theme=dark;lang=\"en\"");
        assert_eq!(cookies.get("session"), Some("abc123"));
        assert_eq!(cookies.get("theme"), Some("dark"));
        assert_eq!(cookies.get("lang"), Some("en"));
        assert_eq!(cookies.len(), 3);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let cookies = Cookies::parse("a=1; a=2");
        assert_eq!(cookies.get("a"), Some("1"));
    }

    #[test]
    fn test_get_cookie_with_prefix() {
        let headers = headers_with("__Secure-session=s1; __Host-csrf=c1; plain=p");
        assert_eq!(get_cookie(&headers, "session", Some(CookiePrefix::Secure)).as_deref(), Some("s1"));
        assert_eq!(get_cookie(&headers, "csrf", Some(CookiePrefix::Host)).as_deref(), Some("c1"));
        assert_eq!(get_cookie(&headers, "plain", None).as_deref(), Some("p"));
        assert_eq!(get_cookie(&headers, "session", None), None);
    }

    #[test]
    fn test_missing_cookie_header() {
        assert!(Cookies::from_headers(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn test_signed_cookie_round_trip() {
        let signed = sign_value("user-1", b"k").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("token={signed}")).unwrap(),
        );
        assert_eq!(get_signed_cookie(&headers, "token", b"k", None).as_deref(), Some("user-1"));
        assert_eq!(get_signed_cookie(&headers, "token", b"wrong", None), None);
    }

    #[test]
    fn test_tampered_value_fails_verification() {
        let signed = sign_value("user-1", b"k").unwrap();
        let tampered = signed.replacen("user-1", "user-2", 1);
        assert_eq!(verify_signed_value(&tampered, b"k"), None);
        assert_eq!(verify_signed_value("no-signature", b"k"), None);
    }

    #[test]
    fn test_set_cookie_attributes() {
        let cookie = SetCookie::new("session", "abc")
            .domain("example.com")
            .path("/")
            .max_age_secs(60)
            .secure(true)
            .http_only(true)
            .same_site(SameSite::Strict);
        assert_eq!(
            cookie.to_header_value(),
            "session=abc; Domain=example.com; Path=/; Max-Age=60; Secure; HttpOnly; SameSite=Strict"
        );
    }

    #[test]
    fn test_host_prefix_forces_attributes() {
        let cookie = SetCookie::new("csrf", "x").domain("example.com").prefix(CookiePrefix::Host);
        assert_eq!(cookie.name(), "__Host-csrf");
        assert_eq!(cookie.to_header_value(), "__Host-csrf=x; Path=/; Secure");
    }

    #[test]
    fn test_remove_cookie() {
        assert_eq!(SetCookie::remove("session").to_header_value(), "session=; Max-Age=0");
    }
}
