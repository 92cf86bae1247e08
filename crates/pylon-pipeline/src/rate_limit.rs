//! Fixed-window rate limiting.
//!
//! Requests are counted per client IP and route path. The client IP is the
//! first entry of `X-Forwarded-For`, then `X-Real-IP`, else `unknown-ip`.
//! Route paths are taken relative to the pipeline's base path, which is
//! also how per-path rules are keyed.
//!
//! A rejected request is answered with `429 Too Many Requests` and an
//! `X-Retry-After` header holding the seconds left in the window.
//!
//! ## Example
//!
//! ```
//! use bytes::Bytes;
//! use http_body_util::Full;
//! use pylon_config::RateLimitConfig;
//! use pylon_pipeline::rate_limit::RateLimiter;
//!
//! # tokio_test::block_on(async {
//! let config = RateLimitConfig { enabled: true, max: 1, ..RateLimitConfig::default() };
//! let limiter = RateLimiter::in_memory(config, "/api");
//! let request = || {
//!     http::Request::builder()
//!         .uri("/api/sign-in")
//!         .header("x-forwarded-for", "198.51.100.7")
//!         .body(Full::new(Bytes::new()))
//!         .unwrap()
//! };
//!
//! assert!(limiter.check(&request()).await.is_none());
//! let rejection = limiter.check(&request()).await.unwrap();
//! assert_eq!(rejection.status(), http::StatusCode::TOO_MANY_REQUESTS);
//! # });
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use http::{HeaderMap, HeaderValue};
use pylon_config::{RateLimitConfig, RateLimitRule};
use pylon_core::{ApiError, BoxFuture, Request, Response};
use tokio::sync::Mutex;

use crate::router::relative_path;

/// Rate limit header names.
pub mod headers {
    /// Seconds to wait before retrying (on 429).
    pub const RETRY_AFTER: &str = "x-retry-after";
}

const LIMITED_MESSAGE: &str = "Too many requests. Please try again later.";

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests seen in the current window.
    pub count: u32,
    /// Window start, in milliseconds since the Unix epoch.
    pub window_start: u64,
}

impl RateLimitEntry {
    /// Counts one request against `current` under `rule`.
    ///
    /// Returns the entry to store and the decision. A rejected request
    /// leaves the entry unchanged.
    #[must_use]
    pub fn hit(current: Option<Self>, now: u64, rule: &RateLimitRule) -> (Self, RateLimitDecision) {
        let window_ms = rule.window_secs.saturating_mul(1000);
        match current {
            Some(entry) if now.saturating_sub(entry.window_start) < window_ms => {
                if entry.count >= rule.max {
                    let retry_after = retry_after(entry, window_ms, now);
                    return (entry, RateLimitDecision::Limited { retry_after });
                }
                let next = Self {
                    count: entry.count + 1,
                    window_start: entry.window_start,
                };
                (next, RateLimitDecision::Allowed)
            }
            _ => {
                let fresh = Self {
                    count: 1,
                    window_start: now,
                };
                (fresh, RateLimitDecision::Allowed)
            }
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request is allowed.
    Allowed,
    /// Request is rejected; retry after this many seconds.
    Limited {
        /// Seconds left in the current window.
        retry_after: u64,
    },
}

/// Where counters live. Implement this to share limits across processes.
///
/// `hit` must read, count and write the entry as one atomic step, otherwise
/// concurrent requests observe the same count and all get admitted.
pub trait RateLimitStorage: Send + Sync + 'static {
    /// Reads the entry for `key`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<RateLimitEntry>>;

    /// Counts one request for `key` and decides whether it is admitted.
    /// See [`RateLimitEntry::hit`].
    fn hit<'a>(
        &'a self,
        key: &'a str,
        now: u64,
        rule: RateLimitRule,
    ) -> BoxFuture<'a, RateLimitDecision>;
}

/// In-process counter storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStorage for MemoryStorage {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<RateLimitEntry>> {
        Box::pin(async move { self.entries.lock().await.get(key).copied() })
    }

    fn hit<'a>(
        &'a self,
        key: &'a str,
        now: u64,
        rule: RateLimitRule,
    ) -> BoxFuture<'a, RateLimitDecision> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let (entry, decision) = RateLimitEntry::hit(entries.get(key).copied(), now, &rule);
            entries.insert(key.to_string(), entry);
            decision
        })
    }
}

/// Fixed-window limiter in front of the endpoint table.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    base_path: String,
    storage: Arc<dyn RateLimitStorage>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Creates a limiter over the given storage.
    pub fn new(
        config: RateLimitConfig,
        base_path: impl Into<String>,
        storage: Arc<dyn RateLimitStorage>,
    ) -> Self {
        Self {
            config,
            base_path: base_path.into(),
            storage,
        }
    }

    /// Creates a limiter with in-process storage.
    pub fn in_memory(config: RateLimitConfig, base_path: impl Into<String>) -> Self {
        Self::new(config, base_path, Arc::new(MemoryStorage::new()))
    }

    /// Whether requests are counted at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Admission check. Returns the rejection response, or `None` when the
    /// request may proceed.
    pub async fn check(&self, request: &Request) -> Option<Response> {
        if !self.config.enabled {
            return None;
        }

        match self.check_at(request, now_millis()).await {
            RateLimitDecision::Allowed => None,
            RateLimitDecision::Limited { retry_after } => {
                tracing::debug!(
                    key = %self.extract_key(request),
                    retry_after,
                    "rate limit exceeded"
                );
                Some(Self::build_rate_limit_response(retry_after))
            }
        }
    }

    pub(crate) async fn check_at(&self, request: &Request, now: u64) -> RateLimitDecision {
        let rule = self.config.rule_for(self.route_path(request));
        let key = self.extract_key(request);
        self.storage.hit(&key, now, rule).await
    }

    /// Rule applying to the request's route path.
    #[must_use]
    pub fn rule_for(&self, request: &Request) -> RateLimitRule {
        self.config.rule_for(self.route_path(request))
    }

    /// Counter key: client IP followed by the route path.
    #[must_use]
    pub fn extract_key(&self, request: &Request) -> String {
        format!("{}{}", client_ip(request.headers()), self.route_path(request))
    }

    fn route_path<'r>(&self, request: &'r Request) -> &'r str {
        relative_path(&self.base_path, request.uri().path())
    }

    /// Builds a 429 Too Many Requests response.
    fn build_rate_limit_response(retry_after: u64) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(headers::RETRY_AFTER, HeaderValue::from(retry_after));
        ApiError::too_many_requests(LIMITED_MESSAGE)
            .with_headers(headers)
            .into_response()
    }
}

fn retry_after(entry: RateLimitEntry, window_ms: u64, now: u64) -> u64 {
    let remaining_ms = entry
        .window_start
        .saturating_add(window_ms)
        .saturating_sub(now);
    remaining_ms.div_ceil(1000).max(1)
}

fn client_ip(headers: &HeaderMap) -> String {
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        // X-Forwarded-For can contain multiple IPs, take the first
        if let Some(first) = value.split(',').next().map(str::trim).filter(|ip| !ip.is_empty()) {
            return first.to_string();
        }
    }
    if let Some(value) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return value.trim().to_string();
    }
    "unknown-ip".to_string()
}

fn now_millis() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(elapsed).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Request as HttpRequest, StatusCode};
    use http_body_util::Full;
    use pylon_config::RateLimitRule;

    fn make_request(path: &str, ip: Option<&str>) -> Request {
        let mut builder = HttpRequest::builder().uri(path);
        if let Some(ip) = ip {
            builder = builder.header("x-forwarded-for", ip);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    fn limiter(max: u32) -> RateLimiter {
        RateLimiter::in_memory(
            RateLimitConfig {
                enabled: true,
                window_secs: 10,
                max,
                ..RateLimitConfig::default()
            },
            "/api",
        )
    }

    #[test]
    fn test_client_ip_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown-ip");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), "10.0.0.2");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "192.168.1.1");
    }

    #[test]
    fn test_key_uses_route_path() {
        let limiter = limiter(3);
        let request = make_request("/api/sign-in", Some("1.2.3.4"));
        assert_eq!(limiter.extract_key(&request), "1.2.3.4/sign-in");

        let request = make_request("/other/x", None);
        assert_eq!(limiter.extract_key(&request), "unknown-ip/other/x");

        let request = make_request("/apiary", None);
        assert_eq!(limiter.extract_key(&request), "unknown-ip/apiary");
    }

    #[tokio::test]
    async fn test_rate_limit_exceeded() {
        let limiter = limiter(2);
        let request = make_request("/api/ok", Some("1.1.1.1"));

        assert!(limiter.check(&request).await.is_none());
        assert!(limiter.check(&request).await.is_none());

        let rejected = limiter.check(&request).await.unwrap();
        assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry: u64 = rejected
            .headers()
            .get(headers::RETRY_AFTER)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=10).contains(&retry));
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = limiter(1);
        let request = make_request("/api/ok", Some("1.1.1.1"));

        assert_eq!(limiter.check_at(&request, 1_000).await, RateLimitDecision::Allowed);
        assert_eq!(
            limiter.check_at(&request, 4_500).await,
            RateLimitDecision::Limited { retry_after: 7 }
        );
        assert_eq!(limiter.check_at(&request, 11_000).await, RateLimitDecision::Allowed);
    }

    /// Storage that yields to the scheduler before every operation, so that
    /// concurrent checks interleave the way they would against a remote store.
    #[derive(Default)]
    struct YieldingStorage(MemoryStorage);

    impl RateLimitStorage for YieldingStorage {
        fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<RateLimitEntry>> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                self.0.get(key).await
            })
        }

        fn hit<'a>(
            &'a self,
            key: &'a str,
            now: u64,
            rule: RateLimitRule,
        ) -> BoxFuture<'a, RateLimitDecision> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                self.0.hit(key, now, rule).await
            })
        }
    }

    #[test]
    fn test_entry_hit_transitions() {
        let rule = RateLimitRule {
            window_secs: 10,
            max: 2,
        };
        let (first, decision) = RateLimitEntry::hit(None, 1_000, &rule);
        assert_eq!(decision, RateLimitDecision::Allowed);
        assert_eq!(first, RateLimitEntry { count: 1, window_start: 1_000 });

        let (second, _) = RateLimitEntry::hit(Some(first), 2_000, &rule);
        assert_eq!(second.count, 2);

        let (unchanged, decision) = RateLimitEntry::hit(Some(second), 3_000, &rule);
        assert_eq!(unchanged, second);
        assert_eq!(decision, RateLimitDecision::Limited { retry_after: 8 });

        let (fresh, decision) = RateLimitEntry::hit(Some(second), 11_000, &rule);
        assert_eq!(decision, RateLimitDecision::Allowed);
        assert_eq!(fresh, RateLimitEntry { count: 1, window_start: 11_000 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_respect_max() {
        let limiter = RateLimiter::new(
            RateLimitConfig {
                enabled: true,
                window_secs: 60,
                max: 5,
                ..RateLimitConfig::default()
            },
            "/api",
            Arc::new(YieldingStorage::default()),
        );

        let tasks: Vec<_> = (0..200)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    let request = make_request("/api/ok", Some("9.9.9.9"));
                    limiter.check_at(&request, 1_000).await
                })
            })
            .collect();

        let mut allowed = 0;
        for task in tasks {
            if task.await.unwrap() == RateLimitDecision::Allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);

        let request = make_request("/api/ok", Some("9.9.9.9"));
        let stored = limiter.storage.get(&limiter.extract_key(&request)).await.unwrap();
        assert_eq!(stored.count, 5);
    }

    #[tokio::test]
    async fn test_different_keys_independent() {
        let limiter = limiter(1);
        let a = make_request("/api/ok", Some("1.1.1.1"));
        let b = make_request("/api/ok", Some("2.2.2.2"));
        let c = make_request("/api/other", Some("1.1.1.1"));

        assert!(limiter.check(&a).await.is_none());
        assert!(limiter.check(&b).await.is_none());
        assert!(limiter.check(&c).await.is_none());
        assert!(limiter.check(&a).await.is_some());
    }

    #[tokio::test]
    async fn test_custom_rule() {
        let mut config = RateLimitConfig {
            enabled: true,
            ..RateLimitConfig::default()
        };
        config.custom_rules.insert(
            "/sign-in".to_string(),
            RateLimitRule {
                window_secs: 60,
                max: 1,
            },
        );
        let limiter = RateLimiter::in_memory(config, "/api");
        let sign_in = make_request("/api/sign-in", None);
        assert_eq!(limiter.rule_for(&sign_in).window_secs, 60);

        assert!(limiter.check(&sign_in).await.is_none());
        assert!(limiter.check(&sign_in).await.is_some());

        let ok = make_request("/api/ok", None);
        assert!(limiter.check(&ok).await.is_none());
        assert!(limiter.check(&ok).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_never_limits() {
        let limiter = RateLimiter::in_memory(
            RateLimitConfig {
                max: 1,
                ..RateLimitConfig::default()
            },
            "/api",
        );
        assert!(!limiter.is_enabled());
        let request = make_request("/api/ok", None);
        for _ in 0..5 {
            assert!(limiter.check(&request).await.is_none());
        }
    }
}
