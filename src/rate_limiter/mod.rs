use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tracing::warn;

use crate::{auth::AuthService, cache::InMemoryCache, errors::ServiceError, AppState};

const NAMESPACE: &str = "rl";

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
    pub enable_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
        }
    }
}

#[derive(Debug)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: Duration,
}

/// Fixed-window limiter whose counters live in the shared TTL cache.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    cache: InMemoryCache,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(cache: InMemoryCache, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        let state = self.cache.increment(
            &format!("{}:{}", NAMESPACE, key),
            self.config.window_duration,
        );
        let limit = self.config.requests_per_window;
        let allowed = state.count <= u64::from(limit);
        let remaining = if allowed {
            limit.saturating_sub(u32::try_from(state.count).unwrap_or(u32::MAX))
        } else {
            0
        };

        RateLimitResult {
            allowed,
            limit,
            remaining,
            reset_time: state.resets_in,
        }
    }
}

pub fn extract_ip_key(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(ip) = forwarded_str.split(',').next().map(str::trim) {
                if !ip.is_empty() {
                    return Some(format!("ip:{}", ip));
                }
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| format!("ip:{}", ip.trim()))
}

/// Prefers the authenticated user, then the client address, then a shared bucket.
pub fn client_key(headers: &HeaderMap, auth: &AuthService) -> String {
    if let Ok(Some(user)) = auth.user_from_headers(headers) {
        return format!("user:{}", user.user_id);
    }
    extract_ip_key(headers).unwrap_or_else(|| "anonymous".to_string())
}

fn num_to_header_value<T: ToString>(value: T) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

fn apply_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert("x-ratelimit-limit", num_to_header_value(result.limit));
    headers.insert("x-ratelimit-remaining", num_to_header_value(result.remaining));
    headers.insert(
        "x-ratelimit-reset",
        num_to_header_value(result.reset_time.as_secs()),
    );
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(request.headers(), &state.auth);
    let result = state.rate_limiter.check_rate_limit(&key);
    let enable_headers = state.rate_limiter.config().enable_headers;

    if !result.allowed {
        warn!(key = %key, "rate limit exceeded");
        metrics::counter!("storefront_rate_limited_total", 1);

        let mut response = ServiceError::RateLimitExceeded {
            retry_after_secs: result.reset_time.as_secs().max(1),
        }
        .into_response();
        if enable_headers {
            apply_headers(response.headers_mut(), &result);
        }
        return response;
    }

    let mut response = next.run(request).await;
    if enable_headers {
        apply_headers(response.headers_mut(), &result);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32) -> RateLimiter {
        RateLimiter::new(
            InMemoryCache::new(),
            RateLimitConfig {
                requests_per_window: limit,
                window_duration: Duration::from_secs(60),
                enable_headers: true,
            },
        )
    }

    #[test]
    fn allows_up_to_limit_then_blocks() {
        let limiter = limiter(2);
        let first = limiter.check_rate_limit("user:a");
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert!(limiter.check_rate_limit("user:a").allowed);

        let third = limiter.check_rate_limit("user:a");
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);

        assert!(limiter.check_rate_limit("user:b").allowed);
    }

    #[test]
    fn forwarded_for_uses_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(extract_ip_key(&headers).as_deref(), Some("ip:203.0.113.9"));
    }

    #[test]
    fn anonymous_bucket_without_identity() {
        let auth = AuthService::new(
            "unit-test-secret-that-is-long-enough-123",
            "storefront-auth",
            "storefront-api",
        );
        assert_eq!(client_key(&HeaderMap::new(), &auth), "anonymous");
    }
}
