//! Rate Limiting Module
//!
//! Per-client-IP limits using the governor library. Login and password-reset
//! submissions get their own strict quotas on top of the general API quota.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::config::RateLimitSettings;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

struct Entry {
    limiter: Limiter,
    /// Milliseconds since the owning map was created.
    last_seen: AtomicU64,
}

/// Per-key rate limiter for IP-based limiting
pub struct KeyedRateLimiter {
    limiters: RwLock<HashMap<String, Arc<Entry>>>,
    quota: Quota,
    cleanup_threshold: usize,
    epoch: Instant,
}

impl KeyedRateLimiter {
    pub fn new(quota: Quota) -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            quota,
            cleanup_threshold: 10000,
            epoch: Instant::now(),
        }
    }

    pub fn per_second(requests_per_second: u32, burst_size: u32) -> Self {
        Self::new(
            Quota::per_second(non_zero(requests_per_second)).allow_burst(non_zero(burst_size)),
        )
    }

    pub fn per_minute(requests: u32) -> Self {
        Self::new(Quota::per_minute(non_zero(requests)))
    }

    pub fn per_hour(requests: u32) -> Self {
        Self::new(Quota::per_hour(non_zero(requests)))
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Time after which an idle limiter has fully replenished and is
    /// indistinguishable from a fresh one.
    fn idle_window(&self) -> Duration {
        self.quota.replenish_interval() * self.quota.burst_size().get()
    }

    /// Drops limiters idle for longer than the replenish window.
    fn evict_idle(&self, limiters: &mut HashMap<String, Arc<Entry>>, now: u64) {
        let window = self.idle_window().as_millis() as u64;
        limiters.retain(|_, entry| now.saturating_sub(entry.last_seen.load(Ordering::Relaxed)) <= window);
    }

    /// Returns true when the request is allowed.
    pub async fn check(&self, key: &str) -> bool {
        let now = self.now_millis();
        let entry = {
            let limiters = self.limiters.read().await;
            limiters.get(key).cloned()
        };

        let entry = match entry {
            Some(e) => e,
            None => {
                let mut limiters = self.limiters.write().await;

                if limiters.len() > self.cleanup_threshold {
                    self.evict_idle(&mut limiters, now);
                }

                Arc::clone(limiters.entry(key.to_string()).or_insert_with(|| {
                    Arc::new(Entry {
                        limiter: RateLimiter::direct(self.quota),
                        last_seen: AtomicU64::new(now),
                    })
                }))
            }
        };

        entry.last_seen.store(now, Ordering::Relaxed);
        entry.limiter.check().is_ok()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.limiters.read().await.len()
    }
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

impl std::fmt::Debug for KeyedRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedRateLimiter")
            .field("quota", &self.quota)
            .field("cleanup_threshold", &self.cleanup_threshold)
            .finish()
    }
}

/// Rate limit state shared across requests
#[derive(Debug)]
pub struct RateLimitState {
    pub enabled: bool,
    pub trusted_proxies: Vec<IpAddr>,
    pub api_limiter: KeyedRateLimiter,
    pub login_limiter: KeyedRateLimiter,
    pub reset_limiter: KeyedRateLimiter,
}

impl RateLimitState {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            enabled: settings.enabled,
            trusted_proxies: settings.trusted_proxies.clone(),
            api_limiter: KeyedRateLimiter::per_second(settings.api_per_second, settings.api_burst),
            login_limiter: KeyedRateLimiter::per_minute(settings.login_per_minute),
            reset_limiter: KeyedRateLimiter::per_hour(settings.password_reset_per_hour),
        }
    }
}

/// Extract client IP from request.
///
/// `X-Forwarded-For` and `X-Real-IP` are only read when the connecting peer
/// is one of `trusted_proxies`. The client is the right-most forwarded
/// address that is not itself a trusted proxy.
pub fn get_client_ip(req: &Request, trusted_proxies: &[IpAddr]) -> String {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    let Some(peer) = peer else {
        return "unknown".to_string();
    };
    if !trusted_proxies.contains(&peer) {
        return peer.to_string();
    }

    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|value| {
            value
                .rsplit(',')
                .filter_map(|ip| ip.trim().parse::<IpAddr>().ok())
                .find(|ip| !trusted_proxies.contains(ip))
        });
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    req.headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .unwrap_or(peer)
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LimiterType {
    Api,
    Login,
    PasswordReset,
}

fn get_limiter_type(method: &Method, path: &str) -> Option<LimiterType> {
    if method == Method::POST && matches!(path, "/login" | "/api/login") {
        Some(LimiterType::Login)
    } else if method == Method::POST && path == "/forgot-password" {
        Some(LimiterType::PasswordReset)
    } else if path.starts_with("/api/") && path != "/api/health" {
        Some(LimiterType::Api)
    } else {
        None
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimitState>>,
    req: Request,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(req).await;
    }

    let Some(limiter_type) = get_limiter_type(req.method(), req.uri().path()) else {
        return next.run(req).await;
    };
    let client_ip = get_client_ip(&req, &state.trusted_proxies);

    let allowed = match limiter_type {
        LimiterType::Api => state.api_limiter.check(&client_ip).await,
        LimiterType::Login => state.login_limiter.check(&client_ip).await,
        LimiterType::PasswordReset => state.reset_limiter.check(&client_ip).await,
    };

    if allowed {
        next.run(req).await
    } else {
        tracing::warn!(ip = %client_ip, kind = ?limiter_type, "Rate limit exceeded");
        rate_limit_response(limiter_type)
    }
}

fn rate_limit_response(limiter_type: LimiterType) -> Response {
    let (retry_after, message) = match limiter_type {
        LimiterType::Api => (1, "API rate limit exceeded"),
        LimiterType::Login => (60, "Too many login attempts. Please wait a minute and try again."),
        LimiterType::PasswordReset => (
            3600,
            "Too many password reset requests. Please try again later.",
        ),
    };

    let body = serde_json::json!({
        "success": false,
        "message": message,
        "retry_after": retry_after
    });

    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("Retry-After", retry_after.to_string()),
            ("Content-Type", "application/json".to_string()),
        ],
        body.to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn test_per_minute_limiter_blocks_after_quota() {
        let limiter = KeyedRateLimiter::per_minute(3);
        for _ in 0..3 {
            assert!(limiter.check("10.0.0.1").await);
        }
        assert!(!limiter.check("10.0.0.1").await);
        assert!(limiter.check("10.0.0.2").await);
    }

    #[test]
    fn test_limiter_type_by_route() {
        assert_eq!(get_limiter_type(&Method::POST, "/login"), Some(LimiterType::Login));
        assert_eq!(get_limiter_type(&Method::GET, "/login"), None);
        assert_eq!(
            get_limiter_type(&Method::POST, "/forgot-password"),
            Some(LimiterType::PasswordReset)
        );
        assert_eq!(get_limiter_type(&Method::GET, "/api/search"), Some(LimiterType::Api));
        assert_eq!(get_limiter_type(&Method::GET, "/api/health"), None);
        assert_eq!(get_limiter_type(&Method::GET, "/dashboard"), None);
    }

    fn request_from(peer: &str, forwarded: Option<&str>) -> Request {
        let mut builder = Request::builder();
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        let mut req = builder.body(Body::empty()).expect("request");
        let addr: SocketAddr = format!("{peer}:40000").parse().expect("addr");
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[test]
    fn test_forwarded_header_ignored_from_untrusted_peer() {
        let req = request_from("198.51.100.9", Some("203.0.113.7"));
        assert_eq!(get_client_ip(&req, &[]), "198.51.100.9");

        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .expect("request");
        assert_eq!(get_client_ip(&req, &[]), "unknown");
    }

    #[test]
    fn test_forwarded_header_used_behind_trusted_proxy() {
        let proxy: IpAddr = "10.0.0.1".parse().expect("ip");
        let req = request_from("10.0.0.1", Some("1.2.3.4, 203.0.113.7, 10.0.0.1"));
        assert_eq!(get_client_ip(&req, &[proxy]), "203.0.113.7");

        let req = request_from("10.0.0.1", None);
        assert_eq!(get_client_ip(&req, &[proxy]), "10.0.0.1");
    }

    #[tokio::test]
    async fn test_cleanup_keeps_limiters_still_refilling() {
        let mut limiter = KeyedRateLimiter::per_minute(1);
        limiter.cleanup_threshold = 1;
        assert!(limiter.check("10.0.0.1").await);
        assert!(limiter.check("10.0.0.2").await);
        assert!(limiter.check("10.0.0.3").await);

        assert_eq!(limiter.tracked_keys().await, 3);
        assert!(!limiter.check("10.0.0.1").await);
    }
}
