//! Per-client request throttling.
//!
//! Each (client IP, tier) pair holds a bucket that refills continuously over
//! the configured window and is topped up completely once a full window has
//! passed. Credential endpoints get a much smaller bucket than the rest of
//! the API.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Authenticated API routes
    Api,
    /// Signup, login and password reset
    Auth,
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: u32,
    window_start: Instant,
    last_request: Instant,
}

impl Bucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity,
            window_start: now,
            last_request: now,
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<(IpAddr, RateLimitTier), Bucket>,
    config: RateLimitConfig,
    window: Duration,
}

/// Limit state reported back to the client in response headers
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub remaining: u32,
    pub limit: u32,
    /// Seconds until the window resets
    pub reset_after: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            window: Duration::from_secs(config.window_seconds.max(1)),
            config,
        }
    }

    fn capacity(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Auth => self.config.auth_requests_per_window,
        }
    }

    /// Take one token for `ip` in `tier`.
    ///
    /// Returns the remaining budget, or the number of seconds to wait.
    pub fn check(&self, ip: IpAddr, tier: RateLimitTier) -> Result<RateLimitInfo, u64> {
        if !self.config.enabled {
            return Ok(RateLimitInfo {
                remaining: u32::MAX,
                limit: u32::MAX,
                reset_after: 0,
            });
        }

        let capacity = self.capacity(tier);
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry((ip, tier))
            .or_insert_with(|| Bucket::full(capacity, now));

        let elapsed = now.duration_since(bucket.window_start);
        if elapsed >= self.window {
            *bucket = Bucket::full(capacity, now);
        } else {
            let idle = now.duration_since(bucket.last_request).as_secs_f64();
            let per_second = capacity as f64 / self.window.as_secs_f64();
            let refill = (idle * per_second) as u32;
            bucket.tokens = bucket.tokens.saturating_add(refill).min(capacity);
        }
        bucket.last_request = now;

        let reset_after = self
            .window
            .saturating_sub(now.duration_since(bucket.window_start))
            .as_secs();

        if bucket.tokens == 0 {
            return Err(reset_after.max(1));
        }

        bucket.tokens -= 1;
        Ok(RateLimitInfo {
            remaining: bucket.tokens,
            limit: capacity,
            reset_after,
        })
    }

    /// Drop buckets idle for more than two windows
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let keep_for = self.window * 2;
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.window_start) < keep_for);
    }

    pub fn entry_count(&self) -> usize {
        self.buckets.len()
    }

    /// Client address a request is counted against.
    ///
    /// Forwarding headers are honoured only when `trust_proxy_headers` is
    /// set; otherwise any client could pick its own bucket.
    pub fn client_ip(&self, request: &Request<Body>) -> IpAddr {
        let forwarded = if self.config.trust_proxy_headers {
            forwarded_ip(request.headers())
        } else {
            None
        };

        forwarded
            .or_else(|| {
                request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .or_else(|| header("x-real-ip").and_then(|ip| ip.trim().parse().ok()))
}

pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    throttle(state, request, next, RateLimitTier::Api).await
}

pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    throttle(state, request, next, RateLimitTier::Auth).await
}

async fn throttle(
    state: Arc<AppState>,
    request: Request<Body>,
    next: Next,
    tier: RateLimitTier,
) -> Response {
    let ip = state.rate_limiter.client_ip(&request);

    match state.rate_limiter.check(ip, tier) {
        Ok(info) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(info.limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(info.remaining));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(info.reset_after));
            response
        }
        Err(retry_after) => {
            tracing::warn!(%ip, ?tier, "Rate limit exceeded");
            let mut response = ApiError::rate_limited(format!(
                "Rate limit exceeded. Try again in {} seconds.",
                retry_after
            ))
            .into_response();
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(retry_after));
            response
        }
    }
}

/// Periodically sweep stale buckets
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(cleanup_interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            rate_limiter.cleanup_expired();
            tracing::debug!(
                "Rate limiter cleanup complete, {} entries remaining",
                rate_limiter.entry_count()
            );
        }
    });
}
