//! Per-client request budgets
//!
//! Clients are identified by the TCP peer address. `X-Forwarded-For` is only
//! believed when the peer is one of the configured trusted proxies, and then
//! the right-most hop that is not itself a trusted proxy is used. A caller
//! cannot pick its own budget by rotating forwarding headers.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::ApiError;

/// Identity a request is charged against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKey {
    Addr(IpAddr),
    /// No peer address was recorded for the connection
    Unknown,
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKey::Addr(ip) => write!(f, "{}", ip),
            ClientKey::Unknown => f.write_str("unknown"),
        }
    }
}

/// Remaining request allowance for one client, refilled continuously
#[derive(Debug)]
struct Allowance {
    available: f64,
    refreshed: Instant,
}

impl Allowance {
    fn spend(&mut self, now: Instant, refill_per_sec: f64, burst: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.refreshed).as_secs_f64();
        self.available = (self.available + elapsed * refill_per_sec).min(burst);
        self.refreshed = now;

        if self.available < 1.0 {
            return false;
        }
        self.available -= 1.0;
        true
    }
}

struct Budgets {
    allowances: Mutex<HashMap<ClientKey, Allowance>>,
    refill_per_sec: f64,
    burst: f64,
    trusted_proxies: Vec<IpAddr>,
}

/// Shared limiter handle; clones charge the same budgets
#[derive(Clone)]
pub struct RateLimiter {
    budgets: Arc<Budgets>,
}

impl RateLimiter {
    /// Allow `requests_per_second` steady, with bursts of twice that
    pub fn new(requests_per_second: u32, trusted_proxies: Vec<IpAddr>) -> Self {
        let refill_per_sec = f64::from(requests_per_second.max(1));
        Self {
            budgets: Arc::new(Budgets {
                allowances: Mutex::new(HashMap::new()),
                refill_per_sec,
                burst: refill_per_sec * 2.0,
                trusted_proxies,
            }),
        }
    }

    /// Charge one request to `client`. Returns false once its budget is spent.
    pub async fn admit(&self, client: ClientKey) -> bool {
        let budgets = &self.budgets;
        let now = Instant::now();
        let mut allowances = budgets.allowances.lock().await;

        allowances
            .entry(client)
            .or_insert_with(|| Allowance {
                available: budgets.burst,
                refreshed: now,
            })
            .spend(now, budgets.refill_per_sec, budgets.burst)
    }

    /// Resolve who a request is charged against
    pub fn client_key(&self, peer: Option<IpAddr>, headers: &HeaderMap) -> ClientKey {
        let Some(peer) = peer else {
            return ClientKey::Unknown;
        };
        if !self.is_trusted(peer) {
            return ClientKey::Addr(peer);
        }

        let forwarded = headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .collect::<Vec<_>>();

        // Right to left: the first hop our own proxies did not add
        for hop in forwarded.into_iter().rev() {
            match hop.parse::<IpAddr>() {
                Ok(ip) if self.is_trusted(ip) => continue,
                Ok(ip) => return ClientKey::Addr(ip),
                Err(_) => break,
            }
        }
        ClientKey::Addr(peer)
    }

    /// Forget clients that have been quiet for at least `idle_for`
    pub async fn prune_idle(&self, idle_for: Duration) {
        let now = Instant::now();
        self.budgets
            .allowances
            .lock()
            .await
            .retain(|_, allowance| now.saturating_duration_since(allowance.refreshed) < idle_for);
    }

    pub async fn tracked_clients(&self) -> usize {
        self.budgets.allowances.lock().await.len()
    }

    fn is_trusted(&self, ip: IpAddr) -> bool {
        self.budgets.trusted_proxies.contains(&ip)
    }
}

/// Reject requests over budget with 429 and `Retry-After: 1`.
///
/// Install with `axum::middleware::from_fn_with_state`, serving the app with
/// connect info so the peer address is available.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let client = limiter.client_key(peer_ip(&request), request.headers());

    if !limiter.admit(client).await {
        tracing::warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
        let mut response = ApiError::TooManyRequests.into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        return response;
    }

    next.run(request).await
}

/// TCP peer address recorded by the server, if any
pub(crate) fn peer_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", value.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_burst_then_reject() {
        let limiter = RateLimiter::new(5, Vec::new());
        let client = ClientKey::Addr(ip("203.0.113.7"));

        for _ in 0..10 {
            assert!(limiter.admit(client).await);
        }
        assert!(!limiter.admit(client).await);
        assert!(limiter.admit(ClientKey::Addr(ip("203.0.113.8"))).await);
    }

    #[test]
    fn test_untrusted_peer_ignores_forwarded_header() {
        let limiter = RateLimiter::new(1, vec![ip("10.0.0.1")]);
        let peer = Some(ip("198.51.100.4"));

        for spoofed in ["1.1.1.1", "2.2.2.2", "3.3.3.3, 4.4.4.4"] {
            assert_eq!(
                limiter.client_key(peer, &forwarded(spoofed)),
                ClientKey::Addr(ip("198.51.100.4"))
            );
        }
    }

    #[test]
    fn test_trusted_proxy_uses_rightmost_untrusted_hop() {
        let limiter = RateLimiter::new(1, vec![ip("10.0.0.1"), ip("10.0.0.2")]);
        let peer = Some(ip("10.0.0.1"));

        assert_eq!(
            limiter.client_key(peer, &forwarded("9.9.9.9, 198.51.100.4, 10.0.0.2")),
            ClientKey::Addr(ip("198.51.100.4"))
        );
        assert_eq!(
            limiter.client_key(peer, &HeaderMap::new()),
            ClientKey::Addr(ip("10.0.0.1"))
        );
        assert_eq!(limiter.client_key(None, &forwarded("9.9.9.9")), ClientKey::Unknown);
    }

    #[tokio::test]
    async fn test_rotating_forwarded_header_does_not_reset_budget() {
        let limiter = RateLimiter::new(1, Vec::new());
        let app = Router::new()
            .route("/auth/connect", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter.clone(), rate_limit));

        let mut statuses = Vec::new();
        for i in 0..4 {
            let request = axum::http::Request::builder()
                .uri("/auth/connect")
                .header("x-forwarded-for", format!("192.0.2.{}", i))
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            statuses.push(response.status());
        }

        assert_eq!(
            statuses,
            vec![
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::TOO_MANY_REQUESTS
            ]
        );
        assert_eq!(limiter.tracked_clients().await, 1);
    }

    #[tokio::test]
    async fn test_prune_idle_forgets_clients() {
        let limiter = RateLimiter::new(1, Vec::new());
        limiter.admit(ClientKey::Unknown).await;

        limiter.prune_idle(Duration::ZERO).await;
        assert_eq!(limiter.tracked_clients().await, 0);
    }
}
