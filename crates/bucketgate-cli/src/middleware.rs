//! HTTP middleware for request ids, logging, rate limiting and cancellation

use crate::{ApiError, AppState, ErrorCode};
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use governor::{Quota, RateLimiter, state::keyed::DefaultKeyedStateStore};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Header carrying the request id on every response
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Rate limiter type
pub type KeyedRateLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, governor::clock::DefaultClock>;

/// How often idle client keys are dropped from the limiter
const RATE_LIMIT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Limiter plus how clients are identified
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<KeyedRateLimiter>,
    /// Key on the first `x-forwarded-for` hop instead of the peer address
    trust_proxy: bool,
}

impl RateLimit {
    pub fn new(limiter: Arc<KeyedRateLimiter>, trust_proxy: bool) -> Self {
        Self { limiter, trust_proxy }
    }

    pub fn limiter(&self) -> &Arc<KeyedRateLimiter> {
        &self.limiter
    }
}

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Id of the request being handled, or a fresh one outside a request
pub fn current_request_id() -> String {
    REQUEST_ID
        .try_with(|id| id.clone())
        .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string())
}

/// Create a rate limiter; `None` when the limit is 0
pub fn create_rate_limiter(requests_per_second: u32) -> Option<Arc<KeyedRateLimiter>> {
    let rps = NonZeroU32::new(requests_per_second)?;
    Some(Arc::new(RateLimiter::keyed(Quota::per_second(rps))))
}

/// Periodically forget clients whose budget has fully refilled.
///
/// The task ends once the limiter is dropped. Does nothing outside a runtime.
pub fn spawn_rate_limit_sweeper(limiter: &Arc<KeyedRateLimiter>) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };
    let limiter = Arc::downgrade(limiter);
    handle.spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_SWEEP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(limiter) = limiter.upgrade() else {
                break;
            };
            limiter.retain_recent();
            tracing::debug!(clients = limiter.len(), "Rate limiter swept");
        }
    });
}

/// Request ID middleware - adds the `x-request-id` header
pub async fn request_id_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    let mut response = REQUEST_ID.scope(request_id.clone(), next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        request_id = %current_request_id(),
        "Request completed"
    );

    response
}

/// Rate limiting middleware, keyed by client address
pub async fn rate_limit_middleware(
    State(rate_limit): State<Option<RateLimit>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(rate_limit) = rate_limit else {
        return Ok(next.run(request).await);
    };

    let key = client_key(&request, rate_limit.trust_proxy);
    if rate_limit.limiter.check_key(&key).is_err() {
        return Err(ApiError::new(ErrorCode::SlowDown, "Please reduce your request rate"));
    }

    Ok(next.run(request).await)
}

/// Cancellation middleware.
///
/// Inserts a token that fires when the request deadline passes or when the
/// request future is dropped (client disconnect).
pub async fn cancellation_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = CancellationToken::new();
    let _guard = token.clone().drop_guard();

    let deadline = token.clone();
    let timeout = state.config.request_timeout();
    tokio::spawn(async move {
        tokio::select! {
            _ = deadline.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                tracing::debug!(timeout_secs = timeout.as_secs(), "Request deadline reached");
                deadline.cancel();
            }
        }
    });

    request.extensions_mut().insert(token);
    next.run(request).await
}

/// Peer address, or the first `x-forwarded-for` hop behind a trusted proxy
fn client_key(request: &Request<Body>, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(forwarded) = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_string();
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rate_limiter() {
        let limiter = create_rate_limiter(2).unwrap();

        assert!(limiter.check_key(&"client".to_string()).is_ok());
        assert!(limiter.check_key(&"client".to_string()).is_ok());
        assert!(limiter.check_key(&"client".to_string()).is_err());
        // Other clients have their own budget
        assert!(limiter.check_key(&"other".to_string()).is_ok());
    }

    #[test]
    fn test_rate_limit_disabled() {
        assert!(create_rate_limiter(0).is_none());
    }

    fn forwarded_request(forwarded: &str) -> Request<Body> {
        let mut request = Request::builder()
            .header("x-forwarded-for", forwarded)
            .body(Body::empty())
            .unwrap();
        let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    }

    #[test]
    fn test_client_key_ignores_forwarded_header_by_default() {
        let request = forwarded_request("203.0.113.7, 10.0.0.1");
        assert_eq!(client_key(&request, false), "192.0.2.10");

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&request, false), "anonymous");
    }

    #[test]
    fn test_client_key_behind_trusted_proxy() {
        let request = forwarded_request("203.0.113.7, 10.0.0.1");
        assert_eq!(client_key(&request, true), "203.0.113.7");

        let request = forwarded_request(", 10.0.0.1");
        assert_eq!(client_key(&request, true), "192.0.2.10");
    }

    #[test]
    fn test_rotating_forwarded_header_shares_one_budget() {
        let limiter = create_rate_limiter(1).unwrap();
        let first = client_key(&forwarded_request("198.51.100.1"), false);
        let second = client_key(&forwarded_request("198.51.100.2"), false);

        assert!(limiter.check_key(&first).is_ok());
        assert!(limiter.check_key(&second).is_err());
    }

    #[tokio::test]
    async fn test_sweeper_holds_no_strong_reference() {
        let limiter = create_rate_limiter(5).unwrap();
        spawn_rate_limit_sweeper(&limiter);
        assert!(limiter.check_key(&"client".to_string()).is_ok());
        assert_eq!(Arc::strong_count(&limiter), 1);
    }

    #[tokio::test]
    async fn test_request_id_scope() {
        let id = REQUEST_ID
            .scope("req-1".to_string(), async { current_request_id() })
            .await;
        assert_eq!(id, "req-1");
        assert_ne!(current_request_id(), "req-1");
    }
}
