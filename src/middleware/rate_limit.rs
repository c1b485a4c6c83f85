//! Per-route, per-IP rate limiting.
//!
//! # Algorithm
//!
//! Uses the Governor crate's Generic Cell Rate Algorithm (GCRA). A quota of
//! `n` per minute allows a burst of `n` requests, then refills one slot every
//! `60 / n` seconds.
//!
//! Each route gets its own [`RateLimitLayer`] (applied with
//! `Router::route_layer`), so token issuance and analysis are budgeted
//! independently.
//!
//! # Response Headers
//!
//! On rate limit exceeded (429):
//! - `Retry-After`: Seconds until the next request will be accepted
//! - `X-RateLimit-Limit`: Configured requests per minute

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tower::{Layer, Service};
use tracing::warn;

use super::ip::extract_client_ip;
use crate::metrics;

/// Error type for rate limit layer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// Limit cannot be zero.
    ZeroLimit,
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::ZeroLimit => {
                write!(f, "rate limit must be greater than 0; skip the layer to disable limiting")
            }
        }
    }
}

impl std::error::Error for RateLimitError {}

/// Per-IP limiter keyed by the caller IP string.
type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting layer for one route.
///
/// # Example
///
/// ```rust,ignore
/// let layer = RateLimitLayer::per_minute("auth", 10)?;
/// let app = Router::new()
///     .route("/api/v1/auth", post(handler).route_layer(layer));
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<KeyedLimiter>,
    route: &'static str,
    /// Requests per minute (for headers)
    limit: u32,
}

impl RateLimitLayer {
    /// Create a limiter allowing `per_minute` requests per IP per minute.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::ZeroLimit` if `per_minute` is 0.
    pub fn per_minute(route: &'static str, per_minute: u32) -> Result<Self, RateLimitError> {
        let limit = NonZeroU32::new(per_minute).ok_or(RateLimitError::ZeroLimit)?;

        Ok(Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(limit))),
            route,
            limit: per_minute,
        })
    }

    /// Build a layer when `per_minute > 0`, `None` when limiting is disabled.
    pub fn optional(route: &'static str, per_minute: u32) -> Option<Self> {
        Self::per_minute(route, per_minute).ok()
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            route: self.route,
            limit: self.limit,
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<KeyedLimiter>,
    route: &'static str,
    limit: u32,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let route = self.route;
        let limit = self.limit;
        let mut inner = self.inner.clone();

        let client_ip = extract_client_ip(&req).into_owned();

        Box::pin(async move {
            match limiter.check_key(&client_ip) {
                Ok(_) => inner.call(req).await,
                Err(not_until) => {
                    let wait_time = not_until.wait_time_from(DefaultClock::default().now());
                    let retry_after = wait_time.as_secs().max(1);

                    warn!(
                        client_ip = %client_ip,
                        route,
                        retry_after_secs = retry_after,
                        "Rate limit exceeded for IP"
                    );
                    metrics::record_rate_limited(route);

                    Ok(rate_limited_response(limit, retry_after))
                }
            }
        })
    }
}

fn rate_limited_response(limit: u32, retry_after: u64) -> Response<Body> {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("Retry-After", retry_after.to_string()),
            ("X-RateLimit-Limit", limit.to_string()),
        ],
        axum::Json(serde_json::json!({
            "detail": format!("Rate limit exceeded: {limit} per 1 minute"),
        })),
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::ServiceExt;

    fn request_from(ip: &str) -> Request<Body> {
        Request::builder()
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    fn ok_service()
    -> impl Service<Request<Body>, Response = Response<Body>, Error = Infallible, Future: Send> + Clone
    {
        tower::service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(Response::new(Body::empty()))
        })
    }

    #[test]
    fn test_rate_limit_layer_creation() {
        let layer = RateLimitLayer::per_minute("auth", 10).unwrap();
        assert_eq!(layer.limit, 10);
        assert_eq!(layer.route, "auth");
    }

    #[test]
    fn test_zero_limit_returns_error() {
        assert!(matches!(
            RateLimitLayer::per_minute("auth", 0),
            Err(RateLimitError::ZeroLimit)
        ));
        assert!(RateLimitLayer::optional("auth", 0).is_none());
    }

    #[tokio::test]
    async fn test_burst_then_429_with_retry_after() {
        let layer = RateLimitLayer::per_minute("auth", 2).unwrap();
        let service = layer.layer(ok_service());

        for _ in 0..2 {
            let response = service.clone().oneshot(request_from("198.51.100.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = service.clone().oneshot(request_from("198.51.100.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "2");
    }

    #[tokio::test]
    async fn test_limits_are_per_ip() {
        let layer = RateLimitLayer::per_minute("analyze", 1).unwrap();
        let service = layer.layer(ok_service());

        let first = service.clone().oneshot(request_from("198.51.100.1")).await.unwrap();
        let other_ip = service.clone().oneshot(request_from("198.51.100.2")).await.unwrap();
        let repeat = service.clone().oneshot(request_from("198.51.100.1")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(other_ip.status(), StatusCode::OK);
        assert_eq!(repeat.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
