//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │ Security Headers │ ← request log, hardening headers, duration metric
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← allowed extension origin only
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response spans
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if exceeded (per route)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Extension Auth  │ ← 401 / 403 (per route)
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Routes
//!
//! - `GET /health` - component report (no authentication)
//! - `POST /api/v1/auth` - extension headers and origin, then a bearer token
//! - `POST /api/v1/analyze` - extension headers, bearer token and, unless
//!   disabled, a signed request with a fresh nonce

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{MethodRouter, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{ANY_ORIGIN, header_names};
use crate::handlers;
use crate::middleware::{ExtensionAuthLayer, Protection, RateLimitLayer, SecurityHeadersLayer};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// # Middleware Configuration
///
/// - **Rate Limiting**: per route, enabled when `AUTH_RATE_LIMIT` /
///   `ANALYZE_RATE_LIMIT` are greater than 0
/// - **Signed Requests**: enforced on analysis unless
///   `REQUIRE_SIGNED_REQUESTS=false`
/// - **CORS**: restricted to `ALLOWED_ORIGIN`
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;
    let guards = state.auth_guards();

    let auth_route = guarded(
        post(handlers::issue_token),
        ExtensionAuthLayer::new(guards.clone(), Protection::ExtensionHeaders),
        RateLimitLayer::optional("auth", config.auth_rate_limit),
    );
    let analyze_route = guarded(
        post(handlers::analyze),
        ExtensionAuthLayer::new(guards, Protection::SignedSession),
        RateLimitLayer::optional("analyze", config.analyze_rate_limit),
    );

    info!(
        auth_per_minute = config.auth_rate_limit,
        analyze_per_minute = config.analyze_rate_limit,
        signed_requests = config.require_signed_requests,
        "Routes configured"
    );
    if !config.require_signed_requests {
        warn!("Signed requests disabled: analysis accepts bearer tokens without replay checks");
    }

    let cors = build_cors_layer(&config.allowed_origin);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/auth", auth_route)
        .route("/api/v1/analyze", analyze_route)
        // Applied bottom to top: the last layer sees the request first
        .layer(DefaultBodyLimit::max(config.max_request_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SecurityHeadersLayer::new())
        .with_state(state)
}

/// Wrap a route in authentication, then rate limiting outside it, so a
/// throttled caller is rejected before any verification work.
fn guarded(
    route: MethodRouter<AppState>,
    auth: ExtensionAuthLayer,
    rate_limit: Option<RateLimitLayer>,
) -> MethodRouter<AppState> {
    let route = route.route_layer(auth);
    match rate_limit {
        Some(limit) => route.route_layer(limit),
        None => route,
    }
}

/// Build the CORS layer for the extension origin.
///
/// Credentials are never allowed; with `*` the origin is reflected as any.
fn build_cors_layer(allowed_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(header_names::EXTENSION_CLIENT),
            HeaderName::from_static(header_names::EXTENSION_ID),
            HeaderName::from_static(header_names::REQUEST_TIMESTAMP),
            HeaderName::from_static(header_names::REQUEST_SIGNATURE),
            HeaderName::from_static(header_names::REQUEST_NONCE),
        ]);

    if allowed_origin == ANY_ORIGIN {
        return cors.allow_origin(Any);
    }

    match HeaderValue::from_str(allowed_origin) {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            warn!(allowed_origin, "ALLOWED_ORIGIN is not a valid header value; CORS disabled");
            cors
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::auth::nonce::UnreachableNonceLedger;
    use crate::auth::{InMemoryNonceLedger, ManualClock, NonceLedger, Secret};
    use crate::config::Config;

    const ORIGIN: &str = "chrome-extension://abcdefghijklmnop";
    const NOW: i64 = 1_700_000_000;

    fn test_state(ledger: Arc<dyn NonceLedger>) -> AppState {
        let clock = Arc::new(ManualClock::new(NOW));
        let config = Config {
            jwt_secret: Secret::from("routes-test-secret"),
            allowed_origin: ORIGIN.to_string(),
            ..Config::default()
        };
        AppState::with_parts(config, clock, ledger).unwrap()
    }

    fn router() -> Router {
        let clock = Arc::new(ManualClock::new(NOW));
        build_router(test_state(Arc::new(InMemoryNonceLedger::new(clock))))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_preflight_allows_extension_origin() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/v1/auth")
                    .header(header::ORIGIN, ORIGIN)
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            ORIGIN
        );
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn test_auth_route_requires_extension_headers() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/auth")
                    .header(header::USER_AGENT, "Mozilla/5.0 Chrome/120.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_health_degraded_when_nonce_store_down() {
        let app = build_router(test_state(Arc::new(UnreachableNonceLedger)));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["nonce_store"], "redis");
        assert_eq!(body["nonce_store_health"]["status"], "unavailable");
    }

    #[tokio::test]
    async fn test_signed_analyze_unavailable_when_nonce_store_down() {
        let state = test_state(Arc::new(UnreachableNonceLedger));
        let token = state.issuer.issue().unwrap().token;
        let signature = state
            .auth_guards()
            .authenticator
            .challenge()
            .sign("ext-1", NOW);
        let client_header = state.config.extension_client_header.clone();
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/analyze")
                    .header(header::USER_AGENT, "Mozilla/5.0 Chrome/120.0")
                    .header(header::ORIGIN, ORIGIN)
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header_names::EXTENSION_CLIENT, client_header)
                    .header(header_names::EXTENSION_ID, "ext-1")
                    .header(header_names::REQUEST_TIMESTAMP, NOW.to_string())
                    .header(header_names::REQUEST_SIGNATURE, signature)
                    .header(header_names::REQUEST_NONCE, "nonce-1")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["detail"], "Service temporarily unavailable");
    }
}
