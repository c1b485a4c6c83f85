//! Health endpoint.
//!
//! `GET /health` reports the authentication components: which nonce store is
//! in use and whether it answers, how many secrets are accepted, and any
//! insecure-but-allowed configuration. Returns 200 when healthy and 503 when
//! the nonce store cannot be reached, since no signed request can be accepted
//! in that state.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::{instrument, warn};

use crate::models::{ComponentHealth, HealthResponse};
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "timestamp": "2025-01-15T10:30:00Z",
///   "uptime_seconds": 3600,
///   "nonce_store": "memory",
///   "nonce_store_health": { "status": "ok" },
///   "signing_secrets": 2,
///   "signed_requests_required": true,
///   "warnings": []
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = match state.ledger.ping().await {
        Ok(()) => ComponentHealth {
            status: "ok".to_string(),
            detail: None,
        },
        Err(e) => {
            warn!(error = %e, backend = state.ledger.backend(), "Nonce store health check failed");
            ComponentHealth {
                status: "unavailable".to_string(),
                detail: Some("nonce store unreachable".to_string()),
            }
        }
    };
    let healthy = store.detail.is_none();

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        nonce_store: state.ledger.backend().to_string(),
        nonce_store_health: store,
        signing_secrets: state.secret_count,
        signed_requests_required: state.config.require_signed_requests,
        warnings: state.config.warnings(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
