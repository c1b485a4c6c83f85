use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Authentication Errors
///
/// Every authentication failure is carried as [`AuthError`] inside
/// `AppError::Auth`. The response body only ever says `"Token expired"`,
/// `"Invalid origin"` or `"Authentication failed"`; the precise failure kind
/// goes to logs and the `privacy_auth_failures_total` counter.
///
/// # Store Errors
///
/// `StoreUnavailable` signals that the shared nonce store could not be
/// reached. It maps to 503 so a store outage is never mistaken for an
/// accepted (or replayed) request.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Nonce store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            AppError::Auth(err) => {
                // Rejections are logged at warn, with caller context, where
                // they are detected.
                tracing::debug!(kind = err.kind(), "Authentication rejected");
                crate::metrics::record_auth_failure(err.kind());

                let mut response = (
                    err.status_code(),
                    axum::Json(ErrorResponse {
                        detail: err.public_detail().to_string(),
                    }),
                )
                    .into_response();
                if err.is_credential_failure() {
                    response.headers_mut().insert(
                        header::WWW_AUTHENTICATE,
                        HeaderValue::from_static("Bearer"),
                    );
                }
                return response;
            }

            // Service availability - don't leak store addresses
            AppError::StoreUnavailable(_) => {
                tracing::error!(error = %self, "Nonce store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }

            // Internal errors - never expose internal details to clients
            AppError::Internal(_) | AppError::ConfigError(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }

            // Client errors - safe to show the message as it's user-facing
            AppError::SerializationError(e) => {
                tracing::debug!(error = %e, "Rejected request body");
                (StatusCode::BAD_REQUEST, sanitize_serde_error(e))
            }
            AppError::BadRequest(msg) => {
                tracing::debug!(error = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg.clone())
            }
        };

        (status, axum::Json(ErrorResponse { detail })).into_response()
    }
}

/// Sanitize serde error messages to avoid leaking internal type information.
fn sanitize_serde_error(e: &serde_json::Error) -> String {
    let msg = e.to_string();

    if let Some(field) = backticked(&msg) {
        if msg.contains("missing field") {
            return format!("Missing required field: {field}");
        }
        if msg.contains("unknown field") {
            return format!("Unknown field: {field}");
        }
    }

    if msg.contains("invalid type") {
        return "Invalid data type in request body".to_string();
    }

    if msg.contains("EOF while parsing") || msg.contains("expected") {
        return "Malformed JSON in request body".to_string();
    }

    "Invalid request format".to_string()
}

/// First backtick-quoted segment of a serde message.
fn backticked(msg: &str) -> Option<&str> {
    let (_, rest) = msg.split_once('`')?;
    let (field, _) = rest.split_once('`')?;
    Some(field)
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_auth_error_body_is_generic() {
        let response = AppError::from(AuthError::NonceReused).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());

        let body = body_json(response).await;
        assert_eq!(body["detail"], "Authentication failed");
    }

    #[tokio::test]
    async fn test_expired_token_discloses_expiry_and_challenges_bearer() {
        let response = AppError::from(AuthError::TokenExpired).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
        assert_eq!(body_json(response).await["detail"], "Token expired");
    }

    #[tokio::test]
    async fn test_origin_mismatch_is_forbidden() {
        let response = AppError::from(AuthError::InvalidOrigin).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["detail"], "Invalid origin");
    }

    #[tokio::test]
    async fn test_store_outage_is_503_without_details() {
        let response =
            AppError::StoreUnavailable("redis://10.0.0.7:6379 refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert!(!body["detail"].as_str().unwrap().contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_internal_error_is_sanitized() {
        let response = AppError::Internal("signing key rejected".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["detail"], "Internal server error");
    }

    #[test]
    fn test_sanitize_missing_field() {
        let err = serde_json::from_str::<crate::models::AnalyzeRequest>("{}").unwrap_err();
        assert_eq!(sanitize_serde_error(&err), "Missing required field: page_url");
    }

    #[test]
    fn test_sanitize_malformed_json() {
        let err = serde_json::from_str::<serde_json::Value>("{\"a\":").unwrap_err();
        assert_eq!(sanitize_serde_error(&err), "Malformed JSON in request body");
    }
}
