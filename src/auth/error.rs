//! Authentication failure taxonomy.
//!
//! Every rejected request maps to exactly one [`AuthError`] variant. The
//! variant decides the HTTP status and a stable label for logs and metrics,
//! while the client-visible message stays generic: a caller can learn that
//! authentication failed (or that its token expired), never which check
//! tripped.

use axum::http::StatusCode;
use thiserror::Error;

/// Generic message returned for every 401 except token expiry.
pub const GENERIC_AUTH_FAILURE: &str = "Authentication failed";

/// Authentication and replay-protection failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// A required protocol header is absent, empty or unusable.
    #[error("required authentication header missing")]
    MissingHeader,

    /// The declared client environment is not a supported browser.
    #[error("unsupported client environment")]
    EnvironmentRejected,

    /// The static extension client header does not match.
    #[error("invalid extension client header")]
    InvalidClientHeader,

    /// The request origin is not allow-listed.
    #[error("origin not allowed")]
    InvalidOrigin,

    /// The request timestamp is not an integer.
    #[error("request timestamp is not a valid integer")]
    TimestampInvalid,

    /// The request timestamp is outside the freshness window.
    #[error("request timestamp outside freshness window")]
    TimestampStale,

    /// The challenge proof does not match.
    #[error("request signature mismatch")]
    SignatureInvalid,

    /// The nonce was already consumed inside its TTL window.
    #[error("request nonce already used")]
    NonceReused,

    /// The bearer credential has a valid signature but is past `exp`.
    #[error("bearer credential expired")]
    TokenExpired,

    /// The bearer credential could not be verified with any known key.
    #[error("bearer credential invalid")]
    TokenInvalid,
}

impl AuthError {
    /// HTTP status for this failure: 403 for origin mismatch, 401 otherwise.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidOrigin => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Client-visible `detail` string.
    ///
    /// Expiry is disclosed so clients know to fetch a fresh token; it does
    /// not depend on which key signed the credential.
    pub fn public_detail(&self) -> &'static str {
        match self {
            AuthError::InvalidOrigin => "Invalid origin",
            AuthError::TokenExpired => "Token expired",
            _ => GENERIC_AUTH_FAILURE,
        }
    }

    /// Stable snake_case label used in logs and the failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing_header",
            AuthError::EnvironmentRejected => "environment_rejected",
            AuthError::InvalidClientHeader => "invalid_client_header",
            AuthError::InvalidOrigin => "invalid_origin",
            AuthError::TimestampInvalid => "timestamp_invalid",
            AuthError::TimestampStale => "timestamp_stale",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::NonceReused => "nonce_reused",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenInvalid => "token_invalid",
        }
    }

    /// Whether the failure concerns the bearer credential.
    ///
    /// Used to attach a `WWW-Authenticate: Bearer` challenge to the response.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, AuthError::TokenExpired | AuthError::TokenInvalid)
    }
}
