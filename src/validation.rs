//! Input validation for protocol headers and analysis payloads.
//!
//! Header checks return [`AuthError`] so that a malformed header is
//! indistinguishable, to the client, from a missing one. Payload checks
//! return `AppError::BadRequest` with a user-facing message.

use crate::auth::AuthError;
use crate::error::{AppError, AppResult};
use crate::models::AnalyzeRequest;

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length of the declared client id (`X-Extension-ID`).
pub const MAX_CLIENT_ID_LENGTH: usize = 128;

/// Maximum length of a request nonce (`X-Request-Nonce`).
pub const MAX_NONCE_LENGTH: usize = 128;

/// Maximum length of a challenge proof (`X-Request-Signature`).
///
/// A SHA-256 proof is 64 hex characters; anything much longer is noise.
pub const MAX_SIGNATURE_LENGTH: usize = 128;

/// Maximum length of a request timestamp (`X-Request-Timestamp`).
///
/// Enough for any `i64` including the sign.
pub const MAX_TIMESTAMP_LENGTH: usize = 20;

/// Maximum length of a page URL in an analysis request.
pub const MAX_URL_LENGTH: usize = 2048;

/// Maximum number of items in each list of an analysis request.
pub const MAX_ITEMS_PER_LIST: usize = 5000;

// =============================================================================
// Header Validation
// =============================================================================

/// Validate a protocol header value.
///
/// Rules:
/// - Must be non-empty
/// - Must not exceed `max_len` bytes
/// - Must contain only visible ASCII (`0x21..=0x7E`)
pub fn validate_header_value(value: &str, max_len: usize) -> Result<(), AuthError> {
    if value.is_empty() || value.len() > max_len {
        return Err(AuthError::MissingHeader);
    }

    if !value.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(AuthError::MissingHeader);
    }

    Ok(())
}

/// Parse a request timestamp as whole Unix seconds.
pub fn parse_timestamp(value: &str) -> Result<i64, AuthError> {
    value.parse::<i64>().map_err(|_| AuthError::TimestampInvalid)
}

// =============================================================================
// Payload Validation
// =============================================================================

/// Validate an analysis request before it reaches the analyzer.
pub fn validate_analyze_request(request: &AnalyzeRequest) -> AppResult<()> {
    if request.page_url.trim().is_empty() {
        return Err(AppError::BadRequest("page_url cannot be empty".to_string()));
    }

    if request.page_url.len() > MAX_URL_LENGTH {
        return Err(AppError::BadRequest(format!(
            "page_url cannot exceed {MAX_URL_LENGTH} characters"
        )));
    }

    if request.page_domain.trim().is_empty() {
        return Err(AppError::BadRequest(
            "page_domain cannot be empty".to_string(),
        ));
    }

    let lists = [
        ("raw_cookies", request.raw_cookies.len()),
        ("scripts", request.scripts.len()),
        ("network_requests", request.network_requests.len()),
        ("cookies", request.cookies.len()),
    ];
    for (field, len) in lists {
        if len > MAX_ITEMS_PER_LIST {
            return Err(AppError::BadRequest(format!(
                "{field} cannot contain more than {MAX_ITEMS_PER_LIST} items (got {len})"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request() -> AnalyzeRequest {
        serde_json::from_value(serde_json::json!({
            "page_url": "https://news.example.com/article",
            "page_title": "Article",
            "page_domain": "news.example.com",
            "timestamp": "2025-01-01T00:00:00Z",
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_header_values() {
        assert!(validate_header_value("abcdefghijklmnop", MAX_CLIENT_ID_LENGTH).is_ok());
        assert!(
            validate_header_value("550e8400-e29b-41d4-a716-446655440000", MAX_NONCE_LENGTH).is_ok()
        );
        assert!(validate_header_value("a", 1).is_ok());
    }

    #[test]
    fn test_empty_header_rejected() {
        assert_eq!(
            validate_header_value("", MAX_NONCE_LENGTH),
            Err(AuthError::MissingHeader)
        );
    }

    #[test]
    fn test_oversized_header_rejected() {
        let long = "a".repeat(MAX_NONCE_LENGTH + 1);
        assert_eq!(
            validate_header_value(&long, MAX_NONCE_LENGTH),
            Err(AuthError::MissingHeader)
        );
    }

    #[test]
    fn test_whitespace_and_control_characters_rejected() {
        for value in ["with space", "tab\there", "new\nline", "nul\0", "caf\u{e9}"] {
            assert_eq!(
                validate_header_value(value, MAX_NONCE_LENGTH),
                Err(AuthError::MissingHeader),
                "{value:?}"
            );
        }
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1700000000"), Ok(1_700_000_000));
        assert_eq!(parse_timestamp("-5"), Ok(-5));
        assert_eq!(parse_timestamp("17e8"), Err(AuthError::TimestampInvalid));
        assert_eq!(parse_timestamp("1700000000.5"), Err(AuthError::TimestampInvalid));
        assert_eq!(parse_timestamp("99999999999999999999"), Err(AuthError::TimestampInvalid));
    }

    #[test]
    fn test_valid_analyze_request() {
        assert!(validate_analyze_request(&request()).is_ok());
    }

    #[test]
    fn test_empty_page_url_rejected() {
        let mut req = request();
        req.page_url = "  ".to_string();
        let result = validate_analyze_request(&req);
        assert!(result.unwrap_err().to_string().contains("page_url cannot be empty"));
    }

    #[test]
    fn test_long_page_url_rejected() {
        let mut req = request();
        req.page_url = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        let result = validate_analyze_request(&req);
        assert!(result.unwrap_err().to_string().contains("cannot exceed"));
    }

    #[test]
    fn test_too_many_items_rejected() {
        let mut req = request();
        req.cookies = vec!["a=b".to_string(); MAX_ITEMS_PER_LIST + 1];
        let result = validate_analyze_request(&req);
        assert!(result.unwrap_err().to_string().contains("cookies cannot contain"));
    }
}
