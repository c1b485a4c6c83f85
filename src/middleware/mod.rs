//! HTTP middleware for authentication, rate limiting, and observability.
//!
//! - **Extension Auth**: header/origin check, bearer credential, signed
//!   request with single-use nonce
//! - **Rate Limiting**: per-route, per-IP GCRA quotas
//! - **Security Headers**: hardening headers on every response, request logs
//!
//! # Architecture
//!
//! ```text
//! Request → Security Headers → CORS → Trace → Rate Limiter → Extension Auth → Handler
//!                                                ↓                ↓
//!                                          429 Too Many     401 / 403 / 503
//! ```
//!
//! Rate limiting and authentication are route layers, so unknown paths get
//! a plain 404 without touching either.

pub mod auth;
pub mod ip;
pub mod rate_limit;
pub mod security_headers;

pub use auth::{AuthGuards, ExtensionAuthLayer, Protection};
pub use ip::{UNKNOWN_IP, client_ip_from_headers, extract_client_ip};
pub use rate_limit::{RateLimitError, RateLimitLayer};
pub use security_headers::SecurityHeadersLayer;
