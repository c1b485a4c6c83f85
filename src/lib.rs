//! # Privacy Inspector API
//!
//! Backend for the Privacy Inspector browser extension. The interesting part
//! is request authentication:
//!
//! - **Bearer credentials**: 15 minute HS256 tokens, verified against the
//!   active secret and any retired secrets still in their grace period
//! - **Signed requests**: HMAC proof over `(client id, timestamp)` with a
//!   30 second freshness window
//! - **Replay protection**: single-use nonces held for 5 minutes, in memory
//!   or in Redis when several instances serve traffic
//! - **Extension checks**: static client header and allow-listed origin
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Security Headers → CORS → Trace)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Route layers (Rate Limit → Extension Auth)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, auth, analyze)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  auth: SecretRegistry, Credential*, ChallengeProtocol,      │
//! │        NonceLedger, RequestAuthenticator                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use privacy_inspector::auth::{InMemoryNonceLedger, SystemClock};
//! use privacy_inspector::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let ledger = Arc::new(InMemoryNonceLedger::new(Arc::new(SystemClock)));
//!     let state = AppState::new(config, ledger)?;
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Key Rotation
//!
//! ```bash
//! JWT_SECRET=new-secret JWT_SECRET_OLD=previous-secret cargo run
//! ```

pub mod analysis;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
