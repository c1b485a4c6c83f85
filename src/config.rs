//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with defaults
//! suitable for local development. In production, configure via environment
//! variables or a `.env` file.
//!
//! # Key Material
//!
//! - `JWT_SECRET`: active secret for bearer credentials and challenge proofs
//! - `JWT_SECRET_OLD`: comma-separated retired secrets still accepted for
//!   bearer verification (rotation grace period)
//!
//! # Client Checks
//!
//! - `EXTENSION_CLIENT_HEADER`: expected `X-Extension-Client` value
//! - `ALLOWED_ORIGIN`: allowed `Origin` (`*` disables the check)
//! - `REQUIRE_SIGNED_REQUESTS`: enforce the signed-request pipeline on analysis
//! - `CHALLENGE_CONSTRUCTION`: `legacy` (default) or `keyed-only`
//!
//! # Replay Protection
//!
//! - `REDIS_URL`: when set, nonces are stored in Redis and shared across
//!   instances; otherwise each instance keeps its own in-memory ledger

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::{ProofConstruction, Secret, SecretRegistry};
use crate::error::{AppError, AppResult};

/// Development fallback for `JWT_SECRET`. Flagged by the health report.
pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-in-production";

/// Placeholder `ALLOWED_ORIGIN`. Flagged by the health report.
pub const PLACEHOLDER_ORIGIN: &str = "chrome-extension://your-extension-id-here";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// let registry = config.secret_registry()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    /// Enables verbose diagnostics; reported as a warning by `/health`.
    pub debug: bool,

    // =========================================================================
    // Key Material
    // =========================================================================
    /// Active signing secret.
    pub jwt_secret: Secret,

    /// Retired secrets, newest first.
    pub jwt_secret_old: Vec<Secret>,

    // =========================================================================
    // Client Checks
    // =========================================================================
    /// Expected `X-Extension-Client` value (default: "privacy-inspector")
    pub extension_client_header: String,

    /// Allowed `Origin`, or `*` for any.
    pub allowed_origin: String,

    /// Enforce the signed-request pipeline on `/api/v1/analyze` (default: true)
    pub require_signed_requests: bool,

    /// Message layout for challenge proofs.
    pub challenge_construction: ProofConstruction,

    // =========================================================================
    // Replay Protection
    // =========================================================================
    /// Redis URL for the shared nonce store (in-memory ledger when unset).
    pub redis_url: Option<String>,

    /// How often expired in-memory nonces are swept (default: 60 seconds)
    pub nonce_sweep_interval: Duration,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Token requests per minute per IP (default: 10, 0 = disabled)
    pub auth_rate_limit: u32,

    /// Analysis requests per minute per IP (default: 5, 0 = disabled)
    pub analyze_rate_limit: u32,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log filter (e.g., "info", "privacy_inspector=debug")
    pub log_level: String,

    /// Log output format (default: text)
    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse or the
    /// combination is invalid.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8000)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?, // 1MB
            debug: Self::parse_bool_env("DEBUG", false)?,

            // Key material
            jwt_secret: Secret::from(
                env::var("JWT_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string()),
            ),
            jwt_secret_old: env::var("JWT_SECRET_OLD")
                .map(|v| parse_secret_list(&v))
                .unwrap_or_default(),

            // Client checks
            extension_client_header: env::var("EXTENSION_CLIENT_HEADER")
                .unwrap_or_else(|_| "privacy-inspector".to_string()),
            allowed_origin: env::var("ALLOWED_ORIGIN")
                .unwrap_or_else(|_| PLACEHOLDER_ORIGIN.to_string()),
            require_signed_requests: Self::parse_bool_env("REQUIRE_SIGNED_REQUESTS", true)?,
            challenge_construction: Self::parse_env(
                "CHALLENGE_CONSTRUCTION",
                ProofConstruction::Legacy,
            )?,

            // Replay protection
            redis_url: env::var("REDIS_URL").ok().filter(|u| !u.trim().is_empty()),
            nonce_sweep_interval: Duration::from_secs(Self::parse_env(
                "NONCE_SWEEP_INTERVAL_SECS",
                60,
            )?),

            // Rate limiting
            auth_rate_limit: Self::parse_env("AUTH_RATE_LIMIT", 10)?,
            analyze_rate_limit: Self::parse_env("ANALYZE_RATE_LIMIT", 5)?,

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: Self::parse_env("LOG_FORMAT", LogFormat::Text)?,
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        // Empty or duplicate secrets are rejected here
        self.secret_registry()?;

        if self.extension_client_header.is_empty() {
            return Err(AppError::ConfigError(
                "EXTENSION_CLIENT_HEADER cannot be empty".to_string(),
            ));
        }

        if self.allowed_origin.is_empty() {
            return Err(AppError::ConfigError(
                "ALLOWED_ORIGIN cannot be empty (use '*' to allow any origin)".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.nonce_sweep_interval.is_zero() {
            return Err(AppError::ConfigError(
                "NONCE_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the ordered secret registry (active first).
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` for empty or duplicate secrets.
    pub fn secret_registry(&self) -> AppResult<SecretRegistry> {
        SecretRegistry::with_retired(self.jwt_secret.clone(), self.jwt_secret_old.iter().cloned())
    }

    /// Insecure-but-allowed settings, reported by `/health` and at startup.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.jwt_secret == Secret::from(DEFAULT_JWT_SECRET) {
            warnings.push("Using default JWT_SECRET - change in production".to_string());
        }
        if self.allowed_origin == PLACEHOLDER_ORIGIN {
            warnings.push("ALLOWED_ORIGIN is still the placeholder value".to_string());
        }
        if self.allowed_origin == "*" {
            warnings.push("ALLOWED_ORIGIN is '*' - origin check disabled".to_string());
        }
        if !self.require_signed_requests {
            warnings.push(
                "REQUIRE_SIGNED_REQUESTS is off - replay protection disabled".to_string(),
            );
        }
        if self.debug {
            warnings.push("DEBUG mode is enabled".to_string());
        }

        warnings
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_enabled()
            .then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    fn parse_bool_env(name: &str, default: bool) -> AppResult<bool> {
        match env::var(name) {
            Ok(val) => parse_bool(&val)
                .ok_or_else(|| AppError::ConfigError(format!("Invalid {name}: '{val}'"))),
            Err(_) => Ok(default),
        }
    }
}

/// Split a comma-separated secret list, dropping blank entries.
fn parse_secret_list(value: &str) -> Vec<Secret> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Secret::from)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_request_body_size: 1024 * 1024, // 1MB
            debug: false,
            // Key material
            jwt_secret: Secret::from(DEFAULT_JWT_SECRET),
            jwt_secret_old: Vec::new(),
            // Client checks
            extension_client_header: "privacy-inspector".to_string(),
            allowed_origin: PLACEHOLDER_ORIGIN.to_string(),
            require_signed_requests: true,
            challenge_construction: ProofConstruction::Legacy,
            // Replay protection
            redis_url: None,
            nonce_sweep_interval: Duration::from_secs(60),
            // Rate limiting
            auth_rate_limit: 10,
            analyze_rate_limit: 5,
            // Observability
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_port: 9090,
        }
    }
}
