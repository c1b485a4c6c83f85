//! Shared application state for Axum handlers.
//!
//! This module provides thread-safe, clonable state that is shared across
//! all request handlers. It includes:
//!
//! - **Credentials**: issuer for `/api/v1/auth` and the guards run by
//!   [`ExtensionAuthLayer`](crate::middleware::ExtensionAuthLayer)
//! - **Replay protection**: the injected [`NonceLedger`]
//! - **Analysis**: the [`PrivacyAnalyzer`] behind `/api/v1/analyze`
//! - **Configuration**: Runtime configuration access
//!
//! # Structured Concurrency
//!
//! The nonce sweep runs on a `tokio_util::task::TaskTracker` and stops on a
//! `CancellationToken`. Call `shutdown()` to stop it before application exit.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::analysis::{HeuristicAnalyzer, PrivacyAnalyzer};
use crate::auth::{
    ChallengeProtocol, Clock, CredentialIssuer, CredentialVerifier, ExtensionHeaderCheck,
    NonceLedger, RequestAuthenticator, SecretRegistry, SystemClock,
};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::AuthGuards;

/// Shared application state.
///
/// Cloning is cheap: every component is behind an `Arc` or is itself a thin
/// wrapper around `Arc`s.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Mints bearer credentials
    pub issuer: CredentialIssuer,
    /// Checks run by the authentication middleware
    guards: Arc<AuthGuards>,
    /// Scoring engine for `/api/v1/analyze`
    pub analyzer: Arc<dyn PrivacyAnalyzer>,
    /// Consumed nonces
    pub ledger: Arc<dyn NonceLedger>,
    /// Number of secrets accepted for verification
    pub secret_count: usize,
    started_at: Instant,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create application state on the system clock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the key material is unusable.
    pub fn new(config: Config, ledger: Arc<dyn NonceLedger>) -> AppResult<Self> {
        Self::with_parts(config, Arc::new(SystemClock), ledger)
    }

    /// Create application state with an explicit clock.
    ///
    /// Builds the secret registry, proves the active secret can sign and
    /// verify a credential, then starts the nonce sweep.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the registry is invalid or the
    /// issue/verify self-test fails.
    pub fn with_parts(
        config: Config,
        clock: Arc<dyn Clock>,
        ledger: Arc<dyn NonceLedger>,
    ) -> AppResult<Self> {
        let registry = Arc::new(config.secret_registry()?);
        let issuer = CredentialIssuer::new(registry.clone(), clock.clone());
        let verifier = CredentialVerifier::new(registry.clone(), clock.clone());

        self_test(&issuer, &verifier)?;

        let challenge =
            ChallengeProtocol::new(registry.clone(), clock, config.challenge_construction);
        let guards = AuthGuards {
            header_check: ExtensionHeaderCheck::new(
                config.extension_client_header.as_str(),
                config.allowed_origin.as_str(),
            ),
            verifier,
            authenticator: RequestAuthenticator::new(challenge, ledger.clone()),
            require_signed_requests: config.require_signed_requests,
        };

        let state = Self {
            config: Arc::new(config),
            issuer,
            guards: Arc::new(guards),
            analyzer: Arc::new(HeuristicAnalyzer::new()),
            ledger,
            secret_count: registry.len(),
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        log_registry(&registry, state.ledger.backend());
        state.spawn_nonce_sweep_task();

        Ok(state)
    }

    /// Guards shared by every protected route.
    pub fn auth_guards(&self) -> Arc<AuthGuards> {
        self.guards.clone()
    }

    /// Spawn the periodic sweep of expired nonces.
    ///
    /// Keeps the in-memory ledger bounded between requests and publishes its
    /// size. Backends that expire entries natively report zero purged.
    fn spawn_nonce_sweep_task(&self) {
        let ledger = self.ledger.clone();
        let interval_duration = self.config.nonce_sweep_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(interval_duration);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Nonce sweep task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        match ledger.purge_expired().await {
                            Ok(purged) => trace!(purged, "Nonce sweep completed"),
                            Err(e) => warn!(error = %e, "Nonce sweep failed"),
                        }
                        if let Some(entries) = ledger.entries() {
                            metrics::set_nonce_ledger_entries(entries);
                        }
                    }
                }
            }

            debug!("Nonce sweep task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// ```rust,ignore
    /// // In main.rs after the server returns:
    /// state.shutdown().await;
    /// ```
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Issue a credential and verify it, so unusable key material fails at
/// startup instead of on the first request.
fn self_test(issuer: &CredentialIssuer, verifier: &CredentialVerifier) -> AppResult<()> {
    let issued = issuer
        .issue()
        .map_err(|e| AppError::ConfigError(format!("credential self-test failed to sign: {e}")))?;
    verifier
        .verify(&issued.token)
        .map_err(|e| AppError::ConfigError(format!("credential self-test failed to verify: {e}")))?;
    Ok(())
}

fn log_registry(registry: &SecretRegistry, backend: &'static str) {
    info!(
        secrets = registry.len(),
        retired = registry.retired_count(),
        nonce_backend = backend,
        "Authentication components ready"
    );
}
