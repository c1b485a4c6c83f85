//! Short-lived bearer credentials (HS256 JWT).
//!
//! [`CredentialIssuer`] signs with the active secret only. [`CredentialVerifier`]
//! walks the [`SecretRegistry`] in order so credentials issued before a
//! rotation stay valid until they expire.
//!
//! Expiry is checked against the injected [`Clock`] with zero leeway rather
//! than by `jsonwebtoken`'s built-in validation, which reads the system time
//! and allows 60 seconds of skew.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::clock::Clock;
use super::error::AuthError;
use super::secrets::{KeyPosition, SecretRegistry};
use crate::error::{AppError, AppResult};
use crate::metrics;

/// Credential lifetime in seconds (15 minutes).
pub const CREDENTIAL_TTL_SECS: i64 = 900;

/// Rotation tag stamped into every credential.
///
/// Informational only: the verifying key position is derived from which
/// secret validates the signature, never from this claim.
pub const ROTATION_TAG: &str = "current";

/// The `type` claim. Only access credentials exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
}

/// Claims carried by a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds. Always `iat + CREDENTIAL_TTL_SECS`.
    pub exp: i64,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub rot: String,
}

/// A freshly minted credential.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub token: String,
    pub claims: Claims,
    pub expires_in: i64,
}

/// A credential that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    pub claims: Claims,
    /// Registry position of the secret that verified the signature.
    pub key_position: KeyPosition,
}

// =============================================================================
// Issuer
// =============================================================================

/// Mints bearer credentials signed with the active secret.
#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    registry: Arc<SecretRegistry>,
    clock: Arc<dyn Clock>,
}

impl CredentialIssuer {
    pub fn new(registry: Arc<SecretRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    /// Issue a new credential valid for [`CREDENTIAL_TTL_SECS`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if signing fails.
    pub fn issue(&self) -> AppResult<IssuedCredential> {
        let iat = self.clock.now();
        let claims = Claims {
            iat,
            exp: iat + CREDENTIAL_TTL_SECS,
            kind: TokenKind::Access,
            rot: ROTATION_TAG.to_string(),
        };

        let key = EncodingKey::from_secret(self.registry.active().as_bytes());
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
            .map_err(|e| AppError::Internal(format!("failed to sign credential: {e}")))?;

        metrics::record_token_issued();
        debug!(iat, exp = claims.exp, "Issued bearer credential");

        Ok(IssuedCredential {
            token,
            claims,
            expires_in: CREDENTIAL_TTL_SECS,
        })
    }
}

// =============================================================================
// Verifier
// =============================================================================

/// Validates bearer credentials against every secret in the registry.
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    registry: Arc<SecretRegistry>,
    clock: Arc<dyn Clock>,
    validation: Validation,
}

impl CredentialVerifier {
    pub fn new(registry: Arc<SecretRegistry>, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            registry,
            clock,
            validation,
        }
    }

    /// Verify `token`, trying secrets in registry order.
    ///
    /// A signature that verifies but is past `exp` stops the search with
    /// `TokenExpired`; a signature that fails moves on to the next secret.
    ///
    /// # Errors
    ///
    /// `TokenExpired` or `TokenInvalid`.
    pub fn verify(&self, token: &str) -> Result<VerifiedCredential, AuthError> {
        for (position, secret) in self.registry.iter() {
            let key = DecodingKey::from_secret(secret.as_bytes());
            let Ok(data) = jsonwebtoken::decode::<Claims>(token, &key, &self.validation) else {
                continue;
            };

            let claims = data.claims;
            if self.clock.now() >= claims.exp {
                debug!(key_position = %position, exp = claims.exp, "Bearer credential expired");
                return Err(AuthError::TokenExpired);
            }

            if position.is_retired() {
                info!(key_position = %position, "Bearer credential verified with retired secret");
            } else {
                debug!(key_position = %position, "Bearer credential verified");
            }
            metrics::record_token_verified(position.label());

            return Ok(VerifiedCredential {
                claims,
                key_position: position,
            });
        }

        Err(AuthError::TokenInvalid)
    }
}
