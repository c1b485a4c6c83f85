//! HMAC-SHA256 challenge proofs binding a client id to a timestamp.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ring::hmac;
use subtle::ConstantTimeEq;

use super::clock::Clock;
use super::error::AuthError;
use super::secrets::SecretRegistry;

/// Maximum allowed distance between the request timestamp and server time.
pub const FRESHNESS_WINDOW_SECS: u64 = 30;

/// How the signed message is built.
///
/// `Legacy` appends the secret to the message as deployed extensions do;
/// `KeyedOnly` relies on the HMAC key alone. Both use the active secret as
/// the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProofConstruction {
    #[default]
    Legacy,
    KeyedOnly,
}

impl FromStr for ProofConstruction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "keyed-only" | "keyed_only" => Ok(Self::KeyedOnly),
            other => Err(format!(
                "unknown challenge construction '{other}' (expected 'legacy' or 'keyed-only')"
            )),
        }
    }
}

impl fmt::Display for ProofConstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Legacy => "legacy",
            Self::KeyedOnly => "keyed-only",
        })
    }
}

/// Computes and verifies challenge proofs with the active secret.
#[derive(Debug, Clone)]
pub struct ChallengeProtocol {
    registry: Arc<SecretRegistry>,
    clock: Arc<dyn Clock>,
    construction: ProofConstruction,
}

impl ChallengeProtocol {
    pub fn new(
        registry: Arc<SecretRegistry>,
        clock: Arc<dyn Clock>,
        construction: ProofConstruction,
    ) -> Self {
        Self {
            registry,
            clock,
            construction,
        }
    }

    pub fn construction(&self) -> ProofConstruction {
        self.construction
    }

    /// Lowercase hex proof for `(client_id, timestamp)`.
    pub fn sign(&self, client_id: &str, timestamp: i64) -> String {
        let secret = self.registry.active().as_bytes();
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret);

        let mut message = format!("{client_id}:{timestamp}").into_bytes();
        if self.construction == ProofConstruction::Legacy {
            message.push(b':');
            message.extend_from_slice(secret);
        }

        hex::encode(hmac::sign(&key, &message).as_ref())
    }

    /// Check freshness, then the proof.
    ///
    /// No HMAC is computed for a stale timestamp.
    ///
    /// # Errors
    ///
    /// `TimestampStale` or `SignatureInvalid`.
    pub fn verify(&self, client_id: &str, timestamp: i64, proof: &str) -> Result<(), AuthError> {
        let now = self.clock.now();
        if now.abs_diff(timestamp) > FRESHNESS_WINDOW_SECS {
            tracing::debug!(now, timestamp, "Challenge timestamp outside freshness window");
            return Err(AuthError::TimestampStale);
        }

        let expected = self.sign(client_id, timestamp);
        if bool::from(expected.as_bytes().ct_eq(proof.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::SignatureInvalid)
        }
    }
}
