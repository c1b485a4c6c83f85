//! Request authentication and replay protection.
//!
//! # Components
//!
//! - [`SecretRegistry`] - active secret plus retired secrets in their grace period
//! - [`CredentialIssuer`] / [`CredentialVerifier`] - 15 minute HS256 bearer credentials
//! - [`ChallengeProtocol`] - HMAC proof over `(client id, timestamp)` with a 30 s window
//! - [`NonceLedger`] - single-use nonces, in memory or in Redis
//! - [`RequestAuthenticator`] / [`ExtensionHeaderCheck`] - per-request pipelines
//!
//! Everything that reads the time takes a [`Clock`], so expiry and freshness
//! boundaries are testable without sleeping.

pub mod authenticator;
pub mod challenge;
pub mod clock;
pub mod credential;
pub mod error;
pub mod nonce;
pub mod redis_ledger;
pub mod secrets;

pub use authenticator::{
    ANY_ORIGIN, AuthContext, ClientMeta, ExtensionHeaderCheck, OriginMetadata,
    RequestAuthenticator, header_names,
};
pub use challenge::{ChallengeProtocol, FRESHNESS_WINDOW_SECS, ProofConstruction};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::{
    CREDENTIAL_TTL_SECS, Claims, CredentialIssuer, CredentialVerifier, IssuedCredential,
    TokenKind, VerifiedCredential,
};
pub use error::AuthError;
pub use nonce::{InMemoryNonceLedger, NONCE_TTL_SECS, NonceLedger};
pub use redis_ledger::{RedisLedgerConfig, RedisNonceLedger};
pub use secrets::{KeyPosition, Secret, SecretRegistry};
