//! Protocol-level tests for the authentication components, driven through
//! the public API with a manual clock.
//!
//! Run with: `cargo test --test auth_protocol`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue};

use privacy_inspector::AppError;
use privacy_inspector::auth::{
    AuthError, ChallengeProtocol, ClientMeta, CredentialIssuer, CredentialVerifier,
    InMemoryNonceLedger, KeyPosition, ManualClock, NonceLedger, ProofConstruction,
    RequestAuthenticator, Secret, SecretRegistry, TokenKind,
};

const T0: i64 = 1_700_000_000;
const CLIENT_ID: &str = "abcdefghijklmnopabcdefghijklmnop";
const FIREFOX_UA: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

fn registry(secrets: &[&str]) -> Arc<SecretRegistry> {
    Arc::new(SecretRegistry::new(secrets.iter().map(|s| Secret::from(*s)).collect()).unwrap())
}

fn legacy_challenge(secrets: &[&str], clock: &Arc<ManualClock>) -> ChallengeProtocol {
    ChallengeProtocol::new(registry(secrets), clock.clone(), ProofConstruction::Legacy)
}

fn signed_headers(challenge: &ChallengeProtocol, timestamp: i64, nonce: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let mut set = |name: &'static str, value: String| {
        headers.insert(name, HeaderValue::from_str(&value).unwrap());
    };
    set("user-agent", FIREFOX_UA.to_string());
    set("x-extension-id", CLIENT_ID.to_string());
    set("x-request-timestamp", timestamp.to_string());
    set("x-request-signature", challenge.sign(CLIENT_ID, timestamp));
    set("x-request-nonce", nonce.to_string());
    headers
}

fn auth_error(result: Result<impl std::fmt::Debug, AppError>) -> AuthError {
    match result {
        Err(AppError::Auth(err)) => err,
        other => panic!("expected an auth error, got {other:?}"),
    }
}

// ============================================================================
// Credentials
// ============================================================================

#[test]
fn test_credential_lifecycle() {
    let clock = Arc::new(ManualClock::new(T0));
    let secrets = registry(&["s1"]);
    let issuer = CredentialIssuer::new(secrets.clone(), clock.clone());
    let verifier = CredentialVerifier::new(secrets, clock.clone());

    let issued = issuer.issue().unwrap();
    let verified = verifier.verify(&issued.token).unwrap();
    assert_eq!(verified.claims.kind, TokenKind::Access);
    assert_eq!(verified.key_position, KeyPosition::ACTIVE);

    clock.set(T0 + 14 * 60 + 59);
    assert!(verifier.verify(&issued.token).is_ok());

    clock.set(T0 + 16 * 60);
    assert_eq!(verifier.verify(&issued.token), Err(AuthError::TokenExpired));
}

#[test]
fn test_rotation_grace_period() {
    let clock = Arc::new(ManualClock::new(T0));
    let before_rotation = CredentialIssuer::new(registry(&["s1"]), clock.clone())
        .issue()
        .unwrap();

    let during_grace = CredentialVerifier::new(registry(&["s2", "s1"]), clock.clone());
    let verified = during_grace.verify(&before_rotation.token).unwrap();
    assert_eq!(verified.key_position, KeyPosition(1));
    assert!(verified.key_position.is_retired());

    // New tokens are signed with the new active secret only
    let after_rotation = CredentialIssuer::new(registry(&["s2", "s1"]), clock.clone())
        .issue()
        .unwrap();
    let only_new = CredentialVerifier::new(registry(&["s2"]), clock.clone());
    assert!(only_new.verify(&after_rotation.token).is_ok());
    assert_eq!(
        only_new.verify(&before_rotation.token),
        Err(AuthError::TokenInvalid)
    );
}

// ============================================================================
// Signed Requests
// ============================================================================

#[tokio::test]
async fn test_freshness_window_boundaries() {
    let clock = Arc::new(ManualClock::new(T0));
    let challenge = legacy_challenge(&["s1"], &clock);
    let ledger = Arc::new(InMemoryNonceLedger::new(clock.clone()));
    let authenticator = RequestAuthenticator::new(challenge.clone(), ledger);
    let meta = ClientMeta::default();

    clock.set(T0 + 29);
    assert!(
        authenticator
            .authenticate(&signed_headers(&challenge, T0, "n-29"), &meta)
            .await
            .is_ok()
    );

    clock.set(T0 + 31);
    let result = authenticator
        .authenticate(&signed_headers(&challenge, T0, "n-31"), &meta)
        .await;
    assert_eq!(auth_error(result), AuthError::TimestampStale);
}

#[tokio::test]
async fn test_proof_from_wrong_secret_rejected() {
    let clock = Arc::new(ManualClock::new(T0));
    let server_side = legacy_challenge(&["s1"], &clock);
    let forged = legacy_challenge(&["s2"], &clock);
    let authenticator =
        RequestAuthenticator::new(server_side, Arc::new(InMemoryNonceLedger::new(clock.clone())));

    let result = authenticator
        .authenticate(&signed_headers(&forged, T0, "n-1"), &ClientMeta::default())
        .await;
    assert_eq!(auth_error(result), AuthError::SignatureInvalid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_nonce_accepted_once() {
    let clock = Arc::new(ManualClock::new(T0));
    let challenge = legacy_challenge(&["s1"], &clock);
    let ledger: Arc<dyn NonceLedger> = Arc::new(InMemoryNonceLedger::new(clock.clone()));
    let authenticator = Arc::new(RequestAuthenticator::new(challenge.clone(), ledger));
    let headers = Arc::new(signed_headers(&challenge, T0, "abc-123"));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let authenticator = authenticator.clone();
            let headers = headers.clone();
            tokio::spawn(async move {
                authenticator
                    .authenticate(&headers, &ClientMeta::default())
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    let mut replayed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(AppError::Auth(AuthError::NonceReused)) => replayed += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(replayed, 31);
}

#[tokio::test]
async fn test_nonce_reusable_after_ttl() {
    let clock = Arc::new(ManualClock::new(T0));
    let ledger = InMemoryNonceLedger::new(clock.clone());

    assert!(ledger.consume("n").await.unwrap());
    clock.advance(299);
    assert!(!ledger.consume("n").await.unwrap());
    clock.advance(2);
    assert!(ledger.consume("n").await.unwrap());
}
