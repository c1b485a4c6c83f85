//! Per-request authentication pipelines.
//!
//! [`ExtensionHeaderCheck`] is the stateless gate every API route passes:
//! static client header plus allow-listed origin.
//!
//! [`RequestAuthenticator`] is the signed-request pipeline. Steps run in a
//! fixed order and the first failure wins:
//!
//! 1. client environment (`User-Agent`)
//! 2. presence and shape of the four protocol headers
//! 3. timestamp parse
//! 4. challenge proof (freshness, then HMAC)
//! 5. nonce consumption
//!
//! The nonce is consumed last so a request that fails any earlier check
//! never burns it.

use std::sync::Arc;

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use super::challenge::ChallengeProtocol;
use super::error::AuthError;
use super::nonce::NonceLedger;
use super::secrets::KeyPosition;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::validation::{
    MAX_CLIENT_ID_LENGTH, MAX_NONCE_LENGTH, MAX_SIGNATURE_LENGTH, MAX_TIMESTAMP_LENGTH,
    parse_timestamp, validate_header_value,
};

/// Protocol header names (lowercase, as stored by `http`).
pub mod header_names {
    pub const EXTENSION_CLIENT: &str = "x-extension-client";
    pub const EXTENSION_ID: &str = "x-extension-id";
    pub const REQUEST_TIMESTAMP: &str = "x-request-timestamp";
    pub const REQUEST_SIGNATURE: &str = "x-request-signature";
    pub const REQUEST_NONCE: &str = "x-request-nonce";
    pub const SEC_FETCH_SITE: &str = "sec-fetch-site";
    pub const SEC_FETCH_MODE: &str = "sec-fetch-mode";
}

/// Browser families accepted by the environment check (matched as
/// substrings of the lowercased `User-Agent`).
pub const SUPPORTED_BROWSERS: [&str; 4] = ["chrome", "firefox", "safari", "edge"];

const EXPECTED_FETCH_SITES: [&str; 2] = ["none", "same-origin"];
const EXPECTED_FETCH_MODES: [&str; 2] = ["cors", "same-origin"];

/// Allowed-origin value that disables the origin check.
pub const ANY_ORIGIN: &str = "*";

// =============================================================================
// Request Metadata
// =============================================================================

/// Caller details gathered outside the header set.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: String,
    pub path: String,
    /// Registry position of the bearer credential, when one was verified
    /// for the same request.
    pub key_position: Option<KeyPosition>,
}

/// What the request says about where it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginMetadata {
    pub client_header: Option<String>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    pub sec_fetch_site: Option<String>,
    pub sec_fetch_mode: Option<String>,
}

impl OriginMetadata {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| header_str(headers, name).map(str::to_owned);
        Self {
            client_header: get(header_names::EXTENSION_CLIENT),
            origin: get("origin"),
            user_agent: get("user-agent"),
            sec_fetch_site: get(header_names::SEC_FETCH_SITE),
            sec_fetch_mode: get(header_names::SEC_FETCH_MODE),
        }
    }

    fn user_agent_or_unknown(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("unknown")
    }
}

/// Result of a successful signed-request check, attached to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub client_id: String,
    pub timestamp: i64,
    pub nonce: String,
    pub validated: bool,
    pub origin: OriginMetadata,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

/// Log a rejection with caller context and wrap it for the response.
pub fn rejected(err: AuthError, meta: &ClientMeta, client_id: Option<&str>) -> AppError {
    warn!(
        kind = err.kind(),
        client_ip = %meta.ip,
        path = %meta.path,
        client_id = client_id.unwrap_or("-"),
        "Request rejected"
    );
    AppError::Auth(err)
}

// =============================================================================
// Extension Header Check
// =============================================================================

/// Static client header and origin allow-list.
#[derive(Clone)]
pub struct ExtensionHeaderCheck {
    expected_client: Arc<str>,
    allowed_origin: Arc<str>,
}

impl std::fmt::Debug for ExtensionHeaderCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionHeaderCheck")
            .field("allowed_origin", &self.allowed_origin)
            .finish_non_exhaustive()
    }
}

impl ExtensionHeaderCheck {
    pub fn new(expected_client: impl Into<Arc<str>>, allowed_origin: impl Into<Arc<str>>) -> Self {
        Self {
            expected_client: expected_client.into(),
            allowed_origin: allowed_origin.into(),
        }
    }

    /// Validate `X-Extension-Client` (constant time) and then `Origin`.
    ///
    /// # Errors
    ///
    /// `InvalidClientHeader` (401) or `InvalidOrigin` (403).
    pub fn check(
        &self,
        headers: &HeaderMap,
        meta: &ClientMeta,
    ) -> Result<OriginMetadata, AuthError> {
        let origin = OriginMetadata::from_headers(headers);

        let client_ok = origin.client_header.as_deref().is_some_and(|provided| {
            bool::from(provided.as_bytes().ct_eq(self.expected_client.as_bytes()))
        });
        if !client_ok {
            let err = AuthError::InvalidClientHeader;
            warn!(
                kind = err.kind(),
                client_ip = %meta.ip,
                path = %meta.path,
                user_agent = origin.user_agent_or_unknown(),
                "Invalid or missing extension client header"
            );
            return Err(err);
        }

        if &*self.allowed_origin != ANY_ORIGIN
            && origin.origin.as_deref() != Some(&*self.allowed_origin)
        {
            let err = AuthError::InvalidOrigin;
            warn!(
                kind = err.kind(),
                client_ip = %meta.ip,
                path = %meta.path,
                origin = origin.origin.as_deref().unwrap_or("-"),
                user_agent = origin.user_agent_or_unknown(),
                "Origin not allowed"
            );
            return Err(err);
        }

        tracing::debug!(client_ip = %meta.ip, "Extension headers validated");
        Ok(origin)
    }
}

// =============================================================================
// Signed Request Pipeline
// =============================================================================

/// The four signed-request headers, borrowed from the header map.
struct SignedHeaders<'a> {
    client_id: &'a str,
    timestamp: &'a str,
    signature: &'a str,
    nonce: &'a str,
}

impl<'a> SignedHeaders<'a> {
    fn extract(headers: &'a HeaderMap) -> Result<Self, AuthError> {
        let field = |name: &str, max_len: usize| -> Result<&'a str, AuthError> {
            let value = header_str(headers, name).ok_or(AuthError::MissingHeader)?;
            validate_header_value(value, max_len)?;
            Ok(value)
        };

        Ok(Self {
            client_id: field(header_names::EXTENSION_ID, MAX_CLIENT_ID_LENGTH)?,
            timestamp: field(header_names::REQUEST_TIMESTAMP, MAX_TIMESTAMP_LENGTH)?,
            signature: field(header_names::REQUEST_SIGNATURE, MAX_SIGNATURE_LENGTH)?,
            nonce: field(header_names::REQUEST_NONCE, MAX_NONCE_LENGTH)?,
        })
    }
}

/// Reject clients that don't identify as a supported browser.
///
/// Unexpected `Sec-Fetch-*` values are logged but tolerated.
fn check_environment(origin: &OriginMetadata, meta: &ClientMeta) -> Result<(), AuthError> {
    let user_agent = origin
        .user_agent
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !SUPPORTED_BROWSERS.iter().any(|b| user_agent.contains(b)) {
        return Err(AuthError::EnvironmentRejected);
    }

    if let Some(site) = origin.sec_fetch_site.as_deref()
        && !EXPECTED_FETCH_SITES.contains(&site)
    {
        warn!(client_ip = %meta.ip, sec_fetch_site = site, "Suspicious Sec-Fetch-Site");
    }
    if let Some(mode) = origin.sec_fetch_mode.as_deref()
        && !EXPECTED_FETCH_MODES.contains(&mode)
    {
        warn!(client_ip = %meta.ip, sec_fetch_mode = mode, "Suspicious Sec-Fetch-Mode");
    }

    Ok(())
}

/// Environment, challenge and nonce checks for signed requests.
#[derive(Clone)]
pub struct RequestAuthenticator {
    challenge: ChallengeProtocol,
    ledger: Arc<dyn NonceLedger>,
}

impl std::fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAuthenticator")
            .field("challenge", &self.challenge)
            .field("ledger", &self.ledger.backend())
            .finish()
    }
}

impl RequestAuthenticator {
    pub fn new(challenge: ChallengeProtocol, ledger: Arc<dyn NonceLedger>) -> Self {
        Self { challenge, ledger }
    }

    pub fn challenge(&self) -> &ChallengeProtocol {
        &self.challenge
    }

    pub fn ledger(&self) -> &Arc<dyn NonceLedger> {
        &self.ledger
    }

    /// Run the signed-request pipeline.
    ///
    /// # Errors
    ///
    /// `AppError::Auth` for any rejected check, `AppError::StoreUnavailable`
    /// when the nonce store cannot answer.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        meta: &ClientMeta,
    ) -> AppResult<AuthContext> {
        let origin = OriginMetadata::from_headers(headers);
        check_environment(&origin, meta).map_err(|e| rejected(e, meta, None))?;

        let signed = SignedHeaders::extract(headers).map_err(|e| rejected(e, meta, None))?;
        let client_id = signed.client_id;

        let timestamp =
            parse_timestamp(signed.timestamp).map_err(|e| rejected(e, meta, Some(client_id)))?;

        self.challenge
            .verify(client_id, timestamp, signed.signature)
            .map_err(|e| rejected(e, meta, Some(client_id)))?;

        match self.ledger.consume(signed.nonce).await {
            Ok(true) => {}
            Ok(false) => return Err(rejected(AuthError::NonceReused, meta, Some(client_id))),
            Err(e) => {
                warn!(
                    client_ip = %meta.ip,
                    client_id,
                    backend = self.ledger.backend(),
                    "Nonce store unavailable"
                );
                return Err(e);
            }
        }

        info!(
            client_id,
            client_ip = %meta.ip,
            key_position = meta.key_position.map(|p| p.label()).unwrap_or("-"),
            "Signed request authenticated"
        );
        metrics::record_request_authenticated();

        Ok(AuthContext {
            client_id: client_id.to_owned(),
            timestamp,
            nonce: signed.nonce.to_owned(),
            validated: true,
            origin,
        })
    }
}
