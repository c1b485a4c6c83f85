//! Extension authentication middleware.
//!
//! # Protection Levels
//!
//! - [`Protection::ExtensionHeaders`] - static `X-Extension-Client` header and
//!   allow-listed `Origin`. Used by the token endpoint, which is how a client
//!   obtains its first bearer credential.
//! - [`Protection::SignedSession`] - the above, then a bearer credential, then
//!   (unless disabled) the signed-request pipeline with replay protection.
//!
//! On success the verified pieces are inserted as request extensions:
//! [`OriginMetadata`] always, [`VerifiedCredential`] and [`AuthContext`] for
//! signed sessions. Handlers pull them out with `Extension<T>`.
//!
//! # Usage
//!
//! ```rust,ignore
//! let guard = ExtensionAuthLayer::new(state.auth_guards(), Protection::SignedSession);
//! Router::new().route("/api/v1/analyze", post(analyze).route_layer(guard));
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, header};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::debug;

use super::ip::extract_client_ip;
use crate::auth::authenticator::rejected;
use crate::auth::{
    AuthContext, AuthError, ClientMeta, CredentialVerifier, ExtensionHeaderCheck, OriginMetadata,
    RequestAuthenticator, VerifiedCredential,
};
use crate::error::AppResult;

/// Authentication scheme accepted in the `Authorization` header.
const BEARER_PREFIX: &str = "Bearer ";

/// What a route requires before its handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    ExtensionHeaders,
    SignedSession,
}

/// Shared checkers used by every guarded route.
#[derive(Debug, Clone)]
pub struct AuthGuards {
    pub header_check: ExtensionHeaderCheck,
    pub verifier: CredentialVerifier,
    pub authenticator: RequestAuthenticator,
    /// Run the signed-request pipeline on signed sessions.
    pub require_signed_requests: bool,
}

impl AuthGuards {
    /// Run the checks for `protection`, returning the extensions to attach.
    async fn admit(
        &self,
        protection: Protection,
        headers: &HeaderMap,
        meta: &mut ClientMeta,
    ) -> AppResult<Admitted> {
        // The header check logs its own rejections
        let origin = self.header_check.check(headers, meta)?;

        if protection == Protection::ExtensionHeaders {
            return Ok(Admitted {
                origin,
                credential: None,
                context: None,
            });
        }

        let token = bearer_token(headers)
            .ok_or_else(|| rejected(AuthError::TokenInvalid, meta, None))?;
        let credential = self
            .verifier
            .verify(token)
            .map_err(|e| rejected(e, meta, None))?;
        meta.key_position = Some(credential.key_position);

        let context = if self.require_signed_requests {
            Some(self.authenticator.authenticate(headers, meta).await?)
        } else {
            debug!(client_ip = %meta.ip, "Signed-request checks disabled");
            None
        };

        Ok(Admitted {
            origin,
            credential: Some(credential),
            context,
        })
    }
}

struct Admitted {
    origin: OriginMetadata,
    credential: Option<VerifiedCredential>,
    context: Option<AuthContext>,
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_at_checked(BEARER_PREFIX.len())?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case(BEARER_PREFIX) && !token.is_empty()).then_some(token)
}

/// Extension authentication layer.
#[derive(Clone)]
pub struct ExtensionAuthLayer {
    guards: Arc<AuthGuards>,
    protection: Protection,
}

impl ExtensionAuthLayer {
    pub fn new(guards: Arc<AuthGuards>, protection: Protection) -> Self {
        Self { guards, protection }
    }
}

impl<S> Layer<S> for ExtensionAuthLayer {
    type Service = ExtensionAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ExtensionAuthService {
            inner,
            guards: self.guards.clone(),
            protection: self.protection,
        }
    }
}

/// Extension authentication service wrapper.
#[derive(Clone)]
pub struct ExtensionAuthService<S> {
    inner: S,
    guards: Arc<AuthGuards>,
    protection: Protection,
}

impl<S> Service<Request<Body>> for ExtensionAuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let guards = self.guards.clone();
        let protection = self.protection;
        let mut inner = self.inner.clone();

        let mut meta = ClientMeta {
            ip: extract_client_ip(&req).into_owned(),
            path: req.uri().path().to_owned(),
            key_position: None,
        };

        Box::pin(async move {
            let admitted = match guards.admit(protection, req.headers(), &mut meta).await {
                Ok(admitted) => admitted,
                Err(err) => return Ok(err.into_response()),
            };

            let extensions = req.extensions_mut();
            extensions.insert(admitted.origin);
            if let Some(credential) = admitted.credential {
                extensions.insert(credential);
            }
            if let Some(context) = admitted.context {
                extensions.insert(context);
            }

            inner.call(req).await
        })
    }
}
