use axum::Json;
use axum::extract::{Request, State};
use axum::http::header;
use tracing::{info, instrument};

use crate::auth::OriginMetadata;
use crate::error::AppResult;
use crate::middleware::extract_client_ip;
use crate::models::AuthResponse;
use crate::state::AppState;

/// Issue a bearer credential.
///
/// Reached only after the extension header and origin checks pass, which
/// insert the [`OriginMetadata`] extension.
#[instrument(skip_all)]
pub async fn issue_token(
    State(state): State<AppState>,
    request: Request,
) -> AppResult<Json<AuthResponse>> {
    let issued = state.issuer.issue()?;

    let origin = request.extensions().get::<OriginMetadata>();
    info!(
        client_ip = %extract_client_ip(&request),
        user_agent = origin
            .and_then(|o| o.user_agent.as_deref())
            .unwrap_or("unknown"),
        referer = request
            .headers()
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none"),
        "Issued access token"
    );

    Ok(Json(AuthResponse::bearer(issued.token, issued.expires_in)))
}
