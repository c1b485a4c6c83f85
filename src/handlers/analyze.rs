use axum::body::Bytes;
use axum::extract::State;
use axum::{Extension, Json};
use tracing::{debug, info, instrument};

use crate::auth::{AuthContext, VerifiedCredential};
use crate::error::AppResult;
use crate::models::{AnalyzeRequest, AnalyzeResponse};
use crate::state::AppState;
use crate::validation::validate_analyze_request;

/// Analyze page data submitted by the extension.
///
/// The body is parsed here rather than by the `Json` extractor so malformed
/// payloads get the same sanitized 400 body as every other error.
#[instrument(skip_all)]
pub async fn analyze(
    State(state): State<AppState>,
    Extension(credential): Extension<VerifiedCredential>,
    context: Option<Extension<AuthContext>>,
    body: Bytes,
) -> AppResult<Json<AnalyzeResponse>> {
    let request: AnalyzeRequest = serde_json::from_slice(&body)?;
    validate_analyze_request(&request)?;

    if let Some(reported) = &request.privacy_features {
        debug!(?reported, "Extension-reported features");
    }

    let response = state.analyzer.analyze(&request)?;

    info!(
        analysis_id = %response.analysis_id,
        page_domain = %request.page_domain,
        privacy_score = response.privacy_score,
        key_position = credential.key_position.label(),
        client_id = context.as_ref().map(|Extension(c)| c.client_id.as_str()).unwrap_or("unsigned"),
        "Analysis completed"
    );

    Ok(Json(response))
}
