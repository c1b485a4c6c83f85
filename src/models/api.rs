use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Authentication
// =============================================================================

/// Response from `POST /api/v1/auth`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    /// Always `"bearer"`
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
}

impl AuthResponse {
    pub fn bearer(access_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
            expires_in,
        }
    }
}

// =============================================================================
// Analysis Request
// =============================================================================

/// Cookie observed by the extension.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CookieData {
    pub domain: String,
    #[serde(default)]
    pub secure: bool,
    /// Expiry as Unix seconds; absent for session cookies.
    #[serde(default, rename = "expirationDate")]
    pub expiration_date: Option<f64>,
    #[serde(default = "default_true")]
    pub session: bool,
}

impl CookieData {
    /// A cookie that outlives the browser session.
    pub fn is_persistent(&self) -> bool {
        !self.session || self.expiration_date.is_some()
    }
}

fn default_true() -> bool {
    true
}

/// Script loaded by the page. Inline scripts have no domain.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScriptData {
    #[serde(default)]
    pub domain: Option<String>,
}

/// Network request made by the page.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkRequestData {
    pub url: String,
    pub method: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Analytics libraries detected in the page.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsFlags {
    pub has_google_analytics: bool,
    pub has_gtag: bool,
    pub has_facebook_pixel: bool,
    pub has_data_layer: bool,
    pub detected_analytics: Vec<String>,
}

impl AnalyticsFlags {
    pub fn any(&self) -> bool {
        self.has_google_analytics
            || self.has_gtag
            || self.has_facebook_pixel
            || self.has_data_layer
            || !self.detected_analytics.is_empty()
    }
}

/// Fingerprinting techniques detected in the page.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FingerprintingFlags {
    pub canvas_fingerprinting: bool,
    pub audio_fingerprinting: bool,
    pub webgl_fingerprinting: bool,
    pub font_fingerprinting: bool,
    pub detected_methods: Vec<String>,
}

impl FingerprintingFlags {
    pub fn any(&self) -> bool {
        self.canvas_fingerprinting
            || self.audio_fingerprinting
            || self.webgl_fingerprinting
            || self.font_fingerprinting
            || !self.detected_methods.is_empty()
    }
}

/// The ten privacy features, as computed by the extension or the server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PrivacyFeatures {
    pub num_third_party_domains: u32,
    pub num_third_party_scripts: u32,
    pub num_third_party_cookies: u32,
    pub num_third_party_requests: u32,
    pub fraction_third_party_requests: f64,
    pub num_known_tracker_domains: u32,
    pub num_persistent_cookies: u32,
    pub has_analytics_global: u8,
    pub num_inline_scripts: u32,
    pub fingerprinting_flag: u8,
    pub tracker_script_ratio: f64,
}

/// Body of `POST /api/v1/analyze`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub page_url: String,
    pub page_title: String,
    pub page_domain: String,
    pub timestamp: String,

    #[serde(default)]
    pub raw_cookies: Vec<CookieData>,
    #[serde(default)]
    pub scripts: Vec<ScriptData>,
    #[serde(default)]
    pub network_requests: Vec<NetworkRequestData>,

    #[serde(default)]
    pub analytics_flags: Option<AnalyticsFlags>,
    #[serde(default)]
    pub fingerprinting_flags: Option<FingerprintingFlags>,
    /// Features the extension computed itself; echoed in logs for comparison.
    #[serde(default)]
    pub privacy_features: Option<PrivacyFeatures>,

    /// Plain cookie strings sent by older extension builds.
    #[serde(default)]
    pub cookies: Vec<String>,
    #[serde(default)]
    pub additional_data: Option<HashMap<String, serde_json::Value>>,
}

// =============================================================================
// Analysis Response
// =============================================================================

/// Coarse privacy rating derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    Low,
    Medium,
    High,
}

impl PrivacyLevel {
    pub fn from_score(score: u32) -> Self {
        if score >= 70 {
            PrivacyLevel::High
        } else if score >= 40 {
            PrivacyLevel::Medium
        } else {
            PrivacyLevel::Low
        }
    }
}

/// Result of `POST /api/v1/analyze`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub privacy_score: u32,
    pub cookies_analyzed: usize,
    pub scripts_analyzed: usize,
    pub analysis_id: String,
    pub computed_features: PrivacyFeatures,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub third_party_domains: Vec<String>,
    pub known_trackers: Vec<String>,
    pub privacy_level: PrivacyLevel,
    pub risk_factors: Vec<String>,
}

// =============================================================================
// Health
// =============================================================================

/// State of one dependency in the health report.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Component report returned by `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    /// Backend holding consumed nonces ("memory" or "redis")
    pub nonce_store: String,
    pub nonce_store_health: ComponentHealth,
    /// Secrets accepted for verification, active included
    pub signing_secrets: usize,
    pub signed_requests_required: bool,
    pub warnings: Vec<String>,
}
