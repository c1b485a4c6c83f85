mod api;

pub use api::{
    AnalyticsFlags, AnalyzeRequest, AnalyzeResponse, AuthResponse, ComponentHealth, CookieData,
    FingerprintingFlags, HealthResponse, NetworkRequestData, PrivacyFeatures, PrivacyLevel,
    ScriptData,
};
