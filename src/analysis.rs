//! Privacy scoring behind `POST /api/v1/analyze`.
//!
//! The scoring engine is a collaborator of the authentication layer, reached
//! through [`PrivacyAnalyzer`]. [`HeuristicAnalyzer`] is the default:
//!
//! - `privacy_score = max(0, 100 - 2 * cookies - scripts)`, where cookies
//!   counts structured and legacy cookie entries
//! - a finding when more than 10 cookies or more than 20 scripts are present
//! - level `high` from 70, `medium` from 40, `low` below
//!
//! It also extracts the ten page features (third-party domains, scripts,
//! cookies and requests, persistent cookies, inline scripts, analytics and
//! fingerprinting flags, tracker counts).

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{AnalyzeRequest, AnalyzeResponse, PrivacyFeatures, PrivacyLevel};

/// Cookie count above which a finding is reported.
pub const COOKIE_FINDING_THRESHOLD: usize = 10;

/// Script count above which a finding is reported.
pub const SCRIPT_FINDING_THRESHOLD: usize = 20;

/// Registrable domains of widely deployed trackers.
pub const KNOWN_TRACKER_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "google-analytics.com",
    "googletagmanager.com",
    "googlesyndication.com",
    "facebook.net",
    "connect.facebook.net",
    "scorecardresearch.com",
    "hotjar.com",
    "criteo.com",
    "adnxs.com",
    "taboola.com",
    "outbrain.com",
    "quantserve.com",
    "amazon-adsystem.com",
    "bing.com",
];

const RECOMMENDATIONS_WITH_FINDINGS: [&str; 3] = [
    "Consider using a cookie blocker",
    "Review website permissions",
    "Enable enhanced tracking protection",
];

const RECOMMENDATION_CLEAN: &str = "Website appears to have good privacy practices";

/// Scores the page data submitted by the extension.
pub trait PrivacyAnalyzer: Send + Sync {
    /// Analyze one page.
    ///
    /// # Errors
    ///
    /// Implementations backed by external services return `AppError` when
    /// the service fails; the heuristic analyzer never does.
    fn analyze(&self, request: &AnalyzeRequest) -> AppResult<AnalyzeResponse>;
}

/// Rule-based analyzer with a static tracker list.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl PrivacyAnalyzer for HeuristicAnalyzer {
    fn analyze(&self, request: &AnalyzeRequest) -> AppResult<AnalyzeResponse> {
        let cookies_analyzed = request.raw_cookies.len() + request.cookies.len();
        let scripts_analyzed = request.scripts.len();
        let privacy_score = score(cookies_analyzed, scripts_analyzed);

        let page = normalize_domain(&request.page_domain);
        let extraction = extract_features(request, &page);

        let mut findings = Vec::new();
        if cookies_analyzed > COOKIE_FINDING_THRESHOLD {
            findings.push("High number of tracking cookies detected".to_string());
        }
        if scripts_analyzed > SCRIPT_FINDING_THRESHOLD {
            findings.push("Numerous third-party scripts loaded".to_string());
        }

        let recommendations = if findings.is_empty() {
            vec![RECOMMENDATION_CLEAN.to_string()]
        } else {
            RECOMMENDATIONS_WITH_FINDINGS
                .iter()
                .map(|r| (*r).to_string())
                .collect()
        };

        let risk_factors = risk_factors(&extraction);

        Ok(AnalyzeResponse {
            privacy_score,
            cookies_analyzed,
            scripts_analyzed,
            analysis_id: Uuid::new_v4().to_string(),
            computed_features: extraction.features,
            findings,
            recommendations,
            third_party_domains: extraction.third_party_domains.into_iter().collect(),
            known_trackers: extraction.known_trackers.into_iter().collect(),
            privacy_level: PrivacyLevel::from_score(privacy_score),
            risk_factors,
        })
    }
}

// =============================================================================
// Scoring
// =============================================================================

fn score(cookies: usize, scripts: usize) -> u32 {
    let penalty = cookies.saturating_mul(2).saturating_add(scripts);
    let penalty = u32::try_from(penalty).unwrap_or(u32::MAX);
    100u32.saturating_sub(penalty)
}

// =============================================================================
// Feature Extraction
// =============================================================================

struct Extraction {
    features: PrivacyFeatures,
    third_party_domains: BTreeSet<String>,
    known_trackers: BTreeSet<String>,
}

fn extract_features(request: &AnalyzeRequest, page: &str) -> Extraction {
    let mut third_party_domains = BTreeSet::new();
    let mut features = PrivacyFeatures::default();
    let mut tracker_scripts = 0u32;

    for cookie in &request.raw_cookies {
        let domain = normalize_domain(&cookie.domain);
        if cookie.is_persistent() {
            features.num_persistent_cookies += 1;
        }
        if is_third_party(&domain, page) {
            features.num_third_party_cookies += 1;
            third_party_domains.insert(domain);
        }
    }

    for script in &request.scripts {
        let Some(domain) = script.domain.as_deref().map(normalize_domain).filter(|d| !d.is_empty())
        else {
            features.num_inline_scripts += 1;
            continue;
        };
        if is_known_tracker(&domain) {
            tracker_scripts += 1;
        }
        if is_third_party(&domain, page) {
            features.num_third_party_scripts += 1;
            third_party_domains.insert(domain);
        }
    }

    for req in &request.network_requests {
        let domain = req
            .domain
            .as_deref()
            .map(normalize_domain)
            .filter(|d| !d.is_empty())
            .or_else(|| host_of(&req.url));
        if let Some(domain) = domain.filter(|d| is_third_party(d, page)) {
            features.num_third_party_requests += 1;
            third_party_domains.insert(domain);
        }
    }

    let known_trackers: BTreeSet<String> = third_party_domains
        .iter()
        .filter(|d| is_known_tracker(d))
        .cloned()
        .collect();

    features.num_third_party_domains = count(third_party_domains.len());
    features.num_known_tracker_domains = count(known_trackers.len());
    features.fraction_third_party_requests =
        ratio(features.num_third_party_requests, request.network_requests.len());
    features.tracker_script_ratio = ratio(tracker_scripts, request.scripts.len());
    features.has_analytics_global = u8::from(
        request
            .analytics_flags
            .as_ref()
            .is_some_and(|flags| flags.any()),
    );
    features.fingerprinting_flag = u8::from(
        request
            .fingerprinting_flags
            .as_ref()
            .is_some_and(|flags| flags.any()),
    );

    Extraction {
        features,
        third_party_domains,
        known_trackers,
    }
}

fn risk_factors(extraction: &Extraction) -> Vec<String> {
    let features = &extraction.features;
    let mut factors = Vec::new();

    if !extraction.known_trackers.is_empty() {
        factors.push(format!(
            "{} known tracker domain(s) contacted",
            extraction.known_trackers.len()
        ));
    }
    if features.fingerprinting_flag == 1 {
        factors.push("Browser fingerprinting techniques detected".to_string());
    }
    if features.has_analytics_global == 1 {
        factors.push("Analytics libraries present".to_string());
    }
    if features.num_persistent_cookies > 0 {
        factors.push(format!(
            "{} persistent cookie(s) set",
            features.num_persistent_cookies
        ));
    }

    factors
}

/// Lowercase, without a leading dot or `www.`.
fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
    match domain.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => domain,
    }
}

/// A domain is first-party when it equals the page domain or one is a
/// subdomain of the other.
fn is_third_party(domain: &str, page: &str) -> bool {
    if domain.is_empty() || page.is_empty() {
        return false;
    }
    !(domain == page || is_subdomain(domain, page) || is_subdomain(page, domain))
}

fn is_subdomain(child: &str, parent: &str) -> bool {
    child
        .strip_suffix(parent)
        .is_some_and(|prefix| prefix.ends_with('.'))
}

fn is_known_tracker(domain: &str) -> bool {
    KNOWN_TRACKER_DOMAINS
        .iter()
        .any(|tracker| domain == *tracker || is_subdomain(domain, tracker))
}

/// Host part of an absolute URL.
fn host_of(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    let host = normalize_domain(host);
    (!host.is_empty()).then_some(host)
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn ratio(part: u32, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(part) / total as f64
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request(extra: serde_json::Value) -> AnalyzeRequest {
        let mut body = serde_json::json!({
            "page_url": "https://news.example.com/article",
            "page_title": "Article",
            "page_domain": "news.example.com",
            "timestamp": "2025-01-01T00:00:00Z",
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_clean_page() {
        let response = HeuristicAnalyzer::new()
            .analyze(&request(serde_json::json!({})))
            .unwrap();

        assert_eq!(response.privacy_score, 100);
        assert_eq!(response.privacy_level, PrivacyLevel::High);
        assert!(response.findings.is_empty());
        assert_eq!(response.recommendations, vec![RECOMMENDATION_CLEAN]);
        assert!(Uuid::parse_str(&response.analysis_id).is_ok());
    }

    #[test]
    fn test_score_formula_and_findings() {
        let cookies: Vec<_> = (0..11)
            .map(|i| serde_json::json!({ "domain": format!("c{i}.example.org") }))
            .collect();
        let scripts: Vec<_> = (0..21)
            .map(|_| serde_json::json!({ "domain": "cdn.example.org" }))
            .collect();
        let response = HeuristicAnalyzer::new()
            .analyze(&request(serde_json::json!({
                "raw_cookies": cookies,
                "scripts": scripts,
            })))
            .unwrap();

        // 100 - 2*11 - 21
        assert_eq!(response.privacy_score, 57);
        assert_eq!(response.privacy_level, PrivacyLevel::Medium);
        assert_eq!(response.findings.len(), 2);
        assert_eq!(response.recommendations.len(), 3);
    }

    #[test]
    fn test_legacy_cookies_counted_and_score_floors_at_zero() {
        let legacy: Vec<String> = (0..60).map(|i| format!("c{i}=v")).collect();
        let response = HeuristicAnalyzer::new()
            .analyze(&request(serde_json::json!({ "cookies": legacy })))
            .unwrap();

        assert_eq!(response.cookies_analyzed, 60);
        assert_eq!(response.privacy_score, 0);
        assert_eq!(response.privacy_level, PrivacyLevel::Low);
    }

    #[test]
    fn test_third_party_and_tracker_extraction() {
        let response = HeuristicAnalyzer::new()
            .analyze(&request(serde_json::json!({
                "raw_cookies": [
                    { "domain": ".example.com", "session": true },
                    { "domain": ".doubleclick.net", "session": false, "expirationDate": 1.9e9 },
                ],
                "scripts": [
                    { "domain": "www.googletagmanager.com" },
                    { "domain": "static.news.example.com" },
                    {},
                ],
                "network_requests": [
                    { "url": "https://stats.g.doubleclick.net/collect?v=1", "method": "GET",
                      "type": "xmlhttprequest", "timestamp": "0" },
                    { "url": "https://news.example.com/api", "method": "GET",
                      "type": "fetch", "timestamp": "0" },
                ],
                "fingerprinting_flags": { "canvas_fingerprinting": true },
            })))
            .unwrap();

        let features = &response.computed_features;
        assert_eq!(
            response.third_party_domains,
            vec!["doubleclick.net", "googletagmanager.com", "stats.g.doubleclick.net"]
        );
        assert_eq!(response.known_trackers.len(), 3);
        assert_eq!(features.num_third_party_cookies, 1);
        assert_eq!(features.num_third_party_scripts, 1);
        assert_eq!(features.num_third_party_requests, 1);
        assert!((features.fraction_third_party_requests - 0.5).abs() < f64::EPSILON);
        assert_eq!(features.num_persistent_cookies, 1);
        assert_eq!(features.num_inline_scripts, 1);
        assert_eq!(features.fingerprinting_flag, 1);
        assert_eq!(features.has_analytics_global, 0);
        assert!(response.risk_factors.iter().any(|f| f.contains("fingerprinting")));
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://User@Cdn.Example.org:8443/x"), Some("cdn.example.org".into()));
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn test_privacy_level_boundaries() {
        assert_eq!(PrivacyLevel::from_score(70), PrivacyLevel::High);
        assert_eq!(PrivacyLevel::from_score(69), PrivacyLevel::Medium);
        assert_eq!(PrivacyLevel::from_score(40), PrivacyLevel::Medium);
        assert_eq!(PrivacyLevel::from_score(39), PrivacyLevel::Low);
    }
}
