//! Caller IP extraction shared by rate limiting, authentication logs and
//! request logging.
//!
//! # Security Warning: IP Spoofing Risk
//!
//! Proxy headers are client-controlled unless a trusted reverse proxy
//! overwrites them. Deploy behind a proxy that sets `X-Forwarded-For` /
//! `X-Real-IP` itself, and block direct access, or per-IP rate limits can be
//! bypassed by rotating spoofed addresses.
//!
//! Resolution order:
//!
//! 1. first hop of `X-Forwarded-For`
//! 2. `X-Real-IP`
//! 3. socket peer address (`ConnectInfo<SocketAddr>`), when the server was
//!    started with connect info
//! 4. `"unknown"`, which all such requests share as one rate-limit key

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};

/// Fallback IP value when no client IP can be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// Extract the caller IP from proxy headers, falling back to `peer`.
pub fn client_ip_from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Cow<'static, str> {
    let first_hop = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = first_hop {
        return Cow::Owned(ip.to_owned());
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = real_ip {
        return Cow::Owned(ip.to_owned());
    }

    match peer {
        Some(addr) => Cow::Owned(addr.ip().to_string()),
        None => Cow::Borrowed(UNKNOWN_IP),
    }
}

/// Extract the caller IP for a request.
#[inline]
pub fn extract_client_ip<B>(req: &Request<B>) -> Cow<'static, str> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_ip_from_headers(req.headers(), peer)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_ip_from_xff_first_hop() {
        let req = request(&[("x-forwarded-for", "192.168.1.1, 10.0.0.1, 172.16.0.1")]);
        assert_eq!(extract_client_ip(&req), "192.168.1.1");
    }

    #[test]
    fn test_extract_ip_from_real_ip() {
        let req = request(&[("x-real-ip", "  10.0.0.5 ")]);
        assert_eq!(extract_client_ip(&req), "10.0.0.5");
    }

    #[test]
    fn test_xff_priority_over_real_ip() {
        let req = request(&[("x-forwarded-for", "1.1.1.1"), ("x-real-ip", "2.2.2.2")]);
        assert_eq!(extract_client_ip(&req), "1.1.1.1");
    }

    #[test]
    fn test_empty_xff_falls_through() {
        let req = request(&[("x-forwarded-for", " "), ("x-real-ip", "2.2.2.2")]);
        assert_eq!(extract_client_ip(&req), "2.2.2.2");
    }

    #[test]
    fn test_ipv6_first_hop() {
        let req = request(&[("x-forwarded-for", "2001:db8::1, 10.0.0.1")]);
        assert_eq!(extract_client_ip(&req), "2001:db8::1");
    }

    #[test]
    fn test_peer_address_fallback() {
        let mut req = request(&[]);
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 54321))));
        assert_eq!(extract_client_ip(&req), "127.0.0.1");
    }

    #[test]
    fn test_unknown_is_borrowed() {
        let req = request(&[]);
        let ip = extract_client_ip(&req);
        assert_eq!(ip, UNKNOWN_IP);
        assert!(matches!(ip, Cow::Borrowed(_)));
    }

    #[test]
    fn test_non_utf8_header_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            axum::http::HeaderValue::from_bytes(&[0xFF, 0xFE]).unwrap(),
        );
        assert_eq!(client_ip_from_headers(&headers, None), UNKNOWN_IP);
    }
}
