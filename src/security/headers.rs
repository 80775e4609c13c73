//! Header filtering between caller and upstream.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers (RFC 7230 §6.1) in both directions
//! - Keep the caller's own `Host`, `Authorization` and `Cookie` away from the
//!   upstream server
//! - Keep the OpenRosa instance id headers local; the record XML already
//!   carries both ids
//!
//! # Design Decisions
//! - Filters build a new map; inbound maps are never edited in place

use axum::http::{header, HeaderMap, HeaderName};

use crate::http::request::{DEPRECATED_ID_HEADER, INSTANCE_ID_HEADER};

static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Headers named in `Connection` are hop-by-hop too.
fn connection_listed(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Copy of `headers` without hop-by-hop entries.
pub fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(headers);
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || listed.iter().any(|l| l == name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Inbound headers safe to send to the upstream server.
pub fn forwardable_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = end_to_end(inbound);
    out.remove(header::HOST);
    out.remove(header::AUTHORIZATION);
    out.remove(header::COOKIE);
    out.remove(INSTANCE_ID_HEADER);
    out.remove(DEPRECATED_ID_HEADER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwardable_request_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("relay.test"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-secret"));
        inbound.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        inbound.insert("x-secret", HeaderValue::from_static("1"));
        inbound.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        inbound.insert(header::COOKIE, HeaderValue::from_static("__csrf=abc"));
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer caller"));
        inbound.insert(header::CONTENT_TYPE, HeaderValue::from_static("multipart/form-data; boundary=x"));
        inbound.insert("x-openrosa-instance-id", HeaderValue::from_static("uuid:1"));
        inbound.insert("x-openrosa-deprecated-id", HeaderValue::from_static("uuid:0"));
        inbound.insert("x-openrosa-version", HeaderValue::from_static("1.0"));

        let out = forwardable_request_headers(&inbound);
        assert_eq!(out.len(), 2);
        assert!(out.contains_key(header::CONTENT_TYPE));
        assert!(out.contains_key("x-openrosa-version"));
        assert!(!out.contains_key("x-openrosa-instance-id"));
        assert!(!out.contains_key("x-openrosa-deprecated-id"));
    }

    #[test]
    fn test_end_to_end_keeps_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("h2c"));

        let out = end_to_end(&headers);
        assert_eq!(out.get_all(header::SET_COOKIE).iter().count(), 2);
        assert!(!out.contains_key(header::UPGRADE));
    }
}
