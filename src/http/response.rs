//! Response handling and transformation.
//!
//! # Responsibilities
//! - Stream the upstream response back without buffering
//! - Build the caller-facing header set once per response
//! - Rename the upstream auth challenge so browsers do not open their
//!   native credential dialog

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use hyper::body::Incoming;

use crate::security::headers::end_to_end;

/// Prefix added to `WWW-Authenticate` challenges relayed to the caller.
pub const AUTH_CHALLENGE_PREFIX: &str = "enketo";

/// Caller-facing headers for an upstream response.
pub fn relay_response_headers(status: StatusCode, upstream: &HeaderMap) -> HeaderMap {
    let mut headers = end_to_end(upstream);
    if status == StatusCode::UNAUTHORIZED {
        let challenges: Vec<HeaderValue> = headers
            .get_all(header::WWW_AUTHENTICATE)
            .iter()
            .filter_map(prefixed_challenge)
            .collect();
        headers.remove(header::WWW_AUTHENTICATE);
        for challenge in challenges {
            headers.append(header::WWW_AUTHENTICATE, challenge);
        }
    }
    headers
}

fn prefixed_challenge(value: &HeaderValue) -> Option<HeaderValue> {
    let mut bytes = Vec::with_capacity(AUTH_CHALLENGE_PREFIX.len() + value.len());
    bytes.extend_from_slice(AUTH_CHALLENGE_PREFIX.as_bytes());
    bytes.extend_from_slice(value.as_bytes());
    HeaderValue::from_bytes(&bytes).ok()
}

/// Caller response streaming `upstream`'s body.
pub fn relay_response(upstream: axum::http::Response<Incoming>) -> Response {
    let (mut parts, body) = upstream.into_parts();
    parts.headers = relay_response_headers(parts.status, &parts.headers);
    Response::from_parts(parts, Body::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_challenge_is_prefixed() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(r#"Digest realm="x", nonce="n""#));
        upstream.insert(header::CONNECTION, HeaderValue::from_static("close"));

        let headers = relay_response_headers(StatusCode::UNAUTHORIZED, &upstream);
        assert_eq!(
            headers.get(header::WWW_AUTHENTICATE).unwrap(),
            r#"enketoDigest realm="x", nonce="n""#
        );
        assert!(!headers.contains_key(header::CONNECTION));
    }

    #[test]
    fn test_other_statuses_keep_challenge() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
        let headers = relay_response_headers(StatusCode::FORBIDDEN, &upstream);
        assert_eq!(headers.get(header::WWW_AUTHENTICATE).unwrap(), "Basic");
    }
}
