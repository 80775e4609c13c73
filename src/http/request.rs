//! Request identification and header reading.
//!
//! # Responsibilities
//! - Assign a request ID (UUID v4) as early as possible
//! - Echo it on the response and pass it to the upstream server
//! - Read the OpenRosa instance headers used for bookkeeping

use axum::http::{HeaderMap, HeaderName};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const INSTANCE_ID_HEADER: &str = "x-openrosa-instance-id";
pub const DEPRECATED_ID_HEADER: &str = "x-openrosa-deprecated-id";

/// Sets `x-request-id` on requests that do not carry one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid)
}

/// Copies the request's `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Trimmed, non-empty header value.
pub fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Instance and deprecated-instance ids announced by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionIds {
    pub instance_id: Option<String>,
    pub deprecated_id: Option<String>,
}

impl SubmissionIds {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            instance_id: header_text(headers, INSTANCE_ID_HEADER),
            deprecated_id: header_text(headers, DEPRECATED_ID_HEADER),
        }
    }
}
