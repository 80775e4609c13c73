//! Submission relay handler.
//!
//! # Data Flow
//! ```text
//! POST /submission/{form_id}
//!     → resolve survey + credentials          (RECEIVED → TARGET_RESOLVED)
//!     → Authorization + Date, stream body up  (→ FORWARDING)
//!     → stream upstream response back         (→ COMPLETED)
//!         201: spawn bookkeeping
//!         401: prefix WWW-Authenticate
//!     → transport fault: 504 / 408 / 500      (→ FAILED)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::Response;

use crate::error::RelayError;
use crate::http::request::{request_id, SubmissionIds};
use crate::http::response::relay_response;
use crate::http::server::{resolve_survey, AppState};
use crate::observability::metrics;
use crate::security::headers::forwardable_request_headers;
use crate::store::SubmissionLog;
use crate::upstream::communicator::{date_header, forwarding_url, OPENROSA_VERSION, OPENROSA_VERSION_HEADER};

pub async fn submit(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    request: Request<Body>,
) -> Result<Response, RelayError> {
    let config = state.config.load_full();
    let request_id = request_id(request.headers()).to_string();
    let ids = SubmissionIds::from_headers(request.headers());

    let survey = resolve_survey(&state, &form_id).await?;

    let passthrough = config
        .submission
        .query_parameter
        .as_deref()
        .and_then(|name| query.get(name).filter(|v| !v.is_empty()).map(|v| (name, v.as_str())));
    let target = forwarding_url(&survey.server_url, passthrough)?;
    let credentials = state.credentials.resolve(request.headers());

    let authorization = match state
        .communicator
        .authorization(&target, request.method(), credentials.as_ref())
        .await
    {
        Ok(value) => value,
        Err(fault) => {
            // the forward below reports the real failure
            tracing::warn!(request_id = %request_id, form_id = %form_id, error = %fault, "Auth challenge request failed");
            None
        }
    };

    let (parts, body) = request.into_parts();
    let mut headers = forwardable_request_headers(&parts.headers);
    headers.insert(OPENROSA_VERSION_HEADER, HeaderValue::from_static(OPENROSA_VERSION));
    headers.insert(header::DATE, date_header());
    if let Some(value) = authorization {
        headers.insert(header::AUTHORIZATION, value);
    }

    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(target)
        .body(body)
        .map_err(|e| RelayError::Internal(e.to_string()))?;
    *outbound.headers_mut() = headers;

    tracing::debug!(
        request_id = %request_id,
        form_id = %form_id,
        instance_id = ids.instance_id.as_deref().unwrap_or("-"),
        upstream = %outbound.uri(),
        "Forwarding submission"
    );

    let deadline = Duration::from_millis(config.submission.deadline_ms());
    let upstream = match state.communicator.forward(outbound, deadline).await {
        Ok(response) => response,
        Err(fault) => {
            tracing::warn!(
                request_id = %request_id,
                form_id = %form_id,
                kind = fault.kind.as_str(),
                error = %fault,
                "Submission forward failed"
            );
            return Err(fault.into());
        }
    };

    let status = upstream.status();
    tracing::info!(
        request_id = %request_id,
        form_id = %form_id,
        instance_id = ids.instance_id.as_deref().unwrap_or("-"),
        status = status.as_u16(),
        "Upstream responded"
    );

    if status == StatusCode::CREATED {
        spawn_bookkeeping(Arc::clone(&state.submissions), form_id, ids);
    }

    Ok(relay_response(upstream))
}

/// Record an accepted submission without holding up the response.
fn spawn_bookkeeping(log: Arc<dyn SubmissionLog>, form_id: String, ids: SubmissionIds) {
    let Some(instance_id) = ids.instance_id else {
        tracing::warn!(form_id = %form_id, "Accepted submission carried no instance id, not logged");
        return;
    };

    tokio::spawn(async move {
        match log
            .record_if_new(&form_id, &instance_id, ids.deprecated_id.as_deref())
            .await
        {
            Ok(true) => {
                metrics::record_submission(&form_id);
                tracing::info!(form_id = %form_id, instance_id = %instance_id, "Submission recorded");
            }
            Ok(false) => {
                tracing::debug!(form_id = %form_id, instance_id = %instance_id, "Submission already recorded");
            }
            Err(e) => {
                tracing::error!(form_id = %form_id, instance_id = %instance_id, error = %e, "Failed to record submission");
            }
        }
    });
}
