//! Size advisor handlers.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RelayError;
use crate::http::server::{resolve_survey, AppState};
use crate::upstream::communicator::{submission_url, to_uri};

pub const XFORM_URL_PARAMETER: &str = "xformUrl";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaxSize {
    #[serde(rename = "maxSize")]
    pub max_size: u64,
}

/// `GET /submission/max-size/{form_id}`
pub async fn max_size_for_form(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MaxSize>, RelayError> {
    let survey = resolve_survey(&state, &form_id).await?;
    let credentials = state.credentials.resolve(&headers);
    let url = to_uri(&parse_url(&submission_url(&survey.server_url))?)?;
    let default = state.config.load().submission.default_max_size;

    let max_size = state
        .communicator
        .max_size(&url, credentials.as_ref(), default)
        .await?;
    tracing::debug!(form_id = %form_id, max_size, "Max submission size resolved");
    Ok(Json(MaxSize { max_size }))
}

/// `GET /submission/max-size/?xformUrl=...`
///
/// Asks the form definition URL itself, for callers that have no form
/// identifier yet. No credentials are applied.
pub async fn max_size_for_url(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<MaxSize>, RelayError> {
    let xform_url = query
        .get(XFORM_URL_PARAMETER)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::BadRequest("Survey information not complete or invalid".to_string()))?;

    let form_url = parse_url(xform_url)?;
    if form_url.scheme() != "http" && form_url.scheme() != "https" {
        return Err(RelayError::BadRequest(format!("Unsupported xformUrl scheme {:?}", form_url.scheme())));
    }
    let url = to_uri(&form_url)?;
    let default = state.config.load().submission.default_max_size;

    let max_size = state.communicator.max_size(&url, None, default).await?;
    Ok(Json(MaxSize { max_size }))
}

fn parse_url(raw: &str) -> Result<Url, RelayError> {
    Url::parse(raw).map_err(|e| RelayError::BadRequest(format!("Invalid URL {raw:?}: {e}")))
}
