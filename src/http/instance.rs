//! Cached instance fetch for edit flows.

use std::collections::{BTreeMap, HashMap};

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::http::server::{resolve_survey, AppState};
use crate::store::to_local_media_url;

pub const INSTANCE_ID_PARAMETER: &str = "instanceId";

#[derive(Debug, Serialize, Deserialize)]
pub struct InstanceResponse {
    pub instance: String,
    #[serde(rename = "instanceAttachments")]
    pub instance_attachments: BTreeMap<String, String>,
}

/// `GET /submission/{form_id}?instanceId=...`
pub async fn get_instance(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<InstanceResponse>, RelayError> {
    let survey = resolve_survey(&state, &form_id).await?;
    let instance_id = query
        .get(INSTANCE_ID_PARAMETER)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::BadRequest("Survey information not complete or invalid".to_string()))?;

    let cached = state
        .instances
        .get(instance_id)
        .await?
        .ok_or(RelayError::InstanceNotFound)?;

    if survey.open_rosa_key().as_deref() != Some(cached.open_rosa_key.as_str()) {
        tracing::warn!(form_id = %form_id, instance_id, "Instance requested through a different form");
        return Err(RelayError::InstanceMismatch);
    }

    let base_path = state.config.load().submission.base_path.clone();
    let instance_attachments = cached
        .instance_attachments
        .into_iter()
        .map(|(name, url)| {
            let local = to_local_media_url(&base_path, &url);
            (name, local)
        })
        .collect();

    Ok(Json(InstanceResponse {
        instance: cached.instance,
        instance_attachments,
    }))
}
