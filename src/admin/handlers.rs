use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::http::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub forms: usize,
    pub base_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FormStatus {
    pub id: String,
    pub server_url: String,
    pub open_rosa_id: String,
    pub active: bool,
    pub submissions: u64,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let config = state.config.load();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        forms: config.forms.len(),
        base_path: config.submission.base_path.clone(),
    })
}

pub async fn get_forms(State(state): State<AppState>) -> Result<Json<Vec<FormStatus>>, RelayError> {
    let config = state.config.load_full();
    let mut forms = Vec::with_capacity(config.forms.len());

    for form in &config.forms {
        forms.push(FormStatus {
            id: form.id.clone(),
            server_url: form.server_url.clone(),
            open_rosa_id: form.open_rosa_id.clone(),
            active: form.active,
            submissions: state.submissions.submission_count(&form.id).await?,
        });
    }

    Ok(Json(forms))
}
