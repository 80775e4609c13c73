//! Collaborators consulted by the relay.
//!
//! # Data Flow
//! ```text
//! form id ──→ SurveyStore ──→ Survey { server_url, open_rosa_id, active }
//! request ──→ CredentialResolver ──→ Option<Credentials>
//! 201 from upstream ──→ SubmissionLog::record_if_new (+ per-form counter)
//! instance id ──→ InstanceStore ──→ CachedInstance (edit flows)
//! ```
//!
//! # Design Decisions
//! - Traits at the seam so deployments can back them with a database
//! - In-memory implementations are the defaults; the submission log and the
//!   instance cache persist to JSON files like any other local cache

pub mod credentials;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::config::FormConfig;

pub use credentials::{CookieCredentials, Credentials};
pub use memory::{FormRegistry, MemoryInstanceStore, MemorySubmissionLog};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store data error: {0}")]
    Data(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A form the relay forwards submissions for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    pub id: String,
    pub server_url: String,
    pub open_rosa_id: String,
    pub active: bool,
}

impl From<&FormConfig> for Survey {
    fn from(form: &FormConfig) -> Self {
        Self {
            id: form.id.clone(),
            server_url: form.server_url.clone(),
            open_rosa_id: form.open_rosa_id.clone(),
            active: form.active,
        }
    }
}

impl Survey {
    /// Ownership key of this survey, see [`open_rosa_key`].
    pub fn open_rosa_key(&self) -> Option<String> {
        open_rosa_key(&self.server_url, &self.open_rosa_id)
    }
}

/// Resolves form identifiers to surveys.
#[async_trait]
pub trait SurveyStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Survey>, StoreError>;

    /// Called with the new form list after a configuration reload.
    fn reload(&self, _forms: &[FormConfig]) {}
}

/// Derives upstream auth material from an inbound request.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Option<Credentials>;
}

/// Append-only log of accepted submissions.
#[async_trait]
pub trait SubmissionLog: Send + Sync {
    /// Record `instance_id` for `form_id` unless already present.
    ///
    /// Returns `true` for the first writer only; the per-form counter is
    /// incremented exactly when `true` is returned.
    async fn record_if_new(
        &self,
        form_id: &str,
        instance_id: &str,
        deprecated_id: Option<&str>,
    ) -> Result<bool, StoreError>;

    async fn submission_count(&self, form_id: &str) -> Result<u64, StoreError>;
}

/// A record cached for editing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedInstance {
    /// Ownership key of the form the instance was cached for.
    pub open_rosa_key: String,
    pub instance: String,
    #[serde(default)]
    pub instance_attachments: BTreeMap<String, String>,
}

#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get(&self, instance_id: &str) -> Result<Option<CachedInstance>, StoreError>;
}

/// Normalize a server URL for key comparison.
pub fn clean_url(url: &str) -> String {
    let mut url = url.trim();
    if let Some(stripped) = url.strip_suffix('/') {
        url = stripped;
    }
    let lower = url.to_lowercase();

    for prefix in ["https://www.", "http://www.", "https://", "http://"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            return format!("https://{rest}");
        }
    }
    lower
}

/// Key tying a cached instance to the form it belongs to.
///
/// `None` when either part is missing.
pub fn open_rosa_key(server_url: &str, open_rosa_id: &str) -> Option<String> {
    let id = open_rosa_id.trim();
    if server_url.trim().is_empty() || id.is_empty() {
        return None;
    }
    Some(format!("or:{},{}", clean_url(server_url), id).to_lowercase())
}

/// Rewrite a remote media URL to the path the relay serves it from.
pub fn to_local_media_url(base_path: &str, url: &str) -> String {
    let rest = ["https://", "http://"]
        .iter()
        .find_map(|scheme| {
            url.strip_prefix(scheme)
                .map(|rest| format!("{}/{rest}", scheme.trim_end_matches("://")))
        })
        .unwrap_or_else(|| url.to_string());
    format!("{base_path}/media/get/{rest}")
}
