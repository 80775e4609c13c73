use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::builder::csrf_token_from_cookies;
use crate::config::{ClientConfig, ABSOLUTE_MAX_SIZE};
use crate::error::SdkError;
use crate::record_uploader::RecordUploader;
use crate::uploader::BatchUploader;

#[derive(Debug, Serialize, Deserialize)]
pub struct MaxSizeResponse {
    #[serde(rename = "maxSize")]
    pub max_size: serde_json::Value, // number, or a numeric string from some servers
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExistingInstance {
    pub instance: String,
    #[serde(rename = "instanceAttachments", default)]
    pub instance_attachments: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Talks to the relay on behalf of one form.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    config: Arc<ClientConfig>,
}

impl RelayClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    pub fn with_client(client: Client, config: ClientConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Maximum submission size advised for this form, clamped to
    /// [`ABSOLUTE_MAX_SIZE`]. Falls back to the configured default when the
    /// relay cannot be asked or answers nonsense.
    pub async fn max_submission_size(&self) -> u64 {
        match self.fetch_max_size().await {
            Ok(Some(size)) => clamp_max_size(size),
            Ok(None) => {
                tracing::error!("Unexpected max-size response, using default");
                self.config.default_max_size
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to retrieve maximum submission size, using default");
                self.config.default_max_size
            }
        }
    }

    async fn fetch_max_size(&self) -> Result<Option<u64>, SdkError> {
        let resp = self.client.get(self.config.max_size_url()?).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }

        let parsed: MaxSizeResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) => return Ok(None),
        };
        Ok(parse_size(&parsed.max_size))
    }

    /// Fetch a cached instance for editing.
    pub async fn existing_instance(&self, instance_id: &str) -> Result<ExistingInstance, SdkError> {
        let resp = self
            .client
            .get(self.config.instance_url(instance_id)?)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }

        serde_json::from_str::<ExistingInstance>(&text).map_err(|e| SdkError::Status {
            status: status.as_u16(),
            message: format!("malformed instance response: {e}"),
        })
    }

    /// Batch uploader sharing this client's connection pool.
    pub fn batch_uploader(&self) -> BatchUploader {
        BatchUploader::new(self.client.clone(), Arc::clone(&self.config))
    }

    /// Record uploader bound to the currently advised size limit.
    pub async fn record_uploader(&self) -> RecordUploader {
        let limit = self.max_submission_size().await;
        RecordUploader::new(self.batch_uploader(), limit)
    }

    /// Record uploader that sends the anti-forgery token found in
    /// `cookies` (a `Cookie` header value) under `csrf_cookie_name`.
    pub async fn record_uploader_with_cookies(&self, cookies: &str) -> RecordUploader {
        let token = csrf_token_from_cookies(cookies, &self.config.csrf_cookie_name);
        if token.is_none() {
            tracing::debug!(cookie = %self.config.csrf_cookie_name, "No anti-forgery token in cookies");
        }
        self.record_uploader().await.with_csrf_token(token)
    }
}

/// Clamp an advised size to the absolute ceiling.
pub fn clamp_max_size(size: u64) -> u64 {
    size.min(ABSOLUTE_MAX_SIZE)
}

fn parse_size(value: &serde_json::Value) -> Option<u64> {
    let size = match value {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (size > 0).then_some(size)
}

fn status_error(status: u16, body: &str) -> SdkError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.to_string());
    SdkError::Status { status, message }
}
