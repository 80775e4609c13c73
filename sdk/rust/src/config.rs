//! Client configuration.
//!
//! A plain value object handed to each component at construction; nothing
//! here is global or mutable after startup.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SdkError;

/// Absolute ceiling on any advised submission size, in bytes.
pub const ABSOLUTE_MAX_SIZE: u64 = 100 * 1000 * 1000;

/// Submission size used when the relay cannot advise one.
pub const DEFAULT_MAX_SIZE: u64 = 5 * 1024 * 1024;

/// Where and how to submit records.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay base URL including any base path (e.g. "http://localhost:8005").
    pub relay_url: String,

    /// Form identifier known to the relay.
    pub form_id: Option<String>,

    /// External form definition URL, used when there is no form identifier yet.
    pub xform_url: Option<String>,

    /// Per-batch request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Extra time granted past `timeout_ms` before the transfer is aborted.
    pub grace_ms: u64,

    /// Limit used when the relay does not advise one.
    pub default_max_size: u64,

    /// Cookie that carries the anti-forgery token.
    pub csrf_cookie_name: String,

    /// Optional query parameter forwarded with every submission.
    pub submission_parameter: Option<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://localhost:8005".to_string(),
            form_id: None,
            xform_url: None,
            timeout_ms: 60 * 1000,
            grace_ms: 500,
            default_max_size: DEFAULT_MAX_SIZE,
            csrf_cookie_name: "__csrf".to_string(),
            submission_parameter: None,
        }
    }
}

impl ClientConfig {
    pub fn for_form(relay_url: impl Into<String>, form_id: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            form_id: Some(form_id.into()),
            ..Self::default()
        }
    }

    /// Total wall-clock budget for one batch.
    pub fn deadline_ms(&self) -> u64 {
        self.timeout_ms.saturating_add(self.grace_ms)
    }

    fn base(&self) -> Result<Url, SdkError> {
        let trimmed = self.relay_url.trim_end_matches('/');
        Url::parse(&format!("{trimmed}/")).map_err(|e| SdkError::InvalidUrl {
            url: self.relay_url.clone(),
            reason: e.to_string(),
        })
    }

    fn form_id(&self) -> Result<&str, SdkError> {
        self.form_id.as_deref().ok_or_else(|| SdkError::InvalidUrl {
            url: self.relay_url.clone(),
            reason: "no form id configured".to_string(),
        })
    }

    /// `POST` target for submissions, including the passthrough parameter.
    pub fn submission_url(&self) -> Result<Url, SdkError> {
        let mut url = self.join(&format!("submission/{}", self.form_id()?))?;
        if let Some((name, value)) = &self.submission_parameter {
            url.query_pairs_mut().append_pair(name, value);
        }
        Ok(url)
    }

    /// Size advisory endpoint, by form id or by external form URL.
    pub fn max_size_url(&self) -> Result<Url, SdkError> {
        match (&self.form_id, &self.xform_url) {
            (Some(id), _) => self.join(&format!("submission/max-size/{id}")),
            (None, Some(xform_url)) => {
                let mut url = self.join("submission/max-size/")?;
                url.query_pairs_mut().append_pair("xformUrl", xform_url);
                Ok(url)
            }
            (None, None) => Err(SdkError::InvalidUrl {
                url: self.relay_url.clone(),
                reason: "neither form id nor xform URL configured".to_string(),
            }),
        }
    }

    /// Instance fetch endpoint for edit flows.
    pub fn instance_url(&self, instance_id: &str) -> Result<Url, SdkError> {
        let mut url = self.join(&format!("submission/{}", self.form_id()?))?;
        url.query_pairs_mut().append_pair("instanceId", instance_id);
        Ok(url)
    }

    fn join(&self, path: &str) -> Result<Url, SdkError> {
        self.base()?.join(path).map_err(|e| SdkError::InvalidUrl {
            url: self.relay_url.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_url_with_parameter() {
        let mut config = ClientConfig::for_form("http://relay.test/base/", "abcd");
        config.submission_parameter = Some(("token".into(), "x y".into()));
        assert_eq!(
            config.submission_url().unwrap().as_str(),
            "http://relay.test/base/submission/abcd?token=x+y"
        );
    }

    #[test]
    fn test_max_size_url_falls_back_to_xform_url() {
        let config = ClientConfig {
            relay_url: "http://relay.test".into(),
            xform_url: Some("https://server.test/form.xml".into()),
            ..ClientConfig::default()
        };
        let url = config.max_size_url().unwrap();
        assert_eq!(url.path(), "/submission/max-size/");
        assert_eq!(
            url.query(),
            Some("xformUrl=https%3A%2F%2Fserver.test%2Fform.xml")
        );
    }

    #[test]
    fn test_missing_form_id() {
        let config = ClientConfig::default();
        assert!(config.submission_url().is_err());
        assert!(config.max_size_url().is_err());
    }

    #[test]
    fn test_deadline_includes_grace() {
        let config = ClientConfig::default();
        assert_eq!(config.deadline_ms(), 60_500);
    }
}
