//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section has defaults so a minimal file only lists its forms.

use serde::{Deserialize, Serialize};

/// Absolute ceiling on a single submission, in bytes.
pub const ABSOLUTE_MAX_SIZE: usize = 100 * 1000 * 1000;

/// Root configuration for the submission relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Forms the relay accepts submissions for.
    pub forms: Vec<FormConfig>,

    /// Submission forwarding settings.
    pub submission: SubmissionConfig,

    /// Upstream timeouts.
    pub timeouts: TimeoutConfig,

    /// Caller credential resolution.
    pub credentials: CredentialsConfig,

    /// Local bookkeeping persistence.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8005").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8005".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// A form served by the relay.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FormConfig {
    /// Public form identifier used in relay URLs.
    pub id: String,

    /// Base URL of the OpenRosa server owning the form.
    pub server_url: String,

    /// Form id as known to the OpenRosa server.
    pub open_rosa_id: String,

    /// Inactive forms reject all traffic.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Submission forwarding settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Name of the single inbound query parameter passed through to the
    /// upstream submission URL.
    pub query_parameter: Option<String>,

    /// Request timeout in milliseconds. The relay allows 500ms on top.
    pub timeout_ms: u64,

    /// Path prefix all relay routes are mounted under ("" or "/prefix").
    pub base_path: String,

    /// Advised size when the upstream does not announce one.
    pub default_max_size: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            query_parameter: None,
            timeout_ms: 300_000,
            base_path: String::new(),
            default_max_size: 5 * 1024 * 1024,
        }
    }
}

impl SubmissionConfig {
    /// Overall upstream deadline for one forwarded submission.
    pub fn deadline_ms(&self) -> u64 {
        self.timeout_ms.saturating_add(500)
    }
}

/// Timeout configuration for upstream operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Deadline for auxiliary upstream HEAD requests (auth challenge, max-size).
    pub head_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            head_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Cookie holding base64-encoded JSON credentials.
    pub cookie_name: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            cookie_name: "__relay_credentials".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file the submission log is loaded from and saved to.
    pub submission_log_path: Option<String>,

    /// JSON file of cached instances served to edit flows.
    pub instance_cache_path: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8006".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: ABSOLUTE_MAX_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [[forms]]
            id = "abcd"
            server_url = "http://odk.test"
            open_rosa_id = "household"
            "#,
        )
        .unwrap();

        assert_eq!(config.forms.len(), 1);
        assert!(config.forms[0].active);
        assert_eq!(config.submission.timeout_ms, 300_000);
        assert_eq!(config.submission.deadline_ms(), 300_500);
        assert_eq!(config.security.max_body_size, ABSOLUTE_MAX_SIZE);
        assert!(config.submission.query_parameter.is_none());
    }

    #[test]
    fn test_full_sections() {
        let config: RelayConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [submission]
            query_parameter = "deviceID"
            timeout_ms = 1000
            base_path = "/relay"

            [admin]
            enabled = true
            api_key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.submission.query_parameter.as_deref(), Some("deviceID"));
        assert_eq!(config.submission.base_path, "/relay");
        assert_eq!(config.submission.default_max_size, 5 * 1024 * 1024);
        assert!(config.admin.enabled);
    }
}
