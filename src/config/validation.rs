//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (unique form ids, parseable upstream URLs)
//! - Validate value ranges (timeouts > 0, body limit within the ceiling)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{RelayConfig, ABSOLUTE_MAX_SIZE, PLACEHOLDER_API_KEY};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.trim().is_empty() || tls.key_path.trim().is_empty() {
            errors.push(ValidationError::new("listener.tls", "cert_path and key_path are required"));
        }
    }

    let mut seen = HashSet::new();
    for (i, form) in config.forms.iter().enumerate() {
        let field = format!("forms[{i}]");
        if form.id.trim().is_empty() {
            errors.push(ValidationError::new(format!("{field}.id"), "must not be empty"));
        } else if !seen.insert(form.id.as_str()) {
            errors.push(ValidationError::new(format!("{field}.id"), format!("duplicate form id {:?}", form.id)));
        }
        match Url::parse(&form.server_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::new(
                format!("{field}.server_url"),
                format!("unsupported scheme {:?}", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(format!("{field}.server_url"), e.to_string())),
        }
        if form.open_rosa_id.trim().is_empty() {
            errors.push(ValidationError::new(format!("{field}.open_rosa_id"), "must not be empty"));
        }
    }

    if config.submission.timeout_ms == 0 {
        errors.push(ValidationError::new("submission.timeout_ms", "must be greater than zero"));
    }
    let base = &config.submission.base_path;
    if !base.is_empty() && (!base.starts_with('/') || base.ends_with('/')) {
        errors.push(ValidationError::new(
            "submission.base_path",
            "must be empty or start with '/' and have no trailing '/'",
        ));
    }
    if let Some(param) = &config.submission.query_parameter {
        if param.trim().is_empty() {
            errors.push(ValidationError::new("submission.query_parameter", "must not be blank"));
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than zero"));
    }
    if config.timeouts.head_secs == 0 {
        errors.push(ValidationError::new("timeouts.head_secs", "must be greater than zero"));
    }

    if config.credentials.cookie_name.trim().is_empty() {
        errors.push(ValidationError::new("credentials.cookie_name", "must not be empty"));
    }

    if config.security.max_body_size == 0 || config.security.max_body_size > ABSOLUTE_MAX_SIZE {
        errors.push(ValidationError::new(
            "security.max_body_size",
            format!("must be between 1 and {ABSOLUTE_MAX_SIZE}"),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() || config.admin.api_key == PLACEHOLDER_API_KEY {
            errors.push(ValidationError::new("admin.api_key", "set a real key before enabling the admin API"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
