//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Open the local stores (submission log, instance cache)
//! - Assemble the HTTP server around them
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners are bound by the caller, after everything else is ready

use std::path::Path;
use std::sync::Arc;

use crate::config::{load_config, ConfigError, RelayConfig};
use crate::http::HttpServer;
use crate::store::{MemoryInstanceStore, MemorySubmissionLog, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Configuration from `path`, or defaults when no path is given.
pub fn load(path: Option<&Path>) -> Result<RelayConfig, StartupError> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => {
            tracing::warn!("No configuration file given, using defaults (no forms)");
            Ok(RelayConfig::default())
        }
    }
}

/// The server plus the submission log it writes to, so the caller can
/// persist the log on exit.
pub struct Assembled {
    pub server: HttpServer,
    pub submission_log: Arc<MemorySubmissionLog>,
}

pub fn assemble(config: RelayConfig) -> Result<Assembled, StartupError> {
    let submission_log = Arc::new(match &config.storage.submission_log_path {
        Some(path) => MemorySubmissionLog::load_from_file(path)?,
        None => MemorySubmissionLog::new(None),
    });

    let instances = match &config.storage.instance_cache_path {
        Some(path) => MemoryInstanceStore::load_from_file(path)?,
        None => MemoryInstanceStore::new(),
    };

    let server = HttpServer::new(config)
        .with_submission_log(submission_log.clone())
        .with_instance_store(Arc::new(instances));

    Ok(Assembled {
        server,
        submission_log,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_path() {
        let config = load(None).unwrap();
        assert!(config.forms.is_empty());
    }

    #[test]
    fn test_assemble_with_missing_log_file() {
        let mut config = RelayConfig::default();
        let path = std::env::temp_dir().join(format!("relay-absent-{}.json", uuid::Uuid::new_v4()));
        config.storage.submission_log_path = Some(path.to_string_lossy().into_owned());

        let assembled = assemble(config).unwrap();
        assert!(assembled.submission_log.is_empty());
    }
}
