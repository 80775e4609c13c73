//! Configuration file watcher for hot reload.
//!
//! Only the form list, the submission settings and the admin key are read
//! by a running relay. A save that leaves them untouched is not forwarded,
//! so the form registry is not rebuilt for edits that need a restart anyway.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::{AdminConfig, FormConfig, RelayConfig, SubmissionConfig};

/// The part of a configuration a running relay picks up.
#[derive(Debug, Clone, PartialEq)]
struct HotSettings {
    forms: Vec<FormConfig>,
    submission: SubmissionConfig,
    admin: AdminConfig,
}

impl HotSettings {
    fn of(config: &RelayConfig) -> Self {
        Self {
            forms: config.forms.clone(),
            submission: config.submission.clone(),
            admin: config.admin.clone(),
        }
    }
}

/// Remembers the last applied settings and passes on real changes only.
#[derive(Debug)]
struct ReloadFilter {
    applied: HotSettings,
}

impl ReloadFilter {
    fn new(current: &RelayConfig) -> Self {
        Self {
            applied: HotSettings::of(current),
        }
    }

    fn accept(&mut self, candidate: &RelayConfig) -> bool {
        let settings = HotSettings::of(candidate);
        if settings == self.applied {
            return false;
        }
        self.applied = settings;
        true
    }
}

fn report_reload_error(path: &Path, err: &ConfigError) {
    match err {
        ConfigError::Validation(errors) => {
            for e in errors {
                tracing::error!(path = ?path, field = %e.field, reason = %e.message, "Invalid config value");
            }
            tracing::error!(
                errors = errors.len(),
                "Reloaded config failed validation, keeping current configuration"
            );
        }
        other => {
            tracing::error!(path = ?path, error = %other, "Failed to reload config, keeping current configuration");
        }
    }
}

/// Monitors the configuration file and emits validated configurations.
pub struct ConfigWatcher {
    path: PathBuf,
    filter: ReloadFilter,
    update_tx: mpsc::UnboundedSender<RelayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    /// `current` is the configuration the relay starts with.
    pub fn new(path: &Path, current: &RelayConfig) -> (Self, mpsc::UnboundedReceiver<RelayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                filter: ReloadFilter::new(current),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut filter,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => match load_config(&path) {
                    Ok(config) if filter.accept(&config) => {
                        tracing::info!(path = ?path, forms = config.forms.len(), "Config change detected, reloading");
                        let _ = update_tx.send(config);
                    }
                    Ok(_) => {
                        tracing::debug!(path = ?path, "Config saved without reloadable changes");
                    }
                    Err(e) => report_reload_error(&path, &e),
                },
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}
