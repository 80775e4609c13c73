//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → shared via ArcSwap with the HTTP handlers
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → unchanged forms and submission settings: dropped
//!     → atomic swap of the live RelayConfig, form registry reloaded
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Listener, storage and credential settings are read once at startup
//! - The route base path is mounted at startup; later changes only affect
//!   generated media URLs

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, FormConfig, ListenerConfig, ObservabilityConfig, RelayConfig, SubmissionConfig,
    TlsConfig,
};
pub use watcher::ConfigWatcher;
