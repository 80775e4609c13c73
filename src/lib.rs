//! Submission relay library.
//!
//! Accepts form submissions from clients and forwards them to the form's
//! OpenRosa server, answers size advisories, and serves cached instances
//! for edit flows.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod store;
pub mod upstream;

pub use config::RelayConfig;
pub use error::RelayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
