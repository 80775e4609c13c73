//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, OpenRosa headers)
//!     → submission.rs / max_size.rs / instance.rs
//!     → response.rs (header rewrite, streaming)
//!     → Send to client
//! ```

pub mod instance;
pub mod max_size;
pub mod request;
pub mod response;
pub mod server;
pub mod submission;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
