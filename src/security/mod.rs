//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (body size ceiling)
//!     → headers.rs (strip hop-by-hop and caller secrets)
//!     → forwarded upstream
//! ```

pub mod headers;
pub mod limits;
