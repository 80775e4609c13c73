//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (deadline, fault classification)
//!     → RelayError with 504 / 408 / 500
//! ```
//!
//! # Design Decisions
//! - Every upstream call has a deadline
//! - The relay is single-shot: no retries, no circuit breaking

pub mod timeouts;
