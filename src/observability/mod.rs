//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! submission / max-size / instance handlers, upstream faults, bookkeeping
//!     → logging.rs (tracing events keyed by request_id, form_id, instance_id)
//!     → metrics.rs (request, submission and fault counters)
//!
//! Exposed as:
//!     → stdout (fmt layer)
//!     → Prometheus scrape endpoint, when enabled
//! ```

pub mod logging;
pub mod metrics;
