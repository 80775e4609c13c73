//! Client SDK for the submission relay.
//!
//! # Data Flow
//! ```text
//! RelayClient::max_submission_size   (size advisory, clamped)
//!     → RecordUploader::upload_record
//!         → builder::prepare_batches → planner::divide_into_batches
//!         → BatchUploader::upload (one batch at a time)
//!     → UploadOutcome of the first batch
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod planner;
pub mod record;
pub mod record_uploader;
pub mod uploader;

pub use builder::{prepare_batches, PreparedBatch};
pub use client::RelayClient;
pub use config::{ClientConfig, ABSOLUTE_MAX_SIZE};
pub use error::{SdkError, UploadError};
pub use planner::divide_into_batches;
pub use record::{Attachment, Record, UploadOutcome};
pub use record_uploader::{InMemoryLastSaved, LastSavedStore, RecordUploader};
pub use uploader::BatchUploader;
pub use tokio_util::sync::CancellationToken;
