//! Client-side error types.

use thiserror::Error;

use crate::record::UploadOutcome;

/// Errors raised while preparing a record for upload.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The record XML could not be parsed or re-serialized.
    #[error("invalid record XML: {0}")]
    Xml(String),

    /// The configured relay URL is unusable.
    #[error("invalid relay URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Request to the relay failed outright.
    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay answered with an error status.
    #[error("relay returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Planning yielded no batch at all; a record always has at least the
    /// XML-only batch.
    #[error("record produced no batches")]
    EmptyPlan,
}

/// Errors raised while transmitting a batch.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The client-side deadline expired before the batch completed.
    #[error("upload timed out after {0} ms")]
    Timeout(u64),

    /// The caller cancelled the upload.
    #[error("upload cancelled")]
    Cancelled,

    /// The relay (or upstream) refused the batch.
    #[error("submission rejected with HTTP {}", .0.status)]
    Rejected(UploadOutcome),

    /// Network failure, malformed response, or similar.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The batch could not be built.
    #[error(transparent)]
    Prepare(#[from] SdkError),
}

impl UploadError {
    /// HTTP-equivalent status for presenting the failure to a user.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Timeout(_) => Some(408),
            UploadError::Rejected(outcome) => Some(outcome.status),
            UploadError::Transport(e) => e.status().map(|s| s.as_u16()),
            UploadError::Cancelled | UploadError::Prepare(_) => None,
        }
    }
}
