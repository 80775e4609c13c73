//! Whole-record upload, one batch at a time.
//!
//! # Data Flow
//! ```text
//! Record
//!     → builder::prepare_batches (planner inside)
//!     → batch 1 → BatchUploader::upload → await
//!     → batch 2 → ...                     (only after batch 1 resolved)
//!     → first failure stops the chain
//!     → result: outcome of batch 1
//! ```
//!
//! # Design Decisions
//! - Strictly sequential
//! - Each batch gets its own deadline; completed batches are unaffected by a
//!   later timeout
//! - Only the first batch's outcome is reported (see `upload_record`)
//! - Cancellation is scoped to one record; the uploader itself holds no
//!   cancellation state

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::builder::prepare_batches;
use crate::error::{SdkError, UploadError};
use crate::record::{Record, UploadOutcome};
use crate::uploader::BatchUploader;

/// Uploads complete records through a [`BatchUploader`].
#[derive(Debug, Clone)]
pub struct RecordUploader {
    uploader: BatchUploader,
    limit: u64,
    csrf_token: Option<String>,
}

impl RecordUploader {
    /// `limit` is the advised maximum submission size in bytes.
    pub fn new(uploader: BatchUploader, limit: u64) -> Self {
        Self {
            uploader,
            limit,
            csrf_token: None,
        }
    }

    pub fn with_csrf_token(mut self, token: Option<String>) -> Self {
        self.csrf_token = token;
        self
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Upload every batch of `record` in order.
    ///
    /// Returns the outcome of the first batch. Later batches' outcomes are
    /// only observed for failure.
    pub async fn upload_record(&self, record: &Record) -> Result<UploadOutcome, UploadError> {
        self.upload_record_with_cancel(record, &CancellationToken::new()).await
    }

    /// Like [`upload_record`](Self::upload_record); cancelling `cancel`
    /// aborts the batch in flight and skips the rest of this record only.
    pub async fn upload_record_with_cancel(
        &self,
        record: &Record,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        let batches = prepare_batches(record, self.limit, self.csrf_token.as_deref())?;
        let total = batches.len();
        let mut first: Option<UploadOutcome> = None;

        for (index, batch) in batches.iter().enumerate() {
            let outcome = match self.uploader.upload(batch, cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(
                        instance_id = %record.instance_id,
                        batch = index + 1,
                        total,
                        error = %e,
                        "Batch failed, remaining batches not sent"
                    );
                    return Err(e);
                }
            };

            tracing::debug!(
                instance_id = %record.instance_id,
                batch = index + 1,
                total,
                status = outcome.status,
                "Batch accepted"
            );

            if first.is_none() {
                first = Some(outcome);
            }
        }

        tracing::info!(instance_id = %record.instance_id, batches = total, "Record uploaded");

        first.ok_or_else(|| SdkError::EmptyPlan.into())
    }

    /// Remember `record` as the survey's most recent save, then upload it.
    ///
    /// The bookkeeping write completes before the network attempt starts; a
    /// failed write is logged and does not prevent the upload.
    pub async fn upload_record_with_last_saved(
        &self,
        survey_id: &str,
        record: &Record,
        store: &dyn LastSavedStore,
    ) -> Result<UploadOutcome, UploadError> {
        if let Err(e) = store.set_last_saved(survey_id, record).await {
            tracing::error!(survey_id, instance_id = %record.instance_id, error = %e, "Failed to store last-saved record");
        }
        self.upload_record(record).await
    }
}

/// Error from a [`LastSavedStore`].
#[derive(Debug, thiserror::Error)]
#[error("last-saved store: {0}")]
pub struct LastSavedError(pub String);

/// One "most recent successful save" slot per survey.
#[async_trait]
pub trait LastSavedStore: Send + Sync {
    async fn set_last_saved(&self, survey_id: &str, record: &Record) -> Result<(), LastSavedError>;

    async fn last_saved(&self, survey_id: &str) -> Result<Option<Record>, LastSavedError>;
}

/// In-process last-saved slots. Last writer wins.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLastSaved {
    slots: Arc<DashMap<String, Record>>,
}

impl InMemoryLastSaved {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LastSavedStore for InMemoryLastSaved {
    async fn set_last_saved(&self, survey_id: &str, record: &Record) -> Result<(), LastSavedError> {
        self.slots.insert(survey_id.to_string(), record.clone());
        Ok(())
    }

    async fn last_saved(&self, survey_id: &str) -> Result<Option<Record>, LastSavedError> {
        Ok(self.slots.get(survey_id).map(|r| r.value().clone()))
    }
}
