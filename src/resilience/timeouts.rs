//! Upstream fault classification.
//!
//! # Responsibilities
//! - Bound every upstream exchange with a deadline
//! - Tell "never connected" apart from "connected but stalled or broken"
//!
//! # Design Decisions
//! - Connect faults map to 504 Gateway Timeout
//! - Faults during an established transfer, and deadline expiry, map to
//!   408 Request Timeout
//! - A caller body cut off by the size limit mid-forward maps to 413
//! - Anything else is a generic 500

use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::time::Duration;

use http_body_util::LengthLimitError;

use crate::error::RelayError;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Connect,
    Transfer,
    /// The caller's body crossed the size limit while streaming upstream.
    TooLarge,
    Other,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Connect => "connect",
            FaultKind::Transfer => "transfer",
            FaultKind::TooLarge => "too_large",
            FaultKind::Other => "other",
        }
    }
}

/// A failed upstream exchange.
#[derive(Debug, thiserror::Error)]
#[error("{detail}")]
pub struct UpstreamFault {
    pub kind: FaultKind,
    pub detail: String,
}

impl UpstreamFault {
    pub fn deadline(deadline: Duration) -> Self {
        Self {
            kind: FaultKind::Transfer,
            detail: format!("no response within {}ms", deadline.as_millis()),
        }
    }
}

impl From<hyper_util::client::legacy::Error> for UpstreamFault {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        Self {
            kind: classify(&err),
            detail: describe(&err),
        }
    }
}

impl From<UpstreamFault> for RelayError {
    fn from(fault: UpstreamFault) -> Self {
        metrics::record_upstream_fault(fault.kind.as_str());
        match fault.kind {
            FaultKind::Connect => RelayError::GatewayTimeout(fault.detail),
            FaultKind::Transfer => RelayError::RequestTimeout(fault.detail),
            FaultKind::TooLarge => RelayError::PayloadTooLarge,
            FaultKind::Other => RelayError::Internal(fault.detail),
        }
    }
}

/// Run `fut` with a deadline, turning expiry into a transfer fault.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, UpstreamFault>
where
    F: Future<Output = Result<T, hyper_util::client::legacy::Error>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(UpstreamFault::from),
        Err(_) => Err(UpstreamFault::deadline(deadline)),
    }
}

pub fn classify(err: &hyper_util::client::legacy::Error) -> FaultKind {
    if err.is_connect() {
        return FaultKind::Connect;
    }
    if exceeded_body_limit(err) {
        return FaultKind::TooLarge;
    }

    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if is_transfer_io(io_err.kind()) {
                return FaultKind::Transfer;
            }
        }
        if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message()
                || hyper_err.is_canceled()
                || hyper_err.is_closed()
                || hyper_err.is_timeout()
            {
                return FaultKind::Transfer;
            }
        }
        source = cause.source();
    }

    FaultKind::Other
}

/// The limit error sits under hyper's body error, so it is looked for
/// before the hyper flags are read.
fn exceeded_body_limit(err: &(dyn StdError + 'static)) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return true;
        }
        source = cause.source();
    }
    false
}

fn is_transfer_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
    )
}

fn describe(err: &hyper_util::client::legacy::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_mapping() {
        let connect: RelayError = UpstreamFault {
            kind: FaultKind::Connect,
            detail: "refused".into(),
        }
        .into();
        assert_eq!(connect.status().as_u16(), 504);

        let stalled: RelayError = UpstreamFault::deadline(Duration::from_millis(1500)).into();
        assert_eq!(stalled.status().as_u16(), 408);
        assert!(stalled.to_string().contains("1500ms"));

        let other: RelayError = UpstreamFault {
            kind: FaultKind::Other,
            detail: "?".into(),
        }
        .into();
        assert_eq!(other.status().as_u16(), 500);

        let too_large: RelayError = UpstreamFault {
            kind: FaultKind::TooLarge,
            detail: "error from user's Body stream: length limit exceeded".into(),
        }
        .into();
        assert_eq!(too_large.status().as_u16(), 413);
        assert!(!too_large.to_string().contains("Body stream"));
    }

    #[derive(Debug, thiserror::Error)]
    #[error("body write failed")]
    struct BodyWrite(#[source] Box<dyn StdError + Send + Sync>);

    #[derive(Debug, thiserror::Error)]
    #[error("send failed")]
    struct SendFailed(#[source] BodyWrite);

    #[tokio::test]
    async fn test_limit_error_found_under_wrappers() {
        use http_body_util::{BodyExt, Full, Limited};

        let limited = Limited::new(Full::new(&b"0123456789"[..]), 4);
        let cause = limited.collect().await.unwrap_err();
        let cut_off = SendFailed(BodyWrite(cause));
        assert!(exceeded_body_limit(&cut_off));

        let broken = SendFailed(BodyWrite(Box::new(io::Error::from(io::ErrorKind::BrokenPipe))));
        assert!(!exceeded_body_limit(&broken));
    }

    #[tokio::test]
    async fn test_with_deadline_expires() {
        let result: Result<(), UpstreamFault> = with_deadline(Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result.unwrap_err().kind, FaultKind::Transfer);
    }
}
