//! Relay error type and its JSON rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Survey not found.")]
    SurveyNotFound,

    #[error("Survey is not active.")]
    SurveyInactive,

    #[error("{0}")]
    BadRequest(String),

    #[error("Record not present. It may have expired.")]
    InstanceNotFound,

    #[error("Instance doesn't belong to this form")]
    InstanceMismatch,

    #[error("Not allowed")]
    NotAllowed,

    #[error("Not found")]
    NotFound,

    /// The upstream could not be reached.
    #[error("Upstream connection failed: {0}")]
    GatewayTimeout(String),

    /// The upstream was reached but the exchange stalled or broke off.
    #[error("Upstream transfer failed: {0}")]
    RequestTimeout(String),

    /// The caller's body crossed the size limit after forwarding began.
    #[error("Submission too large.")]
    PayloadTooLarge,

    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::SurveyNotFound | RelayError::SurveyInactive | RelayError::InstanceNotFound => {
                StatusCode::NOT_FOUND
            }
            RelayError::NotFound => StatusCode::NOT_FOUND,
            RelayError::BadRequest(_) | RelayError::InstanceMismatch => StatusCode::BAD_REQUEST,
            RelayError::NotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            RelayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Upstream { status, .. } => *status,
            RelayError::Store(_) | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_body() {
        let response = RelayError::InstanceMismatch.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 400);
        assert_eq!(body["message"], "Instance doesn't belong to this form");
    }

    #[test]
    fn test_fault_statuses() {
        assert_eq!(RelayError::GatewayTimeout("refused".into()).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(RelayError::RequestTimeout("reset".into()).status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            RelayError::Upstream {
                status: StatusCode::UNAUTHORIZED,
                message: "x".into()
            }
            .status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
