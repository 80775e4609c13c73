//! Single-batch transmission with a wall-clock deadline.
//!
//! # Responsibilities
//! - POST one prepared batch to the relay
//! - Abort the whole exchange (not just connect) once the deadline passes
//! - Classify the result: accepted, rejected, timed out, transport failure
//!
//! # Design Decisions
//! - No retries here; the caller (or the person holding the device) decides
//! - Dropping the in-flight future releases any partially sent body
//! - Timeout and cancellation are distinct from generic transport errors

use std::sync::Arc;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::builder::PreparedBatch;
use crate::config::ClientConfig;
use crate::error::UploadError;
use crate::record::UploadOutcome;

pub const OPENROSA_VERSION_HEADER: &str = "X-OpenRosa-Version";
pub const INSTANCE_ID_HEADER: &str = "X-OpenRosa-Instance-Id";
pub const DEPRECATED_ID_HEADER: &str = "X-OpenRosa-Deprecated-Id";

/// Transmits prepared batches to the relay.
#[derive(Debug, Clone)]
pub struct BatchUploader {
    client: Client,
    config: Arc<ClientConfig>,
}

impl BatchUploader {
    pub fn new(client: Client, config: Arc<ClientConfig>) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send one batch. Resolves once the relay has answered in full, the
    /// deadline has passed, or `cancel` fires.
    pub async fn upload(
        &self,
        batch: &PreparedBatch,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        let url = self.config.submission_url()?;
        let form = batch.to_form()?;

        let mut request = self
            .client
            .post(url)
            .header(OPENROSA_VERSION_HEADER, "1.0")
            .header(INSTANCE_ID_HEADER, batch.instance_id.as_str())
            .multipart(form);
        if let Some(deprecated_id) = &batch.deprecated_id {
            request = request.header(DEPRECATED_ID_HEADER, deprecated_id.as_str());
        }

        let deadline_ms = self.config.deadline_ms();
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(instance_id = %batch.instance_id, "Batch upload cancelled");
                return Err(UploadError::Cancelled);
            }
            result = tokio::time::timeout(Duration::from_millis(deadline_ms), exchange) => match result {
                Ok(exchanged) => exchanged?,
                Err(_) => {
                    tracing::warn!(instance_id = %batch.instance_id, deadline_ms, "Batch upload timed out");
                    return Err(UploadError::Timeout(deadline_ms));
                }
            },
        };

        tracing::debug!(
            instance_id = %batch.instance_id,
            status = status.as_u16(),
            files = batch.files.len(),
            "Batch upload finished"
        );

        classify(status, &body, batch)
    }
}

fn classify(status: StatusCode, body: &str, batch: &PreparedBatch) -> Result<UploadOutcome, UploadError> {
    let mut outcome = UploadOutcome {
        status: status.as_u16(),
        failed_files: batch.failed_files.to_vec(),
        message: None,
    };

    if outcome.is_accepted() {
        return Ok(outcome);
    }

    outcome.message = if status == StatusCode::BAD_REQUEST {
        // generic status, the server's own message is more useful
        openrosa_message(body)
    } else {
        status_message(status).map(str::to_string)
    };

    Err(UploadError::Rejected(outcome))
}

fn status_message(status: StatusCode) -> Option<&'static str> {
    match status.as_u16() {
        401 => Some("Authentication required to submit this form."),
        403 => Some("Not allowed to submit to this form."),
        404 => Some("Submission endpoint not found."),
        405 => Some("Submission method not allowed."),
        408 => Some("The submission timed out."),
        413 => Some("Submission too large for the server."),
        500..=599 => Some("The server could not process the submission."),
        _ => None,
    }
}

/// Text of `OpenRosaResponse > message`, if the body carries one.
pub fn openrosa_message(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut message = String::new();
    let mut found = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => path.push(start.local_name().as_ref().to_vec()),
            Ok(Event::End(_)) => {
                if in_message(&path) {
                    found = true;
                }
                path.pop();
            }
            Ok(Event::Text(text)) if in_message(&path) => {
                message.push_str(&text.unescape().ok()?);
            }
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
        if found {
            break;
        }
    }

    let message = message.trim();
    (found && !message.is_empty()).then(|| message.to_string())
}

fn in_message(path: &[Vec<u8>]) -> bool {
    matches!(path, [.., parent, child] if parent == b"OpenRosaResponse" && child == b"message")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::prepare_batches;
    use crate::record::{Attachment, Record};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn batch() -> PreparedBatch {
        let record = Record::new("uuid:42", r#"<data><p type="file">p.jpg</p><q type="file">gone.jpg</q></data>"#)
            .with_deprecated_id("uuid:41")
            .with_file(Attachment::new("p.jpg", b"jpegbytes".to_vec()));
        prepare_batches(&record, 1000, None).unwrap().remove(0)
    }

    fn uploader(server: &MockServer, timeout_ms: u64) -> BatchUploader {
        let mut config = ClientConfig::for_form(server.uri(), "abcd");
        config.timeout_ms = timeout_ms;
        config.grace_ms = 0;
        BatchUploader::new(Client::new(), Arc::new(config))
    }

    #[test]
    fn test_openrosa_message() {
        let body = r#"<OpenRosaResponse xmlns="http://openrosa.org/http/response"><message nature="error">Form is closed</message></OpenRosaResponse>"#;
        assert_eq!(openrosa_message(body).as_deref(), Some("Form is closed"));
        assert_eq!(openrosa_message("<html><message>x</message></html>"), None);
        assert_eq!(openrosa_message("not xml at all"), None);
    }

    #[tokio::test]
    async fn test_accepted_batch_carries_failed_files() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submission/abcd"))
            .and(header(INSTANCE_ID_HEADER, "uuid:42"))
            .and(header(DEPRECATED_ID_HEADER, "uuid:41"))
            .and(header(OPENROSA_VERSION_HEADER, "1.0"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = uploader(&server, 5_000)
            .upload(&batch(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.status, 201);
        assert_eq!(outcome.failed_files, vec!["gone.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_bad_request_message_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                "<OpenRosaResponse><message>Duplicate instance</message></OpenRosaResponse>",
            ))
            .mount(&server)
            .await;

        let err = uploader(&server, 5_000)
            .upload(&batch(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            UploadError::Rejected(outcome) => {
                assert_eq!(outcome.status, 400);
                assert_eq!(outcome.message.as_deref(), Some("Duplicate instance"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_relay_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let err = uploader(&server, 200)
            .upload(&batch(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Timeout(200)));
        assert_eq!(err.status(), Some(408));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = uploader(&server, 10_000).upload(&batch(), &cancel).await.unwrap_err();
        assert!(matches!(err, UploadError::Cancelled));
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_transport_error() {
        let mut config = ClientConfig::for_form("http://127.0.0.1:9", "abcd");
        config.timeout_ms = 5_000;
        let uploader = BatchUploader::new(Client::new(), Arc::new(config));
        let err = uploader.upload(&batch(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, UploadError::Transport(_)));
    }
}
