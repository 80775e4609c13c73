//! Requests to OpenRosa servers.
//!
//! # Responsibilities
//! - Build submission URLs for a survey's server
//! - Derive the `Authorization` header for a caller's credentials
//! - Ask a server for its maximum accepted submission size
//! - Forward prepared requests with a deadline
//!
//! # Design Decisions
//! - One pooled hyper client shared by every request
//! - Every upstream request carries `X-OpenRosa-Version` and `Date`
//! - No retries; callers own that decision

use std::time::{Duration, SystemTime};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::error::RelayError;
use crate::resilience::timeouts::{with_deadline, FaultKind, UpstreamFault};
use crate::store::Credentials;
use crate::upstream::auth;

pub const OPENROSA_VERSION_HEADER: &str = "x-openrosa-version";
pub const OPENROSA_VERSION: &str = "1.0";
pub const ACCEPT_CONTENT_LENGTH_HEADER: &str = "x-openrosa-accept-content-length";
pub const CONTENT_LENGTH_HEADER: &str = "x-openrosa-content-length";

/// `server` + `/submission`, adding the separator when missing.
pub fn submission_url(server: &str) -> String {
    let separator = if server.ends_with('/') { "" } else { "/" };
    format!("{server}{separator}submission")
}

/// Submission URL with the optional passthrough query parameter appended.
pub fn forwarding_url(server: &str, passthrough: Option<(&str, &str)>) -> Result<Uri, RelayError> {
    let mut url = Url::parse(&submission_url(server))
        .map_err(|e| RelayError::Internal(format!("invalid server url {server:?}: {e}")))?;
    if let Some((name, value)) = passthrough {
        url.query_pairs_mut().append_pair(name, value);
    }
    to_uri(&url)
}

pub fn to_uri(url: &Url) -> Result<Uri, RelayError> {
    url.as_str()
        .parse::<Uri>()
        .map_err(|e| RelayError::Internal(format!("invalid upstream uri {url}: {e}")))
}

/// Current time as an HTTP date header value.
pub fn date_header() -> HeaderValue {
    // RFC 7231 dates are plain ASCII
    HeaderValue::from_str(&httpdate::fmt_http_date(SystemTime::now()))
        .unwrap_or_else(|_| HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"))
}

/// Size advertised by an OpenRosa `HEAD` response, if any.
pub fn advertised_max_size(headers: &HeaderMap) -> Option<u64> {
    [ACCEPT_CONTENT_LENGTH_HEADER, CONTENT_LENGTH_HEADER]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.trim().parse::<u64>().ok())
        .find(|size| *size > 0)
}

/// Shared upstream client.
#[derive(Clone)]
pub struct Communicator {
    client: Client<HttpConnector, Body>,
    head_timeout: Duration,
}

impl Communicator {
    pub fn new(connect_timeout: Duration, head_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client, head_timeout }
    }

    /// Send `request` upstream; resolves once the response head arrives.
    pub async fn forward(
        &self,
        request: Request<Body>,
        deadline: Duration,
    ) -> Result<Response<Incoming>, UpstreamFault> {
        with_deadline(deadline, self.client.request(request)).await
    }

    /// `Authorization` value for `credentials` against `url`.
    ///
    /// User/password credentials require an unauthenticated HEAD to learn
    /// which scheme the server wants.
    pub async fn authorization(
        &self,
        url: &Uri,
        method: &Method,
        credentials: Option<&Credentials>,
    ) -> Result<Option<HeaderValue>, UpstreamFault> {
        let (user, pass) = match credentials {
            None => return Ok(None),
            Some(Credentials::Bearer(token)) => return Ok(header_value(format!("Bearer {token}"))),
            Some(Credentials::UserPass { user, pass }) => (user, pass),
        };

        let unauthenticated = self.head(url, None).await?;
        if unauthenticated.status() != StatusCode::UNAUTHORIZED {
            return Ok(None);
        }

        let challenge = unauthenticated
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(auth::parse_challenge);

        let value = match challenge {
            Some(challenge) if challenge.scheme == "digest" => {
                let uri = url.path_and_query().map(|p| p.as_str()).unwrap_or("/");
                let cnonce = uuid::Uuid::new_v4().simple().to_string();
                auth::digest(&challenge, user, pass, method.as_str(), uri, &cnonce)
            }
            Some(challenge) if challenge.scheme == "basic" => Some(auth::basic(user, pass)),
            other => {
                tracing::debug!(challenge = ?other, "Unsupported upstream auth challenge");
                None
            }
        };

        Ok(value.and_then(header_value))
    }

    /// Maximum submission size the server at `url` accepts.
    pub async fn max_size(
        &self,
        url: &Uri,
        credentials: Option<&Credentials>,
        default: u64,
    ) -> Result<u64, RelayError> {
        let authorization = self.authorization(url, &Method::HEAD, credentials).await?;
        let response = self.head(url, authorization).await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(RelayError::Upstream {
                status: StatusCode::UNAUTHORIZED,
                message: "Forbidden. Authorization Required.".to_string(),
            }),
            status if !status.is_success() => Err(RelayError::Upstream {
                status,
                message: format!("Request to {url} failed."),
            }),
            _ => Ok(advertised_max_size(response.headers()).unwrap_or(default)),
        }
    }

    async fn head(
        &self,
        url: &Uri,
        authorization: Option<HeaderValue>,
    ) -> Result<Response<Incoming>, UpstreamFault> {
        let mut builder = Request::builder()
            .method(Method::HEAD)
            .uri(url.clone())
            .header(OPENROSA_VERSION_HEADER, OPENROSA_VERSION)
            .header(header::DATE, date_header());
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let request = builder.body(Body::empty()).map_err(|e| UpstreamFault {
            kind: FaultKind::Other,
            detail: e.to_string(),
        })?;

        with_deadline(self.head_timeout, self.client.request(request)).await
    }
}

fn header_value(value: String) -> Option<HeaderValue> {
    HeaderValue::from_str(&value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_url() {
        assert_eq!(submission_url("http://odk.test"), "http://odk.test/submission");
        assert_eq!(submission_url("http://odk.test/agg/"), "http://odk.test/agg/submission");
    }

    #[test]
    fn test_forwarding_url_passthrough() {
        let uri = forwarding_url("http://odk.test", Some(("deviceID", "a b&c"))).unwrap();
        assert_eq!(uri.to_string(), "http://odk.test/submission?deviceID=a+b%26c");
        let uri = forwarding_url("http://odk.test/", None).unwrap();
        assert_eq!(uri.to_string(), "http://odk.test/submission");
    }

    #[test]
    fn test_advertised_max_size() {
        let mut headers = HeaderMap::new();
        assert_eq!(advertised_max_size(&headers), None);

        headers.insert(CONTENT_LENGTH_HEADER, HeaderValue::from_static("1000"));
        assert_eq!(advertised_max_size(&headers), Some(1000));

        headers.insert(ACCEPT_CONTENT_LENGTH_HEADER, HeaderValue::from_static("2000"));
        assert_eq!(advertised_max_size(&headers), Some(2000));

        headers.insert(ACCEPT_CONTENT_LENGTH_HEADER, HeaderValue::from_static("lots"));
        assert_eq!(advertised_max_size(&headers), Some(1000));
    }

    #[test]
    fn test_date_header_is_http_date() {
        let value = date_header();
        assert!(httpdate::parse_http_date(value.to_str().unwrap()).is_ok());
    }
}
