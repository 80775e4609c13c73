//! Credentials carried by the caller in a cookie.

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde::Deserialize;

use crate::store::CredentialResolver;

/// Auth material for the upstream server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    UserPass { user: String, pass: String },
    Bearer(String),
}

#[derive(Deserialize)]
struct CookieCredentialsBody {
    user: Option<String>,
    pass: Option<String>,
    bearer: Option<String>,
}

/// Reads credentials from a base64 JSON cookie
/// (`{"user": .., "pass": ..}` or `{"bearer": ..}`).
#[derive(Debug, Clone)]
pub struct CookieCredentials {
    cookie_name: String,
}

impl CookieCredentials {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }

    fn cookie_value<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.trim_matches('"'))
    }
}

impl CredentialResolver for CookieCredentials {
    fn resolve(&self, headers: &HeaderMap) -> Option<Credentials> {
        let raw = self.cookie_value(headers)?;
        let decoded = STANDARD.decode(raw).or_else(|_| URL_SAFE.decode(raw)).ok()?;
        let body: CookieCredentialsBody = match serde_json::from_slice(&decoded) {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed credentials cookie");
                return None;
            }
        };

        if let Some(token) = body.bearer.filter(|t| !t.is_empty()) {
            return Some(Credentials::Bearer(token));
        }
        match (body.user, body.pass) {
            (Some(user), Some(pass)) if !user.is_empty() => Some(Credentials::UserPass { user, pass }),
            _ => None,
        }
    }
}
