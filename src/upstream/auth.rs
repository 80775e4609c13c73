//! `Authorization` header construction from an upstream challenge.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: String,
    pub params: HashMap<String, String>,
}

/// Parse the first challenge in a `WWW-Authenticate` value.
pub fn parse_challenge(value: &str) -> Option<Challenge> {
    let value = value.trim();
    let (scheme, rest) = match value.split_once(char::is_whitespace) {
        Some((scheme, rest)) => (scheme, rest),
        None => (value, ""),
    };
    if scheme.is_empty() {
        return None;
    }

    let mut params = HashMap::new();
    for part in split_params(rest) {
        if let Some((key, val)) = part.split_once('=') {
            let val = val.trim();
            let val = val
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(val);
            params.insert(key.trim().to_ascii_lowercase(), val.to_string());
        }
    }

    Some(Challenge {
        scheme: scheme.to_ascii_lowercase(),
        params,
    })
}

/// Split on commas outside quoted strings.
fn split_params(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(input[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = input[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

pub fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// RFC 2617 digest response. `cnonce` is only used when the challenge
/// offers `qop=auth`.
pub fn digest(
    challenge: &Challenge,
    user: &str,
    pass: &str,
    method: &str,
    uri: &str,
    cnonce: &str,
) -> Option<String> {
    let realm = challenge.params.get("realm").map(String::as_str).unwrap_or("");
    let nonce = challenge.params.get("nonce")?;
    let qop_auth = challenge
        .params
        .get("qop")
        .map(|q| q.split(',').any(|v| v.trim() == "auth"))
        .unwrap_or(false);

    let ha1 = md5_hex(&format!("{user}:{realm}:{pass}"));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    const NC: &str = "00000001";

    let response = if qop_auth {
        md5_hex(&format!("{ha1}:{nonce}:{NC}:{cnonce}:auth:{ha2}"))
    } else {
        md5_hex(&format!("{ha1}:{nonce}:{ha2}"))
    };

    let mut header = format!(
        r#"Digest username="{user}", realm="{realm}", nonce="{nonce}", uri="{uri}", response="{response}""#
    );
    if qop_auth {
        header.push_str(&format!(r#", qop=auth, nc={NC}, cnonce="{cnonce}""#));
    }
    if let Some(opaque) = challenge.params.get("opaque") {
        header.push_str(&format!(r#", opaque="{opaque}""#));
    }
    if let Some(algorithm) = challenge.params.get("algorithm") {
        header.push_str(&format!(", algorithm={algorithm}"));
    }
    Some(header)
}
