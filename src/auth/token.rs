//! Session token decoding
//!
//! Tokens are JWT-shaped: `header.payload.signature`, each segment base64url.
//! Only the payload is read.

use super::types::{Credential, Role};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use thiserror::Error;

/// Token parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed token: expected three dot-separated segments")]
    Shape,

    #[error("Malformed token payload encoding: {0}")]
    Encoding(String),

    #[error("Malformed token payload: {0}")]
    Payload(String),

    #[error("Unknown role in token: {0}")]
    UnknownRole(String),
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    role: String,
    #[serde(default)]
    exp: Option<f64>,
    #[serde(default)]
    iat: Option<f64>,
    #[serde(default)]
    sub: Option<serde_json::Value>,
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    email: Option<String>,
}

/// Parse a raw token into a credential
///
/// Total over all inputs: every failure is a `ParseError`, never a panic.
pub fn parse_credential(raw: &str) -> Result<Credential, ParseError> {
    let raw = raw.trim();
    let segments: Vec<&str> = raw.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(ParseError::Shape);
    }

    // Some issuers keep the padding
    let payload = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| ParseError::Encoding(e.to_string()))?;

    let claims: RawClaims =
        serde_json::from_slice(&bytes).map_err(|e| ParseError::Payload(e.to_string()))?;

    let role = Role::from_str(&claims.role).ok_or(ParseError::UnknownRole(claims.role))?;

    Ok(Credential {
        raw: raw.to_string(),
        role,
        exp: claims.exp.map(|e| e.floor() as i64),
        iat: claims.iat.map(|i| i.floor() as i64),
        subject: claims.sub.or(claims.id).map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }),
        email: claims.email,
    })
}

/// Build an unsigned token with the given payload (test helper)
#[cfg(test)]
pub(crate) fn encode_test_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    format!("{}.{}.signature", header, body)
}
