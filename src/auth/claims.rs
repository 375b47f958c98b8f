//! Display-only decoding of access token claims
//!
//! Access tokens are JWS compact strings (`header.payload.signature`).  This
//! module decodes the payload segment as base64url JSON so the console can
//! show who is signed in.  The signature is NOT verified: the token's
//! authority comes from the authorization server, and nothing decoded here is
//! used for an access decision.
//!
//! Decoding is expected to fail sometimes (opaque tokens, test doubles), so
//! failure is a typed [`DecodeError`] rather than a panic.

use base64::Engine as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

/// Why a token's claims could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The token has fewer than two dot-separated segments.
    #[error("token has no payload segment")]
    MissingPayload,

    /// The payload segment is not valid base64url.
    #[error("payload is not base64url: {0}")]
    Base64(String),

    /// The payload decoded but is not a JSON object.
    #[error("payload is not a JSON object: {0}")]
    Json(String),
}

/// Identity claims the console cares about.
///
/// Unknown claims are ignored.  Every field is optional because issuers
/// differ in which of them they populate, and a claim of an unexpected type
/// reads as absent instead of failing the whole payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Subject identifier.  Numeric subjects are kept as their decimal text.
    #[serde(default, deserialize_with = "lenient_subject")]
    pub sub: Option<String>,

    /// Full display name.
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,

    /// OIDC preferred username.
    #[serde(default, deserialize_with = "lenient_string")]
    pub preferred_username: Option<String>,

    /// Non-standard username claim some issuers emit.
    #[serde(default, deserialize_with = "lenient_string")]
    pub username: Option<String>,

    /// E-mail address.
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,

    /// Expiry as seconds since the epoch.  Fractional values are truncated.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub exp: Option<i64>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_subject<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Decodes the payload segment of `token`.
///
/// Padding is tolerated on input even though JWS never emits it.
///
/// # Errors
///
/// Returns [`DecodeError`] when the token has no payload segment, the
/// segment is not base64url, or it is not a JSON object.  Claims of the
/// wrong type are not an error.
///
/// # Examples
///
/// ```
/// use erp_auth::auth::claims::{decode_claims, DecodeError};
///
/// let claims = decode_claims("a.eyJuYW1lIjoiS2ltIn0.b").unwrap();
/// assert_eq!(claims.name.as_deref(), Some("Kim"));
///
/// assert_eq!(decode_claims("opaque").unwrap_err(), DecodeError::MissingPayload);
/// ```
pub fn decode_claims(token: &str) -> Result<Claims, DecodeError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or(DecodeError::MissingPayload)?;

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| DecodeError::Base64(e.to_string()))?;

    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| DecodeError::Json(e.to_string()))?;
    if !value.is_object() {
        return Err(DecodeError::Json(format!("expected an object, found {value}")));
    }
    serde_json::from_value(value).map_err(|e| DecodeError::Json(e.to_string()))
}
