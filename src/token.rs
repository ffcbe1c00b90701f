//! Local, unverified inspection of session tokens.
//!
//! Tokens are compact `header.payload.signature` strings issued by the
//! backend. The client never checks the signature; it only reads the payload
//! to show who is signed in and to avoid sending a token that is about to
//! expire. Every function here degrades to "no identity" or "invalid" on bad
//! input instead of failing loudly.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::types::{Identity, UserId};

/// Margin subtracted from `exp` when judging validity.
pub const DEFAULT_SKEW_BUFFER: Duration = Duration::from_secs(5);

/// Why a token payload could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("expected 3 dot-separated segments, got {0}")]
    Segments(usize),
    #[error("payload is not valid base64url")]
    Encoding,
    #[error("payload is not a JSON object")]
    Json,
}

/// Claims read from a token payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct Claims {
    /// Subject as issued by the TinyUrl backend.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Registered subject claim, used when `user_id` is absent.
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Expiry in seconds since the Unix epoch.
    #[serde(default, deserialize_with = "numeric_date")]
    pub exp: Option<i64>,
}

impl Claims {
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.user_id.as_deref().or(self.sub.as_deref())
    }

    /// Identity for the session state stream.
    ///
    /// A token without a subject still names a (nameless) user; the empty id
    /// is kept rather than dropping the session.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            id: UserId(self.subject().unwrap_or_default().to_owned()),
            email: self.email.clone().filter(|e| !e.is_empty()),
            name: self.name.clone().filter(|n| !n.is_empty()),
        }
    }

    /// Applies the validity rule at `now` (seconds since epoch).
    ///
    /// No `exp` means the token never expires locally. Otherwise the token is
    /// valid strictly before `exp - skew`.
    #[must_use]
    pub fn is_valid_at(&self, now: i64, skew: Duration) -> bool {
        match self.exp {
            None => true,
            Some(exp) => {
                let skew = i64::try_from(skew.as_secs()).unwrap_or(i64::MAX);
                now < exp.saturating_sub(skew)
            }
        }
    }
}

// `exp` is a JSON number; some issuers emit it with a fractional part.
fn numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<serde_json::Number> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64))))
}

/// Decodes the payload segment of a token.
///
/// # Errors
///
/// Returns [`DecodeError`] if the token is not three segments, the payload is
/// not base64url, or it does not hold a JSON object.
pub fn decode_claims(token: &str) -> Result<Claims, DecodeError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::Segments(segments.len()));
    }

    let payload = segments[1].trim_end_matches('=');
    if payload.is_empty() {
        return Err(DecodeError::Encoding);
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| DecodeError::Encoding)?;

    let json: JsonValue = serde_json::from_slice(&bytes).map_err(|_| DecodeError::Json)?;
    if !json.is_object() {
        return Err(DecodeError::Json);
    }
    serde_json::from_value(json).map_err(|_| DecodeError::Json)
}

/// Decodes a token into an identity, or `None` if it cannot be read.
#[must_use]
pub fn decode_identity(token: &str) -> Option<Identity> {
    decode_claims(token).ok().map(|claims| claims.identity())
}

/// Validity rule over a raw token. Undecodable tokens are invalid.
#[must_use]
pub fn is_valid_at(token: &str, now: i64, skew: Duration) -> bool {
    decode_claims(token).is_ok_and(|claims| claims.is_valid_at(now, skew))
}
