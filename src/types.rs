use std::fmt;

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Backend user identifier (the token's `user_id` claim).
///
/// Opaque to the client; the backend currently issues UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identity derived from a session token's claims.
///
/// This is the value carried by the session state stream. It is display data
/// only: nothing here has been verified against the token signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Identity {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Body of `POST /login`.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /signup`.
#[derive(Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Registration {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            username: None,
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

/// Successful login/signup response.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct AuthResponse {
    pub token: String,
}

impl AuthResponse {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// A short link owned by the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ShortUrl {
    /// Short code, the path segment of the short link.
    pub id: String,
    /// Original (long) URL.
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

/// Response of `POST /` when shortening a URL.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct ShortenResponse {
    #[serde(default)]
    pub message: String,
    pub short_code: String,
}

/// Response of `GET /{code}`.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct ResolveResponse {
    #[serde(default)]
    pub message: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_omits_missing_username() {
        let json = serde_json::to_value(Registration::new("a@b.co", "secret1")).unwrap();
        assert_eq!(json, serde_json::json!({"email": "a@b.co", "password": "secret1"}));

        let json =
            serde_json::to_value(Registration::new("a@b.co", "secret1").with_username("ana"))
                .unwrap();
        assert_eq!(json["username"], "ana");
    }

    #[test]
    fn debug_output_redacts_passwords() {
        let creds = format!("{:?}", Credentials::new("a@b.co", "hunter22"));
        assert!(!creds.contains("hunter22"));

        let reg = format!("{:?}", Registration::new("a@b.co", "hunter22"));
        assert!(!reg.contains("hunter22"));
    }

    #[test]
    fn short_url_parses_backend_timestamps() {
        let entry: ShortUrl = serde_json::from_str(
            r#"{"id":"aZ3kQ1","url":"https://example.com","created_at":"2025-03-01T10:15:30.123456Z"}"#,
        )
        .unwrap();
        assert_eq!(entry.id, "aZ3kQ1");
        assert_eq!(entry.created_at.year(), 2025);
    }

    #[test]
    fn user_id_from_str() {
        let id = UserId::from("7c9e6679-7425-40de-944b-e07fc1f90ae7");
        assert_eq!(id.to_string(), "7c9e6679-7425-40de-944b-e07fc1f90ae7");
    }
}
