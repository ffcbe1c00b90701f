use std::fmt;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[cfg(feature = "client")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed with status {status}: {message}")]
    Api {
        operation: &'static str,
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },
    #[error("Token storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status reported by the backend, if this is a backend error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine-readable code from the backend error body, if any.
    #[must_use]
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Api { code, .. } => code.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Human-readable message suitable for display next to a form.
    ///
    /// The backend code takes precedence; without a known code the HTTP
    /// status decides. Transport failures get a connectivity hint.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            #[cfg(feature = "client")]
            Self::Http(_) => "Network error. Please check your connection and try again.".into(),
            Self::Api {
                status,
                code,
                message,
                ..
            } => code
                .as_ref()
                .and_then(ErrorCode::user_message)
                .map(str::to_owned)
                .unwrap_or_else(|| status_message(*status, message)),
            Self::Storage(_) | Self::Config(_) => {
                "An unexpected error occurred. Please try again.".into()
            }
        }
    }
}

fn status_message(status: u16, message: &str) -> String {
    let or = |fallback: &str| {
        if message.is_empty() {
            fallback.to_owned()
        } else {
            message.to_owned()
        }
    };
    match status {
        400 => or("Invalid request. Please check your input."),
        401 => "Your session has expired. Please log in again.".into(),
        403 => "You do not have permission to perform this action.".into(),
        404 => "The requested resource was not found.".into(),
        409 => or("A conflict occurred. Please try again."),
        422 => or("Invalid data provided. Please check your input."),
        429 => "Too many requests. Please wait a moment and try again.".into(),
        500 | 502 | 503 | 504 => "Server error. Please try again later.".into(),
        _ => "An unexpected error occurred. Please try again.".into(),
    }
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) code: Option<String>,
}

/// Machine error codes emitted by the TinyUrl backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    InvalidCredentials,
    EmailExists,
    InvalidPayload,
    InvalidJson,
    InvalidUrl,
    InvalidShortUrl,
    UrlNotFound,
    MissingId,
    Unauthorized,
    IdGenerationFailed,
    DbError,
    InternalError,
    Other(String),
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::EmailExists => "EMAIL_EXISTS",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::InvalidJson => "INVALID_JSON",
            Self::InvalidUrl => "INVALID_URL",
            Self::InvalidShortUrl => "INVALID_SHORT_URL",
            Self::UrlNotFound => "URL_NOT_FOUND",
            Self::MissingId => "MISSING_ID",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::IdGenerationFailed => "ID_GENERATION_FAILED",
            Self::DbError => "DB_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Other(code) => code,
        }
    }

    fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::InvalidCredentials => Some("Invalid email or password. Please try again."),
            Self::EmailExists => {
                Some("This email is already registered. Try logging in instead.")
            }
            Self::InvalidUrl => Some("Please enter a valid URL (e.g., https://example.com)"),
            Self::InvalidShortUrl => Some("The short URL you entered is not valid."),
            Self::UrlNotFound => Some("This short URL does not exist or has been deleted."),
            Self::InternalError => {
                Some("Something went wrong on our end. Please try again later.")
            }
            _ => None,
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "INVALID_CREDENTIALS" => Self::InvalidCredentials,
            "EMAIL_EXISTS" => Self::EmailExists,
            "INVALID_PAYLOAD" => Self::InvalidPayload,
            "INVALID_JSON" => Self::InvalidJson,
            "INVALID_URL" => Self::InvalidUrl,
            "INVALID_SHORT_URL" => Self::InvalidShortUrl,
            "URL_NOT_FOUND" => Self::UrlNotFound,
            "MISSING_ID" => Self::MissingId,
            "UNAUTHORIZED" => Self::Unauthorized,
            "ID_GENERATION_FAILED" => Self::IdGenerationFailed,
            "DB_ERROR" => Self::DbError,
            "INTERNAL_ERROR" => Self::InternalError,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds an [`Error::Api`] from a non-2xx status and its raw body.
///
/// A body that is not the `{error, code}` shape is kept verbatim as the message.
/// Custom [`AuthApi`](crate::AuthApi) transports use this to report backend
/// failures the same way [`ApiClient`](crate::ApiClient) does.
#[must_use]
pub fn api_error(operation: &'static str, status: u16, body: &str) -> Error {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => Error::Api {
            operation,
            status,
            code: parsed.code.as_deref().map(ErrorCode::from),
            message: parsed.error.unwrap_or_default(),
        },
        Err(_) => Error::Api {
            operation,
            status,
            code: None,
            message: body.trim().to_owned(),
        },
    }
}
