use std::collections::BTreeMap;
use std::fmt;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ErrorKind
///
/// The closed taxonomy callers branch on. The string codes are what the UI layer maps to
/// user-visible messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    AuthFailed,
    NotAuthenticated,
    ValidationError,
    ConnectionError,
    ServerError,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthFailed => "AUTH_FAILED",
            ErrorKind::NotAuthenticated => "NOT_AUTHENTICATED",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::ConnectionError => "CONNECTION_ERROR",
            ErrorKind::ServerError => "SERVER_ERROR",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ApiError
///
/// Every failure the authenticated client can return. Nothing is swallowed except the
/// best-effort logout notification.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 401 after the retry budget was spent, or the refresh itself failed.
    #[error("authentication failed")]
    AuthFailed,

    /// No token pair is stored for the scope.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A 4xx body carrying field-level messages.
    #[error("{message}")]
    Validation {
        status: u16,
        message: String,
        fields: BTreeMap<String, String>,
    },

    /// The request never produced a response.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("{message}")]
    Unknown { status: Option<u16>, message: String },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::AuthFailed => ErrorKind::AuthFailed,
            ApiError::NotAuthenticated => ErrorKind::NotAuthenticated,
            ApiError::Validation { .. } => ErrorKind::ValidationError,
            ApiError::Connection(_) => ErrorKind::ConnectionError,
            ApiError::Server { .. } => ErrorKind::ServerError,
            ApiError::Unknown { .. } => ErrorKind::UnknownError,
        }
    }

    /// HTTP status attached to the failure, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::AuthFailed => Some(StatusCode::UNAUTHORIZED.as_u16()),
            ApiError::Validation { status, .. } | ApiError::Server { status, .. } => Some(*status),
            ApiError::Unknown { status, .. } => *status,
            ApiError::NotAuthenticated | ApiError::Connection(_) => None,
        }
    }

    pub fn field_errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            ApiError::Validation { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Connection and server failures are worth offering a retry for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Connection(_) | ApiError::Server { .. })
    }

    /// Auth failures force the user back through login.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::AuthFailed | ApiError::NotAuthenticated)
    }

    /// from_response
    ///
    /// Builds the typed failure for a non-2xx response from its status and raw body.
    ///
    /// A 4xx body is only treated as a validation error when it carries a `fields` map
    /// (an empty map still counts). A 4xx without one is reported as `UNKNOWN_ERROR` with
    /// the decoded message, so callers never render an empty field list.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            return ApiError::AuthFailed;
        }

        let decoded = serde_json::from_str::<ErrorBody>(body).ok();
        let message = decoded
            .as_ref()
            .and_then(|b| b.message.clone())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| status_line(status));

        if status.is_server_error() {
            return ApiError::Server {
                status: status.as_u16(),
                message,
            };
        }

        match decoded.and_then(|b| b.fields) {
            Some(fields) if status.is_client_error() => ApiError::Validation {
                status: status.as_u16(),
                message,
                fields,
            },
            _ => ApiError::Unknown {
                status: Some(status.as_u16()),
                message,
            },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Unknown {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        } else {
            ApiError::Connection(err.to_string())
        }
    }
}

/// ErrorBody
///
/// Shape of a JSON error body returned by the backend for non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub fields: Option<BTreeMap<String, String>>,
}

/// Renders "404 Not Found" style text for responses without a usable message.
pub(crate) fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
