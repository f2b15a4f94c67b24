use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthTokens;

// --- Request Payloads ---

/// LoginRequest
///
/// Credentials posted to the scope's login endpoint. The password is only passed through
/// to the backend and never logged.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// ChangePasswordRequest
///
/// Input payload for the scope's change-password endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// RefreshRequest
///
/// Body of the refresh exchange.
#[derive(Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

// --- Response Payloads ---

/// TokenResponse
///
/// Body returned by login and refresh. Both fields are optional on the wire so a body
/// missing either token is detected as malformed instead of failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Returns the pair only when both tokens are present and non-empty.
    pub fn into_tokens(self) -> Option<AuthTokens> {
        match (self.access_token, self.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Some(AuthTokens::new(access, refresh))
            }
            _ => None,
        }
    }
}

/// UserProfile
///
/// The authenticated account as returned by the scope's `me` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Paginated
///
/// Envelope of a list endpoint. The backend speaks offset/limit; `page()` converts back
/// to the 1-based page the UI shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u64,
}

impl<T> Paginated<T> {
    pub fn page(&self) -> u32 {
        crate::query::offset_to_page(self.offset, self.limit)
    }

    pub fn total_pages(&self) -> u32 {
        if self.limit == 0 {
            return if self.total == 0 { 0 } else { 1 };
        }
        u32::try_from(self.total.div_ceil(u64::from(self.limit))).unwrap_or(u32::MAX)
    }
}
