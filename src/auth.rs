use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// AuthScope
///
/// An isolated authentication context. Admin and public sessions live side by side in
/// one process; a token issued under one scope is never attached to requests of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScope {
    Admin,
    Public,
}

impl AuthScope {
    pub const ALL: [AuthScope; 2] = [AuthScope::Admin, AuthScope::Public];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScope::Admin => "admin",
            AuthScope::Public => "public",
        }
    }

    pub fn access_cookie_name(&self) -> &'static str {
        match self {
            AuthScope::Admin => "admin_access_token",
            AuthScope::Public => "public_access_token",
        }
    }

    pub fn refresh_cookie_name(&self) -> &'static str {
        match self {
            AuthScope::Admin => "admin_refresh_token",
            AuthScope::Public => "public_refresh_token",
        }
    }

    /// Front-end route a user is sent to when the scope's session is gone.
    pub fn login_path(&self) -> &'static str {
        match self {
            AuthScope::Admin => "/admin/login",
            AuthScope::Public => "/login",
        }
    }
}

impl fmt::Display for AuthScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(AuthScope::Admin),
            "public" => Ok(AuthScope::Public),
            other => Err(format!("unknown auth scope '{}'", other)),
        }
    }
}

/// AuthTokens
///
/// An access/refresh pair. Pairs are replaced wholesale on refresh, never patched.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl AuthTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens never end up in logs.
impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// AuthEndpoints
///
/// The session endpoint set of one scope, relative to the configured base URL.
/// The client resolves its refresh call through this value, so a deployment with
/// different paths only swaps the endpoints, not the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub login: String,
    pub refresh: String,
    pub me: String,
    pub change_password: String,
    pub logout: String,
}

impl AuthEndpoints {
    /// Default endpoint set: `/admin/auth/*` for admin, `/auth/*` for public.
    pub fn for_scope(scope: AuthScope) -> Self {
        match scope {
            AuthScope::Admin => Self::with_prefix("/admin/auth"),
            AuthScope::Public => Self::with_prefix("/auth"),
        }
    }

    pub fn with_prefix(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            login: format!("{}/login", prefix),
            refresh: format!("{}/refresh", prefix),
            me: format!("{}/me", prefix),
            change_password: format!("{}/change-password", prefix),
            logout: format!("{}/logout", prefix),
        }
    }
}
