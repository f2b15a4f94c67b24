use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::auth::AuthScope;
use crate::error::{ApiError, ErrorKind};

/// SessionState
///
/// What the auth-state banner shows for one scope.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Healthy,
    /// Persistent banner with retry and forced-logout actions. Stays until a request
    /// succeeds or the user dismisses it.
    Degraded {
        kind: ErrorKind,
        message: String,
        since: DateTime<Utc>,
    },
    /// The session is gone; the UI navigates to `login_url`.
    LoginRequired { login_url: String },
}

/// Recovery
///
/// The action a screen takes for a failed call.
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// Connection or server failure: offer retry, plus a forced logout.
    OfferRetry { allow_logout: bool },
    /// Send the user to login, returning to the originating path afterwards.
    RedirectToLogin { login_url: String },
    /// Validation failure: show the messages inline, no retry.
    ShowFieldErrors {
        message: String,
        fields: BTreeMap<String, String>,
    },
    ShowMessage(String),
}

/// SessionObserver
///
/// Auth-state observer for one scope. Screens report outcomes; subscribers (the banner,
/// the router) follow the resulting `SessionState`.
pub struct SessionObserver {
    scope: AuthScope,
    tx: watch::Sender<SessionState>,
}

impl SessionObserver {
    pub fn new(scope: AuthScope) -> Self {
        let (tx, _rx) = watch::channel(SessionState::Healthy);
        Self { scope, tx }
    }

    pub fn scope(&self) -> AuthScope {
        self.scope
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// report_error
    ///
    /// Records a failure of a call made from `origin_path` and returns the recovery the
    /// screen should perform.
    pub fn report_error(&self, error: &ApiError, origin_path: &str) -> Recovery {
        match error {
            ApiError::NotAuthenticated | ApiError::AuthFailed => {
                let login_url = login_url(self.scope, origin_path);
                tracing::info!(scope = %self.scope, kind = %error.kind(), "login required");
                self.tx.send_replace(SessionState::LoginRequired {
                    login_url: login_url.clone(),
                });
                Recovery::RedirectToLogin { login_url }
            }
            ApiError::Connection(_) | ApiError::Server { .. } => {
                let kind = error.kind();
                // Keep the original timestamp while the same outage persists.
                self.tx.send_if_modified(|state| match state {
                    SessionState::Degraded { kind: current, .. } if *current == kind => false,
                    _ => {
                        *state = SessionState::Degraded {
                            kind,
                            message: error.to_string(),
                            since: Utc::now(),
                        };
                        true
                    }
                });
                Recovery::OfferRetry { allow_logout: true }
            }
            ApiError::Validation {
                message, fields, ..
            } => Recovery::ShowFieldErrors {
                message: message.clone(),
                fields: fields.clone(),
            },
            ApiError::Unknown { message, .. } => Recovery::ShowMessage(message.clone()),
        }
    }

    /// A successful call clears any banner.
    pub fn report_success(&self) {
        self.tx.send_if_modified(|state| {
            if *state == SessionState::Healthy {
                false
            } else {
                *state = SessionState::Healthy;
                true
            }
        });
    }

    pub fn dismiss(&self) {
        self.report_success();
    }
}

/// Login route for the scope carrying the originating path as `redirect`.
pub fn login_url(scope: AuthScope, origin_path: &str) -> String {
    if origin_path.is_empty() || origin_path == scope.login_path() {
        return scope.login_path().to_string();
    }
    let redirect: String = url::form_urlencoded::byte_serialize(origin_path.as_bytes()).collect();
    format!("{}?redirect={}", scope.login_path(), redirect)
}
