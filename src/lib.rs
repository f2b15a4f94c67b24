//! Authenticated API client for the portal's admin and public REST backend.
//!
//! Two token lifecycles (admin, public) share one process. Each scope gets its own
//! [`ApiClient`], which attaches the scope's bearer token, refreshes it once on a 401
//! (de-duplicated across concurrent callers) and retries the request a single time.
//! List screens describe their filters, sort and page through the [`query`] codec and
//! keep that state in sync with the URL through a [`PaginationController`].

// --- Module Structure ---

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod pagination;
pub mod query;
pub mod resource;
pub mod session;
pub mod storage;

// --- Public Re-exports ---

pub use auth::{AuthEndpoints, AuthScope, AuthTokens};
pub use client::{ApiClient, MultipartPayload, RequestBody, ResponseBody};
pub use config::{ClientConfig, Env};
pub use error::{ApiError, ApiResult, ErrorKind};
pub use pagination::{Navigator, PaginationController, PaginationSettings, ParamUpdate};
pub use query::{FilterExpr, FilterField, FilterOperator, ListQuery, PaginationParams, SortOrder};
pub use session::{Recovery, SessionObserver, SessionState};
pub use storage::{CookieTokenStore, MemoryTokenStore, TokenState, TokenStore};

/// ApiClients
///
/// The admin and public clients over one shared token store, plus the configuration
/// they were built from. This is the single value a host application holds.
#[derive(Clone)]
pub struct ApiClients {
    pub admin: ApiClient,
    pub public: ApiClient,
    pub tokens: TokenState,
    pub config: ClientConfig,
}

impl ApiClients {
    pub fn new(config: ClientConfig, tokens: TokenState) -> ApiResult<Self> {
        let admin = ApiClient::new(&config, AuthScope::Admin, tokens.clone())?;
        let public = ApiClient::new(&config, AuthScope::Public, tokens.clone())?;
        Ok(Self {
            admin,
            public,
            tokens,
            config,
        })
    }

    pub fn for_scope(&self, scope: AuthScope) -> &ApiClient {
        match scope {
            AuthScope::Admin => &self.admin,
            AuthScope::Public => &self.public,
        }
    }

    /// Pagination settings seeded from the shared configuration.
    pub fn pagination_settings(&self) -> PaginationSettings {
        PaginationSettings::from_config(&self.config)
    }
}
