use std::{env, time::Duration};

/// ClientConfig
///
/// Holds the client's entire configuration state. It is immutable once loaded and is
/// shared by both scoped clients, the token store and the pagination controllers.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    // Runtime environment marker. Controls cookie hardening and log format.
    pub env: Env,
    // Base URL of the REST backend; every endpoint path is relative to it.
    pub api_base_url: String,
    // Per-request transport timeout.
    pub request_timeout: Duration,
    // Page size used when a list request carries a page but no limit.
    pub default_limit: u32,
    // Query key reserved for the global search term on list screens.
    pub search_key: String,
    // Window used to buffer rapid list-state updates before they are committed.
    pub debounce: Duration,
    // Whether token cookies carry the `Secure` attribute.
    pub cookie_secure: bool,
    // Lifetime of persisted token cookies.
    pub token_ttl_days: i64,
}

/// Env
///
/// Defines the runtime context. `Local` allows plain-HTTP cookies and pretty logs,
/// `Production` demands an explicit backend URL and hardened cookies.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LIST_LIMIT: u32 = 20;
pub const DEFAULT_SEARCH_KEY: &str = "search";
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;

impl Default for ClientConfig {
    /// default
    ///
    /// Provides a non-panicking configuration for tests and embedding, pointed at a
    /// local backend.
    fn default() -> Self {
        Self {
            env: Env::Local,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_limit: DEFAULT_LIST_LIMIT,
            search_key: DEFAULT_SEARCH_KEY.to_string(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            cookie_secure: false,
            token_ttl_days: DEFAULT_TOKEN_TTL_DAYS,
        }
    }
}

impl ClientConfig {
    /// load
    ///
    /// Reads the configuration from environment variables, following the fail-fast
    /// principle for production.
    ///
    /// # Panics
    /// Panics in `Env::Production` when `API_BASE_URL` is not set, so the client never
    /// silently talks to a local default in a deployed build.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let api_base_url = match env {
            Env::Production => {
                env::var("API_BASE_URL").expect("FATAL: API_BASE_URL must be set in production.")
            }
            Env::Local => env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        };

        // Production always hardens cookies; local may opt in.
        let cookie_secure = match env {
            Env::Production => true,
            Env::Local => parse_var::<bool>("COOKIE_SECURE").unwrap_or(false),
        };

        Self {
            api_base_url,
            request_timeout: Duration::from_secs(
                parse_var::<u64>("API_TIMEOUT_SECS").unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            default_limit: parse_var::<u32>("LIST_DEFAULT_LIMIT")
                .filter(|limit| *limit > 0)
                .unwrap_or(DEFAULT_LIST_LIMIT),
            search_key: env::var("LIST_SEARCH_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SEARCH_KEY.to_string()),
            debounce: Duration::from_millis(
                parse_var::<u64>("LIST_DEBOUNCE_MS").unwrap_or(DEFAULT_DEBOUNCE_MS),
            ),
            cookie_secure,
            token_ttl_days: parse_var::<i64>("TOKEN_TTL_DAYS")
                .filter(|days| *days > 0)
                .unwrap_or(DEFAULT_TOKEN_TTL_DAYS),
            env,
        }
    }
}

/// Parses an optional environment variable, treating unparsable values as unset.
fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}
