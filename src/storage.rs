use async_trait::async_trait;
use chrono::Utc;
use cookie::time::{Duration as CookieDuration, OffsetDateTime};
use cookie::{Cookie, CookieJar, SameSite};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::{AuthScope, AuthTokens};
use crate::config::ClientConfig;

// 1. TokenStore Contract
/// TokenStore
///
/// Scope-keyed persistence of the access/refresh pair. The concrete mechanism (cookie
/// jar, OS keystore, encrypted file) is swappable without touching the client.
///
/// Implementations must never expose a half-written pair to a concurrent reader. Beyond
/// that the store is last-write-wins; atomicity around refresh is the client's job.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, scope: AuthScope) -> Option<AuthTokens>;

    async fn set(&self, scope: AuthScope, tokens: AuthTokens);

    async fn clear(&self, scope: AuthScope);
}

/// TokenState
///
/// The shared handle both scoped clients hold.
pub type TokenState = Arc<dyn TokenStore>;

// 2. In-Memory Implementation
/// MemoryTokenStore
///
/// Process-local store. Each scope's pair sits behind one lock, so a reader sees either
/// the old pair or the new one.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    pairs: Arc<RwLock<HashMap<AuthScope, AuthTokens>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding a pair for `scope`.
    pub fn with_tokens(scope: AuthScope, tokens: AuthTokens) -> Self {
        let mut pairs = HashMap::new();
        pairs.insert(scope, tokens);
        Self {
            pairs: Arc::new(RwLock::new(pairs)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, scope: AuthScope) -> Option<AuthTokens> {
        self.pairs.read().await.get(&scope).cloned()
    }

    async fn set(&self, scope: AuthScope, tokens: AuthTokens) {
        self.pairs.write().await.insert(scope, tokens);
        tracing::debug!(scope = %scope, "token pair stored");
    }

    async fn clear(&self, scope: AuthScope) {
        self.pairs.write().await.remove(&scope);
        tracing::debug!(scope = %scope, "token pair cleared");
    }
}

// 3. Cookie-Jar Implementation
/// CookieConfig
///
/// Attributes applied to every token cookie.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub secure: bool,
    pub path: String,
    pub same_site: SameSite,
    pub ttl_days: i64,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secure: true,
            path: "/".to_string(),
            same_site: SameSite::Lax,
            ttl_days: 7,
        }
    }
}

impl From<&ClientConfig> for CookieConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            secure: config.cookie_secure,
            ttl_days: config.token_ttl_days,
            ..Default::default()
        }
    }
}

/// CookieTokenStore
///
/// Persists each scope's pair as two http-only cookies (`{scope}_access_token`,
/// `{scope}_refresh_token`) so admin and public sessions never collide. The jar can be
/// seeded from an incoming `Cookie` header and reports the `Set-Cookie` values the host
/// has to emit.
pub struct CookieTokenStore {
    jar: RwLock<CookieJar>,
    config: CookieConfig,
}

impl CookieTokenStore {
    pub fn new(config: CookieConfig) -> Self {
        Self {
            jar: RwLock::new(CookieJar::new()),
            config,
        }
    }

    /// from_cookie_header
    ///
    /// Seeds the jar from a raw request `Cookie` header. Unparsable segments are skipped.
    pub fn from_cookie_header(header: &str, config: CookieConfig) -> Self {
        let mut jar = CookieJar::new();
        for segment in header.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            match Cookie::parse(segment.to_string()) {
                Ok(cookie) => jar.add_original(cookie),
                Err(e) => tracing::debug!(error = %e, "skipping malformed cookie segment"),
            }
        }
        Self {
            jar: RwLock::new(jar),
            config,
        }
    }

    /// Header values for every cookie written or removed since the jar was created.
    pub async fn set_cookie_headers(&self) -> Vec<String> {
        self.jar
            .read()
            .await
            .delta()
            .map(|cookie| cookie.to_string())
            .collect()
    }

    /// Looks up a live (non-expired) cookie by name.
    pub async fn cookie(&self, name: &str) -> Option<Cookie<'static>> {
        let jar = self.jar.read().await;
        jar.get(name).filter(|c| !is_expired(c)).cloned()
    }

    fn token_cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .path(self.config.path.clone())
            .http_only(true)
            .secure(self.config.secure)
            .same_site(self.config.same_site)
            .max_age(CookieDuration::days(self.config.ttl_days))
            .expires(expiry_after_days(self.config.ttl_days))
            .build()
    }
}

#[async_trait]
impl TokenStore for CookieTokenStore {
    async fn get(&self, scope: AuthScope) -> Option<AuthTokens> {
        let jar = self.jar.read().await;
        let access = jar
            .get(scope.access_cookie_name())
            .filter(|c| !is_expired(c) && !c.value().is_empty())?;
        let refresh = jar
            .get(scope.refresh_cookie_name())
            .filter(|c| !is_expired(c) && !c.value().is_empty())?;
        Some(AuthTokens::new(access.value(), refresh.value()))
    }

    async fn set(&self, scope: AuthScope, tokens: AuthTokens) {
        let access = self.token_cookie(scope.access_cookie_name(), tokens.access_token);
        let refresh = self.token_cookie(scope.refresh_cookie_name(), tokens.refresh_token);

        // Both cookies change under one write guard.
        let mut jar = self.jar.write().await;
        jar.add(access);
        jar.add(refresh);
        tracing::debug!(scope = %scope, "token cookies written");
    }

    async fn clear(&self, scope: AuthScope) {
        let path = self.config.path.clone();
        let mut jar = self.jar.write().await;
        for name in [scope.access_cookie_name(), scope.refresh_cookie_name()] {
            jar.remove(Cookie::build(name).path(path.clone()));
        }
        tracing::debug!(scope = %scope, "token cookies removed");
    }
}

fn is_expired(cookie: &Cookie<'_>) -> bool {
    cookie
        .expires_datetime()
        .is_some_and(|expires| expires <= OffsetDateTime::now_utc())
}

fn expiry_after_days(days: i64) -> OffsetDateTime {
    let expiry = Utc::now() + chrono::Duration::days(days);
    OffsetDateTime::from_unix_timestamp(expiry.timestamp()).unwrap_or_else(|_| {
        tracing::warn!(
            timestamp = expiry.timestamp(),
            "cookie expiry out of range; falling back to now plus ttl"
        );
        OffsetDateTime::now_utc() + CookieDuration::days(days)
    })
}
