#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use portal_client::{
    ApiClient, AuthScope, AuthTokens, ClientConfig, MemoryTokenStore, TokenState,
};
use serde_json::{Value, json};
use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::net::TcpListener;

pub const PASSWORD: &str = "correct-horse";

/// In-process backend speaking the admin/public auth protocol.
#[derive(Default)]
pub struct MockBackend {
    // Current valid pairs, one per scope.
    admin: Mutex<Option<AuthTokens>>,
    public: Mutex<Option<AuthTokens>>,
    serial: AtomicU64,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub always_401_hits: AtomicUsize,
    pub refresh_fails: AtomicBool,
    pub refresh_malformed: AtomicBool,
    pub refresh_delay_ms: AtomicU64,
    // Bearer tokens seen on authorized requests.
    pub accepted_tokens: Mutex<HashSet<String>>,
    pub last_content_type: Mutex<Option<String>>,
    pub last_request_id: Mutex<Option<String>>,
    // Every Authorization value on the last recorded request.
    pub last_authorization: Mutex<Vec<String>>,
}

impl MockBackend {
    fn slot(&self, scope: AuthScope) -> &Mutex<Option<AuthTokens>> {
        match scope {
            AuthScope::Admin => &self.admin,
            AuthScope::Public => &self.public,
        }
    }

    /// Issues and registers a fresh pair for the scope.
    pub fn issue(&self, scope: AuthScope) -> AuthTokens {
        let n = self.serial.fetch_add(1, Ordering::SeqCst);
        let tokens = AuthTokens::new(
            format!("{}-access-{}", scope, n),
            format!("{}-refresh-{}", scope, n),
        );
        *self.slot(scope).lock().unwrap() = Some(tokens.clone());
        tokens
    }

    /// A pair whose access token the backend no longer accepts but whose refresh token
    /// is still valid.
    pub fn expired_pair(&self, scope: AuthScope) -> AuthTokens {
        let valid = self.issue(scope);
        AuthTokens::new(format!("{}-expired", scope), valid.refresh_token)
    }

    pub fn current(&self, scope: AuthScope) -> Option<AuthTokens> {
        self.slot(scope).lock().unwrap().clone()
    }

    fn authorized(&self, headers: &HeaderMap, scopes: &[AuthScope]) -> bool {
        let Some(token) = bearer(headers) else {
            return false;
        };
        let ok = scopes.iter().any(|scope| {
            self.current(*scope)
                .is_some_and(|pair| pair.access_token == token)
        });
        if ok {
            self.accepted_tokens.lock().unwrap().insert(token);
        }
        ok
    }

    fn record(&self, headers: &HeaderMap) {
        *self.last_content_type.lock().unwrap() = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.last_request_id.lock().unwrap() = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.last_authorization.lock().unwrap() = headers
            .get_all(header::AUTHORIZATION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
    }
}

pub struct TestApp {
    pub address: String,
    pub backend: Arc<MockBackend>,
}

impl TestApp {
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            api_base_url: self.address.clone(),
            ..ClientConfig::default()
        }
    }

    pub fn client(&self, scope: AuthScope, tokens: TokenState) -> ApiClient {
        ApiClient::new(&self.config(), scope, tokens).unwrap()
    }

    /// A client whose store already holds `tokens` for its scope.
    pub fn client_with(&self, scope: AuthScope, tokens: AuthTokens) -> (ApiClient, TokenState) {
        let store = Arc::new(MemoryTokenStore::with_tokens(scope, tokens)) as TokenState;
        (self.client(scope, store.clone()), store)
    }
}

pub async fn spawn_app() -> TestApp {
    let backend = Arc::new(MockBackend::default());

    let router = Router::new()
        .route("/auth/login", post(login_public))
        .route("/admin/auth/login", post(login_admin))
        .route("/auth/refresh", post(refresh_public))
        .route("/admin/auth/refresh", post(refresh_admin))
        .route("/auth/me", get(me_public))
        .route("/admin/auth/me", get(me_admin))
        .route("/auth/change-password", post(change_password))
        .route("/admin/auth/change-password", post(change_password))
        .route("/auth/logout", post(logout))
        .route("/admin/auth/logout", post(logout))
        .route("/pages", get(list_pages).post(create_page))
        .route(
            "/pages/{id}",
            get(get_page).patch(update_page).delete(delete_page),
        )
        .route("/config/key/{key}", get(config_by_key))
        .route("/reports/export", get(export_report))
        .route("/files/{name}", get(download_file))
        .route("/uploads", post(upload))
        .route("/always-401", get(always_unauthorized))
        .route("/boom", get(server_error))
        .route("/teapot", get(teapot))
        .route("/bad-request", get(bad_request))
        .with_state(backend.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address, backend }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Unauthorized" })),
    )
        .into_response()
}

// --- Auth Handlers ---

fn login(backend: &MockBackend, scope: AuthScope, body: &Value) -> Response {
    if body["password"] != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid credentials" })),
        )
            .into_response();
    }
    let tokens = backend.issue(scope);
    Json(json!({
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token,
    }))
    .into_response()
}

async fn login_public(State(b): State<Arc<MockBackend>>, Json(body): Json<Value>) -> Response {
    login(&b, AuthScope::Public, &body)
}

async fn login_admin(State(b): State<Arc<MockBackend>>, Json(body): Json<Value>) -> Response {
    login(&b, AuthScope::Admin, &body)
}

async fn refresh(backend: &MockBackend, scope: AuthScope, body: &Value) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = backend.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let valid = backend
        .current(scope)
        .is_some_and(|pair| body["refresh_token"] == pair.refresh_token.as_str());
    if !valid || backend.refresh_fails.load(Ordering::SeqCst) {
        return unauthorized();
    }
    if backend.refresh_malformed.load(Ordering::SeqCst) {
        return Json(json!({ "access_token": "half-a-pair" })).into_response();
    }

    let tokens = backend.issue(scope);
    Json(json!({
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token,
    }))
    .into_response()
}

async fn refresh_public(State(b): State<Arc<MockBackend>>, Json(body): Json<Value>) -> Response {
    refresh(&b, AuthScope::Public, &body).await
}

async fn refresh_admin(State(b): State<Arc<MockBackend>>, Json(body): Json<Value>) -> Response {
    refresh(&b, AuthScope::Admin, &body).await
}

fn profile(scope: AuthScope) -> Value {
    json!({
        "id": "00000000-0000-0000-0000-000000000001",
        "email": format!("{}@example.com", scope),
        "role": scope.as_str(),
    })
}

async fn me_public(State(b): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    if !b.authorized(&headers, &[AuthScope::Public]) {
        return unauthorized();
    }
    Json(profile(AuthScope::Public)).into_response()
}

async fn me_admin(State(b): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    if !b.authorized(&headers, &[AuthScope::Admin]) {
        return unauthorized();
    }
    Json(profile(AuthScope::Admin)).into_response()
}

async fn change_password(
    State(b): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !b.authorized(&headers, &AuthScope::ALL) {
        return unauthorized();
    }
    let new_password = body["new_password"].as_str().unwrap_or_default();
    if new_password.len() < 8 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "message": "Validation failed",
                "fields": { "new_password": "must be at least 8 characters" },
            })),
        )
            .into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn logout(State(b): State<Arc<MockBackend>>) -> StatusCode {
    b.logout_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

// --- Resource Handlers ---

async fn list_pages(
    State(b): State<Arc<MockBackend>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    b.record(&headers);
    if !b.authorized(&headers, &AuthScope::ALL) {
        return unauthorized();
    }
    Json(json!({
        "data": [{ "id": 1, "title": "Home" }],
        "total": 41,
        "limit": 20,
        "offset": 40,
        "query": query.unwrap_or_default(),
    }))
    .into_response()
}

async fn create_page(
    State(b): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    b.record(&headers);
    if !b.authorized(&headers, &AuthScope::ALL) {
        return unauthorized();
    }
    if body["title"].as_str().unwrap_or_default().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "message": "Validation failed",
                "fields": { "title": "is required" },
            })),
        )
            .into_response();
    }
    (StatusCode::CREATED, Json(json!({ "id": 7, "title": body["title"] }))).into_response()
}

async fn get_page(
    State(b): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !b.authorized(&headers, &AuthScope::ALL) {
        return unauthorized();
    }
    if id == "404" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Page not found" })),
        )
            .into_response();
    }
    Json(json!({ "id": id, "title": "Home" })).into_response()
}

async fn update_page(
    State(b): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !b.authorized(&headers, &AuthScope::ALL) {
        return unauthorized();
    }
    Json(json!({ "id": id, "title": body["title"] })).into_response()
}

async fn delete_page(State(b): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    if !b.authorized(&headers, &AuthScope::ALL) {
        return unauthorized();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn config_by_key(Path(key): Path<String>) -> Json<Value> {
    Json(json!({ "key": key, "value": "on" }))
}

async fn export_report(State(b): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    if !b.authorized(&headers, &AuthScope::ALL) {
        return unauthorized();
    }
    (
        [(header::CONTENT_TYPE, "text/csv")],
        "id,title\n1,Home\n",
    )
        .into_response()
}

async fn download_file(
    State(b): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if !b.authorized(&headers, &AuthScope::ALL) {
        return unauthorized();
    }
    if name == "missing.bin" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "No such file" })),
        )
            .into_response();
    }
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        vec![0u8, 1, 2, 3],
    )
        .into_response()
}

async fn upload(State(b): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    b.record(&headers);
    if !b.authorized(&headers, &AuthScope::ALL) {
        return unauthorized();
    }
    Json(json!({ "stored": true })).into_response()
}

async fn always_unauthorized(State(b): State<Arc<MockBackend>>) -> Response {
    b.always_401_hits.fetch_add(1, Ordering::SeqCst);
    unauthorized()
}

async fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "database unavailable" })),
    )
        .into_response()
}

async fn teapot() -> Response {
    (StatusCode::IM_A_TEAPOT, "short and stout").into_response()
}

async fn bad_request() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": "Malformed filter" })),
    )
        .into_response()
}
