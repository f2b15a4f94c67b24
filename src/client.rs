use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{Instrument, Span};
use url::Url;
use uuid::Uuid;

use crate::auth::{AuthEndpoints, AuthScope, AuthTokens};
use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult, status_line};
use crate::models::{ChangePasswordRequest, LoginRequest, RefreshRequest, TokenResponse, UserProfile};
use crate::resource::Resource;
use crate::storage::TokenState;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// --- Request / Response Bodies ---

/// RequestBody
///
/// What a request carries. JSON and empty bodies are sent as `application/json`;
/// multipart and raw bytes let the transport (or the caller) pick the content type.
/// Every variant is cheap to clone so the single post-refresh retry can resend it.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartPayload),
    Bytes {
        content_type: Option<String>,
        data: Bytes,
    },
}

impl RequestBody {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> ApiResult<Self> {
        serde_json::to_value(value)
            .map(RequestBody::Json)
            .map_err(|e| ApiError::Unknown {
                status: None,
                message: format!("failed to encode request body: {}", e),
            })
    }
}

/// MultipartPayload
///
/// A multipart form kept as plain data. `reqwest`'s form is consumed on send, so it is
/// rebuilt from this value for every attempt.
#[derive(Debug, Clone, Default)]
pub struct MultipartPayload {
    parts: Vec<MultipartPart>,
}

#[derive(Debug, Clone)]
struct MultipartPart {
    name: String,
    data: Bytes,
    file_name: Option<String>,
    mime: Option<String>,
}

impl MultipartPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            data: Bytes::from(value.into()),
            file_name: None,
            mime: None,
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            data: data.into(),
            file_name: Some(file_name.into()),
            mime: Some(mime.into()),
        });
        self
    }

    fn to_form(&self) -> ApiResult<Form> {
        let mut form = Form::new();
        for part in &self.parts {
            let mut body = Part::bytes(part.data.to_vec());
            if let Some(file_name) = &part.file_name {
                body = body.file_name(file_name.clone());
            }
            if let Some(mime) = &part.mime {
                body = body.mime_str(mime).map_err(|e| ApiError::Unknown {
                    status: None,
                    message: format!("invalid multipart content type '{}': {}", mime, e),
                })?;
            }
            form = form.part(part.name.clone(), body);
        }
        Ok(form)
    }
}

/// ResponseBody
///
/// A successful response: decoded JSON, or the raw text of a non-JSON body
/// (exports, CSV downloads).
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody<T> {
    Json(T),
    Text(String),
}

impl<T: DeserializeOwned> ResponseBody<T> {
    /// Returns the JSON payload. A text body is accepted when it parses as JSON; an empty
    /// one (204, missing content type) decodes as `null`.
    pub fn into_json(self) -> ApiResult<T> {
        match self {
            ResponseBody::Json(value) => Ok(value),
            ResponseBody::Text(text) => {
                let raw = if text.trim().is_empty() { "null" } else { text.as_str() };
                serde_json::from_str(raw).map_err(|_| ApiError::Unknown {
                    status: None,
                    message: "expected a JSON response body".to_string(),
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
struct PreparedRequest {
    method: Method,
    path: String,
    body: RequestBody,
    headers: HeaderMap,
}

// --- Client ---

type PendingRefresh = Shared<BoxFuture<'static, Option<AuthTokens>>>;

enum RefreshOutcome {
    Refreshed(AuthTokens),
    Rejected(StatusCode),
    Malformed,
    Unreachable(String),
}

/// ApiClient
///
/// HTTP client bound to one `AuthScope`. It attaches the scope's bearer token, turns
/// responses into `ApiResult`s, and on a 401 runs one coordinated refresh before retrying
/// the request exactly once.
///
/// Clones share the token store and the pending-refresh slot, so they behave as the same
/// client instance.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    scope: AuthScope,
    endpoints: Arc<AuthEndpoints>,
    tokens: TokenState,
    // At most one refresh in flight per client; cleared once it settles.
    pending_refresh: Arc<Mutex<Option<PendingRefresh>>>,
}

impl ApiClient {
    /// new
    ///
    /// Builds a client for `scope` against the configured base URL, using the scope's
    /// default endpoint set.
    pub fn new(config: &ClientConfig, scope: AuthScope, tokens: TokenState) -> ApiResult<Self> {
        let base_url = Url::parse(&config.api_base_url).map_err(|e| ApiError::Unknown {
            status: None,
            message: format!("invalid base URL '{}': {}", config.api_base_url, e),
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            scope,
            endpoints: Arc::new(AuthEndpoints::for_scope(scope)),
            tokens,
            pending_refresh: Arc::new(Mutex::new(None)),
        })
    }

    /// Replaces the session endpoint set (and with it the refresh endpoint).
    pub fn with_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.endpoints = Arc::new(endpoints);
        self
    }

    pub fn scope(&self) -> AuthScope {
        self.scope
    }

    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    pub fn token_store(&self) -> &TokenState {
        &self.tokens
    }

    pub fn resource(&self, name: &str) -> Resource<'_> {
        Resource::new(self, name)
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    // --- Generic Requests ---

    /// request
    ///
    /// Issues `method path` under this client's scope and interprets the response:
    /// JSON bodies are decoded, other 2xx bodies come back as text, non-2xx bodies become
    /// a typed `ApiError`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        headers: Option<HeaderMap>,
    ) -> ApiResult<ResponseBody<T>> {
        let request = PreparedRequest {
            method,
            path: path.to_string(),
            body,
            headers: headers.unwrap_or_default(),
        };
        let request_id = Uuid::new_v4();
        let span = request_span(self.scope, &request.method, &request.path, request_id);

        async move {
            let response = self.execute(&request, request_id).await?;
            read_body(response).await
        }
        .instrument(span)
        .await
    }

    /// request_raw
    ///
    /// Same auth and retry policy as [`ApiClient::request`], but hands back the unread
    /// response for downloads. Any non-2xx is a generic failure; the body is not decoded.
    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        headers: Option<HeaderMap>,
    ) -> ApiResult<Response> {
        let request = PreparedRequest {
            method,
            path: path.to_string(),
            body,
            headers: headers.unwrap_or_default(),
        };
        let request_id = Uuid::new_v4();
        let span = request_span(self.scope, &request.method, &request.path, request_id);

        async move {
            let response = self.execute(&request, request_id).await?;
            let status = response.status();
            if status.is_success() {
                Ok(response)
            } else {
                tracing::warn!(status = status.as_u16(), "raw request failed");
                Err(ApiError::Unknown {
                    status: Some(status.as_u16()),
                    message: format!("request failed: {}", status_line(status)),
                })
            }
        }
        .instrument(span)
        .await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.request(Method::GET, path, RequestBody::Empty, None)
            .await?
            .into_json()
    }

    /// GET returning the body as text whatever its content type.
    pub async fn get_text(&self, path: &str) -> ApiResult<String> {
        match self
            .request::<serde_json::Value>(Method::GET, path, RequestBody::Empty, None)
            .await?
        {
            ResponseBody::Json(value) => Ok(value.to_string()),
            ResponseBody::Text(text) => Ok(text),
        }
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::POST, path, RequestBody::json(body)?, None)
            .await?
            .into_json()
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::PUT, path, RequestBody::json(body)?, None)
            .await?
            .into_json()
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::PATCH, path, RequestBody::json(body)?, None)
            .await?
            .into_json()
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.request(Method::DELETE, path, RequestBody::Empty, None)
            .await?
            .into_json()
    }

    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: MultipartPayload,
    ) -> ApiResult<T> {
        self.request(Method::POST, path, RequestBody::Multipart(payload), None)
            .await?
            .into_json()
    }

    pub async fn download(&self, path: &str) -> ApiResult<Bytes> {
        let response = self
            .request_raw(Method::GET, path, RequestBody::Empty, None)
            .await?;
        Ok(response.bytes().await?)
    }

    // --- Session Operations ---

    /// login
    ///
    /// Exchanges credentials for a token pair and persists it under this scope. The login
    /// call never triggers a refresh; a 401 here is `AUTH_FAILED`.
    pub async fn login(&self, credentials: &LoginRequest) -> ApiResult<AuthTokens> {
        let request = PreparedRequest {
            method: Method::POST,
            path: self.endpoints.login.clone(),
            body: RequestBody::json(credentials)?,
            headers: HeaderMap::new(),
        };
        let request_id = Uuid::new_v4();
        let span = request_span(self.scope, &request.method, &request.path, request_id);

        async move {
            let response = self.send(&request, None, request_id).await?;
            let body: TokenResponse = read_body(response).await?.into_json()?;
            let tokens = body.into_tokens().ok_or_else(|| ApiError::Unknown {
                status: None,
                message: "login response did not include a token pair".to_string(),
            })?;
            self.tokens.set(self.scope, tokens.clone()).await;
            tracing::info!(scope = %self.scope, "logged in");
            Ok(tokens)
        }
        .instrument(span)
        .await
    }

    /// Fails with `NOT_AUTHENTICATED` when no pair is stored for this scope.
    pub async fn require_session(&self) -> ApiResult<AuthTokens> {
        self.tokens
            .get(self.scope)
            .await
            .ok_or(ApiError::NotAuthenticated)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.tokens.get(self.scope).await.is_some()
    }

    pub async fn me(&self) -> ApiResult<UserProfile> {
        self.require_session().await?;
        self.get(&self.endpoints.me).await
    }

    pub async fn change_password(&self, request: &ChangePasswordRequest) -> ApiResult<()> {
        self.require_session().await?;
        self.post::<_, serde_json::Value>(&self.endpoints.change_password, request)
            .await?;
        Ok(())
    }

    /// logout
    ///
    /// Clears this scope's tokens and notifies the backend in the background. The
    /// notification is best-effort: its outcome is only logged.
    pub async fn logout(&self) {
        let tokens = self.tokens.get(self.scope).await;
        self.tokens.clear(self.scope).await;

        let Some(tokens) = tokens else {
            return;
        };

        let notification = self
            .http
            .post(self.url(&self.endpoints.logout))
            .bearer_auth(&tokens.access_token)
            .json(&RefreshRequest {
                refresh_token: tokens.refresh_token.clone(),
            });
        let scope = self.scope;

        tokio::spawn(async move {
            match notification.send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(scope = %scope, "logout acknowledged");
                }
                Ok(response) => {
                    tracing::debug!(
                        scope = %scope,
                        status = response.status().as_u16(),
                        "logout notification rejected"
                    );
                }
                Err(e) => {
                    tracing::debug!(scope = %scope, error = %e, "logout notification failed");
                }
            }
        });
        tracing::info!(scope = %self.scope, "logged out");
    }

    // --- Transport & Refresh ---

    /// execute
    ///
    /// Sends the request with the current pair. On 401 it obtains a fresh pair through
    /// [`ApiClient::refresh_tokens`] and retries once; a second 401 is terminal.
    async fn execute(&self, request: &PreparedRequest, request_id: Uuid) -> ApiResult<Response> {
        let tokens = self.tokens.get(self.scope).await;
        let response = self.send(request, tokens.as_ref(), request_id).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::warn!(scope = %self.scope, "request unauthorized; refreshing token pair");
        let refreshed = self.refresh_tokens(tokens.as_ref()).await?;

        let retried = self.send(request, Some(&refreshed), request_id).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(scope = %self.scope, "request unauthorized after refresh");
            return Err(ApiError::AuthFailed);
        }
        Ok(retried)
    }

    async fn send(
        &self,
        request: &PreparedRequest,
        tokens: Option<&AuthTokens>,
        request_id: Uuid,
    ) -> ApiResult<Response> {
        let mut headers = request.headers.clone();
        if tokens.is_some() {
            // The scope token is the only credential sent.
            headers.remove(AUTHORIZATION);
        }

        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .headers(headers)
            .header(REQUEST_ID_HEADER, request_id.to_string());

        if let Some(tokens) = tokens {
            builder = builder.bearer_auth(&tokens.access_token);
        }

        builder = match &request.body {
            RequestBody::Empty => {
                if request.headers.contains_key(CONTENT_TYPE) {
                    builder
                } else {
                    builder.header(CONTENT_TYPE, "application/json")
                }
            }
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(payload) => builder.multipart(payload.to_form()?),
            RequestBody::Bytes { content_type, data } => {
                let builder = builder.body(data.clone());
                match content_type {
                    Some(content_type) => builder.header(CONTENT_TYPE, content_type.as_str()),
                    None => builder,
                }
            }
        };

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(error = %e, "no response from server");
            ApiError::Connection(e.to_string())
        })?;
        tracing::debug!(status = response.status().as_u16(), "response received");
        Ok(response)
    }

    /// refresh_tokens
    ///
    /// Returns a pair to retry with after a 401 that was produced by `stale`.
    ///
    /// Single-flight: the first caller installs a shared refresh future in the slot,
    /// every caller arriving while it is pending awaits that same future, and the slot
    /// is emptied once it settles. A caller whose stale token was already replaced by a
    /// finished refresh gets the stored pair without a new refresh.
    async fn refresh_tokens(&self, stale: Option<&AuthTokens>) -> ApiResult<AuthTokens> {
        let pending = {
            let mut slot = self.pending_refresh.lock().await;
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let current = self.tokens.get(self.scope).await;
                    match (current, stale) {
                        (Some(current), Some(stale)) if current.access_token != stale.access_token => {
                            tracing::debug!(scope = %self.scope, "token pair already rotated");
                            return Ok(current);
                        }
                        (Some(current), None) => return Ok(current),
                        (None, None) => return Err(ApiError::NotAuthenticated),
                        _ => {}
                    }

                    let pending = refresh_operation(
                        self.http.clone(),
                        self.url(&self.endpoints.refresh),
                        self.tokens.clone(),
                        self.scope,
                    )
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        let outcome = pending.clone().await;

        {
            let mut slot = self.pending_refresh.lock().await;
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&pending)) {
                *slot = None;
            }
        }

        outcome.ok_or(ApiError::AuthFailed)
    }
}

/// refresh_operation
///
/// The shared refresh: read the stored refresh token, exchange it at the scope's refresh
/// endpoint and persist the new pair. Resolves to `None` when there is nothing to refresh
/// with or the exchange fails. A rejected or malformed exchange ends the session, so the
/// scope's pair is cleared; an unreachable endpoint leaves it in place.
fn refresh_operation(
    http: reqwest::Client,
    url: String,
    tokens: TokenState,
    scope: AuthScope,
) -> BoxFuture<'static, Option<AuthTokens>> {
    async move {
        let Some(current) = tokens.get(scope).await else {
            tracing::warn!(scope = %scope, "no refresh token stored");
            return None;
        };

        tracing::info!(scope = %scope, "refreshing token pair");
        match exchange_refresh_token(&http, &url, &current.refresh_token).await {
            RefreshOutcome::Refreshed(pair) => {
                tokens.set(scope, pair.clone()).await;
                tracing::info!(scope = %scope, "token pair refreshed");
                Some(pair)
            }
            RefreshOutcome::Rejected(status) => {
                tracing::warn!(scope = %scope, status = status.as_u16(), "refresh rejected");
                tokens.clear(scope).await;
                None
            }
            RefreshOutcome::Malformed => {
                tracing::warn!(scope = %scope, "refresh response missing a token");
                tokens.clear(scope).await;
                None
            }
            RefreshOutcome::Unreachable(error) => {
                tracing::warn!(scope = %scope, error = %error, "refresh endpoint unreachable");
                None
            }
        }
    }
    .boxed()
}

async fn exchange_refresh_token(
    http: &reqwest::Client,
    url: &str,
    refresh_token: &str,
) -> RefreshOutcome {
    let response = match http
        .post(url)
        .json(&RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return RefreshOutcome::Unreachable(e.to_string()),
    };

    let status = response.status();
    if !status.is_success() {
        return RefreshOutcome::Rejected(status);
    }

    match response.json::<TokenResponse>().await {
        Ok(body) => body
            .into_tokens()
            .map(RefreshOutcome::Refreshed)
            .unwrap_or(RefreshOutcome::Malformed),
        Err(_) => RefreshOutcome::Malformed,
    }
}

/// read_body
///
/// Consumes a response into a `ResponseBody` or the typed failure for its status.
async fn read_body<T: DeserializeOwned>(response: Response) -> ApiResult<ResponseBody<T>> {
    let status = response.status();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(is_json_content_type);
    let text = response
        .text()
        .await
        .map_err(|e| ApiError::Connection(e.to_string()))?;

    if !status.is_success() {
        let error = ApiError::from_response(status, &text);
        tracing::warn!(status = status.as_u16(), kind = %error.kind(), "request failed");
        return Err(error);
    }

    if !is_json {
        return Ok(ResponseBody::Text(text));
    }

    let raw = if text.trim().is_empty() { "null" } else { text.as_str() };
    serde_json::from_str(raw)
        .map(ResponseBody::Json)
        .map_err(|e| ApiError::Unknown {
            status: Some(status.as_u16()),
            message: format!("failed to decode response body: {}", e),
        })
}

fn is_json_content_type(value: &str) -> bool {
    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

/// request_span
///
/// Every log line for one logical request (including its retry) carries the same
/// `req_id`, which is also sent as `x-request-id`.
fn request_span(scope: AuthScope, method: &Method, path: &str, request_id: Uuid) -> Span {
    tracing::info_span!(
        "api_request",
        scope = %scope,
        method = %method,
        path = %path,
        req_id = %request_id,
    )
}
