use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{TokenPair, TokenProvider, TokenSnapshot, TokenUpdater, UnauthorizedHandler};
use crate::config::ClientConfig;
use crate::endpoints::is_auth_endpoint;
use crate::error::{ApiError, ApiResult};
use crate::utils::lock;

use super::cancel::CancellationRegistry;
use super::refresh::{RefreshGate, Ticket};
use super::request::{error_from_response, ApiResponse, RequestConfig};

pub const CLIENT_TYPE_HEADER: &str = "x-client-type";
pub const CLIENT_TYPE: &str = "mobile";
const USER_AGENT: &str = "storefront-rs/0.1.0";

#[derive(Clone, Default)]
struct Bridge {
    provider: Option<Arc<dyn TokenProvider>>,
    updater: Option<Arc<dyn TokenUpdater>>,
    unauthorized: Option<Arc<dyn UnauthorizedHandler>>,
}

pub(crate) struct Inner {
    pub(super) http: Client,
    pub(super) config: ClientConfig,
    tokens: Mutex<TokenSnapshot>,
    bridge: RwLock<Bridge>,
    pub(super) gate: RefreshGate,
    registry: CancellationRegistry,
}

/// HTTP client that authenticates requests, retries transient failures and refreshes expired
/// sessions.
///
/// Cloning is cheap; clones share tokens, refresh state and the cancellation registry.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url)
            .field("retry_attempts", &self.inner.config.retry_attempts)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        Url::parse(&config.base_url).map_err(|err| {
            ApiError::InvalidRequest(format!("invalid base URL '{}': {err}", config.base_url))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static(CLIENT_TYPE_HEADER),
            HeaderValue::from_static(CLIENT_TYPE),
        );

        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| ApiError::InvalidRequest(err.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                tokens: Mutex::new(TokenSnapshot::empty()),
                bridge: RwLock::new(Bridge::default()),
                gate: RefreshGate::default(),
                registry: CancellationRegistry::default(),
            }),
        })
    }

    /// Seed the token cache, typically while hydrating a persisted session.
    pub fn set_auth_tokens(&self, tokens: TokenSnapshot) {
        *lock(&self.inner.tokens) = tokens;
    }

    /// Last tokens seen by the client.
    pub fn auth_tokens(&self) -> TokenSnapshot {
        self.inner.cached_tokens()
    }

    pub fn set_token_provider(&self, provider: Arc<dyn TokenProvider>) {
        self.inner.update_bridge(|bridge| bridge.provider = Some(provider));
    }

    pub fn set_token_updater(&self, updater: Arc<dyn TokenUpdater>) {
        self.inner.update_bridge(|bridge| bridge.updater = Some(updater));
    }

    pub fn set_on_unauthorized(&self, handler: Arc<dyn UnauthorizedHandler>) {
        self.inner
            .update_bridge(|bridge| bridge.unauthorized = Some(handler));
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.gate.is_refreshing()
    }

    /// Number of requests currently registered for cancellation.
    pub fn in_flight(&self) -> usize {
        self.inner.registry.len()
    }

    /// Issue a request. When `request_id` is given the call can be aborted with
    /// [`ApiClient::cancel_request`] until it settles.
    pub async fn request(
        &self,
        config: RequestConfig,
        request_id: Option<&str>,
    ) -> ApiResult<ApiResponse> {
        let registration = request_id.map(|id| self.inner.registry.register(id));
        let cancel = registration.as_ref().map(|entry| entry.token().clone());
        let result = self.inner.send_with_retry(&config, cancel.as_ref()).await;
        drop(registration);
        result
    }

    pub fn cancel_request(&self, request_id: &str) -> bool {
        self.inner.registry.cancel(request_id)
    }

    pub fn cancel_all_requests(&self) -> usize {
        self.inner.registry.cancel_all()
    }
}

impl Inner {
    fn update_bridge<F>(&self, apply: F)
    where
        F: FnOnce(&mut Bridge),
    {
        let mut bridge = self.bridge.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut bridge);
    }

    fn bridge(&self) -> Bridge {
        self.bridge
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn cached_tokens(&self) -> TokenSnapshot {
        lock(&self.tokens).clone()
    }

    /// Tokens from the provider, or the cache when there is no provider or it fails.
    pub(super) async fn current_tokens(&self) -> TokenSnapshot {
        let Some(provider) = self.bridge().provider else {
            return self.cached_tokens();
        };
        match provider.tokens().await {
            Ok(tokens) => {
                *lock(&self.tokens) = tokens.clone();
                tokens
            }
            Err(err) => {
                warn!(error = %err, "token provider failed; falling back to cached tokens");
                self.cached_tokens()
            }
        }
    }

    /// Commit refreshed tokens (or clear them) locally and through the updater.
    pub(super) async fn persist_tokens(&self, tokens: Option<TokenPair>) {
        *lock(&self.tokens) = TokenSnapshot::from(tokens.clone());
        if let Some(updater) = self.bridge().updater {
            if let Err(err) = updater.update(tokens).await {
                warn!(error = %err, "token updater failed");
            }
        }
    }

    pub(super) fn notify_unauthorized(&self) {
        if let Some(handler) = self.bridge().unauthorized {
            handler.on_unauthorized();
        }
    }

    async fn send_with_retry(
        self: &Arc<Self>,
        config: &RequestConfig,
        cancel: Option<&CancellationToken>,
    ) -> ApiResult<ApiResponse> {
        let attempts = self.config.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.execute(config, cancel).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < attempts && err.is_retryable() => {
                    warn!(
                        method = %config.method,
                        url = %config.url,
                        attempt,
                        error = %err,
                        "request failed; retrying"
                    );
                    with_cancel(cancel, tokio::time::sleep(self.config.retry_delay)).await?;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute(
        self: &Arc<Self>,
        config: &RequestConfig,
        cancel: Option<&CancellationToken>,
    ) -> ApiResult<ApiResponse> {
        let tokens = self.current_tokens().await;
        let err = match self.dispatch(config, tokens.access_token(), cancel).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        if !matches!(err, ApiError::Unauthorized(_)) {
            return Err(err);
        }
        if is_auth_endpoint(&config.url) {
            debug!(url = %config.url, "authentication endpoint rejected the request");
            self.notify_unauthorized();
            return Err(err);
        }
        self.refresh_and_replay(config, cancel).await
    }

    /// Obtain fresh tokens through the gate, then replay `config` once with them.
    ///
    /// The replay never re-enters the refresh path: a second 401 is returned as is.
    async fn refresh_and_replay(
        self: &Arc<Self>,
        config: &RequestConfig,
        cancel: Option<&CancellationToken>,
    ) -> ApiResult<ApiResponse> {
        let tokens = match self.gate.enter() {
            Ticket::Leader => {
                // Spawned so that cancelling this request cannot strand the gate.
                let task = tokio::spawn(Arc::clone(self).run_refresh());
                match with_cancel(cancel, task).await? {
                    Ok(outcome) => outcome?,
                    Err(err) => {
                        // The task's leader guard has already released the gate.
                        warn!(error = %err, "token refresh task failed");
                        return Err(ApiError::session_expired());
                    }
                }
            }
            Ticket::Follower(waiter) => {
                debug!(url = %config.url, "waiting for in-flight token refresh");
                with_cancel(cancel, waiter)
                    .await?
                    .unwrap_or_else(|_| Err(ApiError::session_expired()))?
            }
        };

        debug!(method = %config.method, url = %config.url, "replaying request with refreshed token");
        self.dispatch(config, Some(&tokens.access_token), cancel)
            .await
    }

    async fn dispatch(
        &self,
        config: &RequestConfig,
        access_token: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> ApiResult<ApiResponse> {
        let url = resolve_url(&self.config.base_url, &config.url)?;
        let mut builder = self.http.request(config.method.clone(), url);
        if !config.query.is_empty() {
            builder = builder.query(&config.query);
        }
        for (name, value) in config
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(AUTHORIZATION.as_str()))
        {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &config.body {
            builder = builder.json(body);
        }

        debug!(method = %config.method, url = %config.url, "sending request");
        let response = with_cancel(cancel, builder.send())
            .await?
            .map_err(classify_transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = with_cancel(cancel, response.bytes())
            .await?
            .map_err(classify_transport)?;

        if !status.is_success() {
            debug!(status = status.as_u16(), url = %config.url, "request rejected");
            return Err(error_from_response(status, &body));
        }
        Ok(ApiResponse::new(status, headers, body.to_vec()))
    }
}

/// Race `future` against the request's cancellation handle, if it has one.
async fn with_cancel<F>(cancel: Option<&CancellationToken>, future: F) -> ApiResult<F::Output>
where
    F: Future,
{
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(ApiError::cancelled()),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}

/// Join a relative path onto the base URL; absolute URLs pass through unchanged.
pub(super) fn resolve_url(base: &str, path: &str) -> ApiResult<Url> {
    let raw = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_owned()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };
    Url::parse(&raw).map_err(|err| ApiError::InvalidRequest(format!("invalid URL '{raw}': {err}")))
}

/// Failures where no response was received.
pub(super) fn classify_transport(err: reqwest::Error) -> ApiError {
    if err.is_builder() {
        return ApiError::InvalidRequest(err.to_string());
    }
    debug!(error = %err, timeout = err.is_timeout(), "transport failure");
    ApiError::network()
}
