//! Single-flight access-token refresh.
//!
//! The first request that needs a refresh becomes the leader and performs the refresh call;
//! requests that need one while it is in flight queue behind the gate and receive the leader's
//! outcome in arrival order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::auth::session::TokenFields;
use crate::auth::TokenPair;
use crate::endpoints;
use crate::error::{ApiError, ApiResult, ErrorBody};
use crate::utils::lock;

use super::client::{classify_transport, resolve_url, Inner};
use super::request::error_from_response;

const REFRESH_REJECTED_MESSAGE: &str = "No se pudo renovar la sesion";

pub(crate) type RefreshOutcome = ApiResult<TokenPair>;

/// Role handed out by [`RefreshGate::enter`].
pub(crate) enum Ticket {
    /// The caller must perform the refresh and then call [`RefreshGate::release`].
    Leader,
    /// A refresh is already running; the receiver yields its outcome.
    Follower(oneshot::Receiver<RefreshOutcome>),
}

#[derive(Default)]
struct GateState {
    refreshing: bool,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

/// Refresh flag and waiter queue guarded as one unit.
///
/// The queue is empty whenever the flag is clear and only grows while it is set.
#[derive(Default)]
pub(crate) struct RefreshGate {
    state: Mutex<GateState>,
}

impl RefreshGate {
    pub fn enter(&self) -> Ticket {
        let mut state = lock(&self.state);
        if state.refreshing {
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            Ticket::Follower(rx)
        } else {
            state.refreshing = true;
            Ticket::Leader
        }
    }

    /// Clear the flag and hand `outcome` to every queued waiter, oldest first.
    ///
    /// Both happen under the same lock, so no waiter can be enqueued between the two.
    pub fn release(&self, outcome: &RefreshOutcome) -> usize {
        let mut state = lock(&self.state);
        state.refreshing = false;
        let waiters = std::mem::take(&mut state.waiters);
        let count = waiters.len();
        for waiter in waiters {
            // A waiter whose request was cancelled has dropped its receiver.
            let _ = waiter.send(outcome.clone());
        }
        count
    }

    pub fn is_refreshing(&self) -> bool {
        lock(&self.state).refreshing
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        lock(&self.state).waiters.len()
    }
}

/// Held by the leader for the duration of a refresh.
///
/// If the leader unwinds before releasing, dropping the guard releases the gate with
/// `SESSION_EXPIRED` so queued requests are not stranded. Once released it does nothing,
/// so a later leader's queue is never touched.
pub(crate) struct LeaderGuard<'a> {
    gate: &'a RefreshGate,
    released: bool,
}

impl<'a> LeaderGuard<'a> {
    pub fn new(gate: &'a RefreshGate) -> Self {
        Self {
            gate,
            released: false,
        }
    }

    pub fn release(&mut self, outcome: &RefreshOutcome) -> usize {
        self.released = true;
        self.gate.release(outcome)
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            warn!("token refresh aborted before completion; rejecting queued requests");
            self.gate.release(&Err(ApiError::session_expired()));
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    data: Option<TokenFields>,
}

impl Inner {
    /// Perform the refresh as gate leader: commit the outcome, release the queue and fire the
    /// unauthorized callback on failure.
    pub(super) async fn run_refresh(self: Arc<Self>) -> RefreshOutcome {
        info!("access token rejected; refreshing session");
        let mut guard = LeaderGuard::new(&self.gate);
        let tokens = self.current_tokens().await;
        let outcome = match tokens.refresh_token() {
            Some(refresh_token) => self.call_refresh_endpoint(refresh_token).await,
            None => Err(ApiError::missing_refresh_token()),
        };

        match outcome {
            Ok(pair) => {
                self.persist_tokens(Some(pair.clone())).await;
                let released = guard.release(&Ok(pair.clone()));
                info!(queued = released, "session refreshed");
                Ok(pair)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed; clearing session");
                self.persist_tokens(None).await;
                let expired = ApiError::session_expired();
                let released = guard.release(&Err(expired.clone()));
                debug!(queued = released, "rejected queued requests");
                self.notify_unauthorized();
                Err(expired)
            }
        }
    }

    /// Exchange the refresh token for a new pair, outside the normal request pipeline.
    async fn call_refresh_endpoint(&self, refresh_token: &str) -> RefreshOutcome {
        let url = resolve_url(&self.config.base_url, endpoints::auth::REFRESH)?;
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(refresh_token)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(classify_transport)?;
        if !status.is_success() {
            return Err(error_from_response(status, &body));
        }

        let payload: RefreshResponse = serde_json::from_slice(&body)
            .map_err(|err| ApiError::InvalidResponse(err.to_string()))?;
        payload
            .data
            .and_then(TokenFields::into_pair)
            .ok_or_else(|| ApiError::Unauthorized(ErrorBody::new(REFRESH_REJECTED_MESSAGE)))
    }
}
