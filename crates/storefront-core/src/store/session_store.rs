use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auth::{
    AuthSession, BridgeError, TokenPair, TokenProvider, TokenSnapshot, TokenUpdater,
    UnauthorizedHandler, User,
};
use crate::http::ApiClient;
use crate::utils::lock;

use super::{get_json, set_json, SecureStore, StoreError};

/// Secure-store key holding the persisted session.
pub const AUTH_SESSION_KEY: &str = "auth_session_v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Hydrating,
    Authenticated,
    Guest,
}

#[derive(Debug, Default)]
struct SessionState {
    user: Option<User>,
    tokens: TokenSnapshot,
}

/// Owner of the durable session; the only writer of the client's tokens outside a refresh.
pub struct SessionStore {
    storage: Arc<dyn SecureStore>,
    client: ApiClient,
    state: Mutex<SessionState>,
    status: watch::Sender<SessionStatus>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SecureStore>, client: ApiClient) -> Arc<Self> {
        let (status, _) = watch::channel(SessionStatus::Idle);
        Arc::new(Self {
            storage,
            client,
            state: Mutex::new(SessionState::default()),
            status,
        })
    }

    /// Install this store as the client's token provider, updater and unauthorized handler.
    pub fn attach(self: &Arc<Self>) {
        let bridge = Arc::new(StoreBridge {
            store: Arc::downgrade(self),
        });
        self.client.set_token_provider(bridge.clone());
        self.client.set_token_updater(bridge.clone());
        self.client.set_on_unauthorized(bridge);
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Observe status transitions, e.g. to react to a forced sign-out.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn user(&self) -> Option<User> {
        lock(&self.state).user.clone()
    }

    pub fn tokens(&self) -> TokenSnapshot {
        lock(&self.state).tokens.clone()
    }

    /// Load the persisted session, if any, and seed the client with its tokens.
    pub async fn hydrate(&self) -> Result<SessionStatus, StoreError> {
        self.status.send_replace(SessionStatus::Hydrating);
        let stored = get_json::<AuthSession>(self.storage.as_ref(), AUTH_SESSION_KEY).await;
        match stored {
            Ok(Some(session)) => {
                debug!(user_id = %session.user.id, "restored persisted session");
                self.apply(session);
                Ok(SessionStatus::Authenticated)
            }
            Ok(None) => {
                self.reset();
                Ok(SessionStatus::Guest)
            }
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }

    pub async fn set_session(&self, session: AuthSession) -> Result<(), StoreError> {
        set_json(self.storage.as_ref(), AUTH_SESSION_KEY, &session).await?;
        info!(user_id = %session.user.id, "session established");
        self.apply(session);
        Ok(())
    }

    /// Replace the tokens of the current session. Ignored when nobody is signed in.
    pub async fn update_tokens(&self, tokens: TokenPair) -> Result<(), StoreError> {
        let Some(user) = self.user() else {
            debug!("ignoring token update without a signed-in user");
            return Ok(());
        };
        let session = AuthSession { user, tokens };
        set_json(self.storage.as_ref(), AUTH_SESSION_KEY, &session).await?;
        self.apply(session);
        Ok(())
    }

    /// Forget the session locally and in secure storage.
    pub async fn clear_session(&self) -> Result<(), StoreError> {
        let deleted = self.storage.delete(AUTH_SESSION_KEY).await;
        self.reset();
        info!("session cleared");
        deleted
    }

    pub async fn sign_out(&self) -> Result<(), StoreError> {
        self.clear_session().await
    }

    fn apply(&self, session: AuthSession) {
        let tokens = TokenSnapshot::from(session.tokens);
        self.client.set_auth_tokens(tokens.clone());
        {
            let mut state = lock(&self.state);
            state.user = Some(session.user);
            state.tokens = tokens;
        }
        self.status.send_replace(SessionStatus::Authenticated);
    }

    fn reset(&self) {
        self.client.set_auth_tokens(TokenSnapshot::empty());
        *lock(&self.state) = SessionState::default();
        self.status.send_replace(SessionStatus::Guest);
    }
}

/// Client-facing view of a [`SessionStore`]; weak so the client does not keep the store alive.
struct StoreBridge {
    store: Weak<SessionStore>,
}

#[async_trait]
impl TokenProvider for StoreBridge {
    async fn tokens(&self) -> Result<TokenSnapshot, BridgeError> {
        self.store
            .upgrade()
            .map(|store| store.tokens())
            .ok_or(BridgeError::Unavailable)
    }
}

#[async_trait]
impl TokenUpdater for StoreBridge {
    async fn update(&self, tokens: Option<TokenPair>) -> Result<(), BridgeError> {
        let Some(store) = self.store.upgrade() else {
            return Ok(());
        };
        match tokens {
            Some(pair) => store.update_tokens(pair).await?,
            None => store.clear_session().await?,
        }
        Ok(())
    }
}

impl UnauthorizedHandler for StoreBridge {
    fn on_unauthorized(&self) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = store.clear_session().await {
                        warn!(error = %err, "failed to clear session after authorization failure");
                    }
                });
            }
            Err(_) => warn!("no async runtime available; session left in place"),
        }
    }
}
