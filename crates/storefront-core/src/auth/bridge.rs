use async_trait::async_trait;
use thiserror::Error;

use crate::store::StoreError;

use super::{TokenPair, TokenSnapshot};

/// Failure reported by a session authority while serving the HTTP client.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("session authority unavailable")]
    Unavailable,
}

/// Supplies the tokens attached to each outgoing request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn tokens(&self) -> Result<TokenSnapshot, BridgeError>;
}

/// Receives refreshed tokens, or `None` when the session must be torn down.
#[async_trait]
pub trait TokenUpdater: Send + Sync {
    async fn update(&self, tokens: Option<TokenPair>) -> Result<(), BridgeError>;
}

/// Notified when the session is irrecoverably invalid.
pub trait UnauthorizedHandler: Send + Sync {
    fn on_unauthorized(&self);
}

impl<F> UnauthorizedHandler for F
where
    F: Fn() + Send + Sync,
{
    fn on_unauthorized(&self) {
        self()
    }
}
