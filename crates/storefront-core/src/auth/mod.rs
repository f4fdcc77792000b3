mod bridge;
mod service;
pub(crate) mod session;

pub use bridge::{BridgeError, TokenProvider, TokenUpdater, UnauthorizedHandler};
pub use service::AuthService;
pub use session::{
    AuthSession, Credentials, LoginRequest, MePayload, RegisterRequest, TokenPair, TokenSnapshot,
    User,
};
