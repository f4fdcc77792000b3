mod error;
mod secure_store;
mod session_store;

pub use error::StoreError;
pub use secure_store::{get_json, set_json, FileSecureStore, MemorySecureStore, SecureStore};
pub use session_store::{SessionStatus, SessionStore, AUTH_SESSION_KEY};
