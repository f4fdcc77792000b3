//! Authenticated HTTP client core shared by storefront front-ends.
//!
//! [`http::ApiClient`] attaches bearer tokens, retries transient failures, refreshes an
//! expired session once for all concurrent callers and lets callers cancel requests by id.
//! [`store::SessionStore`] owns the durable session and plugs into the client through the
//! token bridge traits in [`auth`].

pub mod auth;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod services;
pub mod store;
mod utils;

pub use config::ClientConfig;
pub use error::{ApiError, ApiResult, ErrorKind};
pub use http::{ApiClient, HttpClient};
pub use store::SessionStore;
