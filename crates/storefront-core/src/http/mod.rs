mod cancel;
mod client;
mod facade;
mod refresh;
mod request;

pub use client::{ApiClient, CLIENT_TYPE, CLIENT_TYPE_HEADER};
pub use facade::HttpClient;
pub use request::{ApiResponse, Envelope, RequestConfig};
pub(crate) use request::to_body;
