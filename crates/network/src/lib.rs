//! Shared JSON-over-HTTP transport for the stakebridge services. Wraps
//! `reqwest` with a request timeout and optional bearer/basic authentication.

pub mod config;
pub mod error;
pub mod http_client;

pub use config::{Config, DEFAULT_TIMEOUT_SECS};
pub use error::{HttpError, Result};
pub use http_client::HttpClient;

pub fn client() -> Result<HttpClient> {
    HttpClient::new(Config::default())
}
