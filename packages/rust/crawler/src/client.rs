//! Shared HTTP client construction.

use reqwest::Client;

use paperboy_shared::{FetchConfig, PaperboyError, Result};

/// User-Agent string for every outbound request.
pub const USER_AGENT: &str = concat!("Paperboy/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects followed per request.
const MAX_REDIRECTS: usize = 5;

/// Build the client used for discovery, extraction, and downloads.
///
/// Every request is bounded by `config.timeout`.
pub fn build_client(config: &FetchConfig) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(config.timeout)
        .build()
        .map_err(|e| PaperboyError::Network(format!("failed to build HTTP client: {e}")))
}
