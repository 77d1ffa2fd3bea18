//! Shared HTTP client construction
//!
//! One place to pick timeouts and the user agent so every adapter behaves
//! the same on the wire.

use std::time::Duration;

use reqwest::Client;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("orbit/", env!("CARGO_PKG_VERSION"));

/// Build the client used by every provider adapter.
#[must_use]
pub fn default_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Read a response body for error reporting, tolerating read failures.
pub async fn body_for_error(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string())
}
