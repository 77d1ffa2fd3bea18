//! Provider error normalization
//!
//! Every adapter funnels provider-specific HTTP and error shapes through
//! these helpers so callers only ever see the uniform
//! [`ProviderError`](orbit_domain::ProviderError) taxonomy.

use orbit_domain::{ProviderError, ProviderErrorKind};
use reqwest::StatusCode;

/// Classify a non-success HTTP status into the uniform taxonomy.
///
/// 401/403 mean the token is no longer honored; 404/410 mean the target is
/// gone; 429 and 5xx are transient.
#[must_use]
pub fn classify_status(status: StatusCode, context: &str, body: &str) -> ProviderError {
    let message = if body.trim().is_empty() {
        format!("{context}: HTTP {status}")
    } else {
        format!("{context}: HTTP {status}: {body}")
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::new(ProviderErrorKind::AuthExpired, false, message)
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            ProviderError::new(ProviderErrorKind::NotFound, false, message)
        }
        StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::new(ProviderErrorKind::RateLimited, true, message)
        }
        status if status.is_server_error() => {
            ProviderError::new(ProviderErrorKind::Unknown, true, message)
        }
        _ => ProviderError::new(ProviderErrorKind::Unknown, false, message),
    }
}

/// Wrap a transport-level failure. Timeouts and connection resets are
/// retryable; everything else is not.
#[must_use]
pub fn network_error(err: &reqwest::Error, context: &str) -> ProviderError {
    let retryable = err.is_timeout() || err.is_connect();
    ProviderError::new(ProviderErrorKind::Unknown, retryable, format!("{context}: {err}"))
}

/// Wrap a malformed response body.
#[must_use]
pub fn parse_error(err: impl std::fmt::Display, context: &str) -> ProviderError {
    ProviderError::new(
        ProviderErrorKind::Unknown,
        false,
        format!("{context}: failed to parse response: {err}"),
    )
}
