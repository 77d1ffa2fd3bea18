//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified provider failure, normalized from provider-specific HTTP and
/// error shapes by the adapter that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub retryable: bool,
    pub message: String,
}

/// Failure classes every adapter maps into, regardless of provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderErrorKind {
    AuthExpired,
    RateLimited,
    NotFound,
    Unknown,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, retryable: bool, message: impl Into<String>) -> Self {
        Self { kind, retryable, message: message.into() }
    }

    /// Non-retryable unknown failure.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unknown, false, message)
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} (retryable: {}): {}", self.kind, self.retryable, self.message)
    }
}

/// Main error type for Orbit
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum OrbitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid link state: {0}")]
    InvalidState(String),

    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ProviderError> for OrbitError {
    fn from(err: ProviderError) -> Self {
        match err.kind {
            ProviderErrorKind::AuthExpired => Self::AuthExpired(err.message),
            _ => Self::Provider(err),
        }
    }
}

/// Result type alias for Orbit operations
pub type Result<T> = std::result::Result<T, OrbitError>;
