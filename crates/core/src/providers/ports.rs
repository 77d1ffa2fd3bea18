//! Provider adapter interface
//!
//! One capability set normalizing authorization, profile lookup, listing,
//! and download across every supported provider. Each variant is a plain
//! implementation of this trait selected by provider tag; there is no
//! type hierarchy beyond the trait itself.

use std::sync::Arc;

use async_trait::async_trait;
use orbit_domain::{
    AccountProfile, Provider, ProviderCredentials, ProviderError, RemoteItem,
};

/// Tokens returned by a code exchange or refresh
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Absent when the provider does not issue (or rotate) refresh tokens.
    pub refresh_token: Option<String>,
    pub expires_in_secs: i64,
}

/// One page of listed remote items.
///
/// The continuation token is opaque to every caller: one provider's token
/// is a bare string, another's a full next-page URL. Callers thread it
/// back unchanged; only the adapter that issued it may interpret it.
#[derive(Debug, Clone)]
pub struct ItemPage {
    pub items: Vec<RemoteItem>,
    pub next_continuation: Option<String>,
}

/// Downloaded item content
#[derive(Debug, Clone)]
pub struct DownloadedItem {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Trait for provider operations
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The provider tag this adapter serves.
    fn provider(&self) -> Provider;

    /// Build the browser authorization URL for the OAuth2 code flow.
    fn build_authorization_url(
        &self,
        creds: &ProviderCredentials,
        state: &str,
    ) -> Result<String, ProviderError>;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(
        &self,
        creds: &ProviderCredentials,
        code: &str,
    ) -> Result<TokenGrant, ProviderError>;

    /// Fetch the linked account's profile (best-effort; callers tolerate a
    /// missing email).
    async fn fetch_account_profile(
        &self,
        access_token: &str,
    ) -> Result<AccountProfile, ProviderError>;

    /// Obtain a fresh access token from a refresh token.
    async fn refresh_access_token(
        &self,
        creds: &ProviderCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant, ProviderError>;

    /// List one page of remote items, resuming from an adapter-issued
    /// continuation token.
    async fn list_items(
        &self,
        access_token: &str,
        continuation: Option<&str>,
    ) -> Result<ItemPage, ProviderError>;

    /// Download one listed item's content.
    async fn download_item(
        &self,
        access_token: &str,
        item: &RemoteItem,
    ) -> Result<DownloadedItem, ProviderError>;

    /// List remote calendars as (provider calendar id, display name).
    /// File-storage providers have none.
    async fn list_calendars(
        &self,
        _access_token: &str,
    ) -> Result<Vec<(String, String)>, ProviderError> {
        Ok(Vec::new())
    }

    /// Verify a username + app-password pair against the provider.
    /// Only the CalDAV variant supports this.
    async fn probe_credentials(
        &self,
        _username: &str,
        _password: &str,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::unknown("credential probe not supported by this provider"))
    }

    /// Best-effort remote token revocation. Default is a no-op.
    async fn revoke_token(
        &self,
        _creds: &ProviderCredentials,
        _access_token: &str,
    ) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Resolves the adapter for a provider tag
pub trait AdapterRegistry: Send + Sync {
    /// The adapter registered for `provider`, if any.
    fn adapter(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>>;
}
