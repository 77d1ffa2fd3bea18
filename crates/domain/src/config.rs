//! Configuration structures
//!
//! Plain data loaded by the infra config loader from environment variables
//! or a JSON/TOML file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::{
    SYNC_LEASE_TTL_SECS, SYNC_MAX_CONCURRENT_CONNECTIONS, TOKEN_REFRESH_MARGIN_SECS,
};
use crate::types::connection::Provider;

/// Credential vault configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Server-held master secret; validated once at startup (length >= 32).
    pub master_secret: String,
}

/// OAuth client registration for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Server base URL for self-hosted providers (CalDAV); unused by the
    /// hosted OAuth providers.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Sync orchestration tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_connections: usize,
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: i64,
    #[serde(default = "default_refresh_margin")]
    pub token_refresh_margin_secs: i64,
    /// Optional org-level prefix prepended to every destination key.
    #[serde(default)]
    pub destination_prefix_override: Option<String>,
}

const fn default_max_concurrent() -> usize {
    SYNC_MAX_CONCURRENT_CONNECTIONS
}

const fn default_lease_ttl() -> i64 {
    SYNC_LEASE_TTL_SECS
}

const fn default_refresh_margin() -> i64 {
    TOKEN_REFRESH_MARGIN_SECS
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_concurrent_connections: default_max_concurrent(),
            lease_ttl_secs: default_lease_ttl(),
            token_refresh_margin_secs: default_refresh_margin(),
            destination_prefix_override: None,
        }
    }
}

/// Top-level integrations configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub vault: VaultConfig,
    /// Client registrations keyed by provider tag. Providers without an
    /// entry fail linking with a configuration error before any network
    /// call.
    #[serde(default)]
    pub providers: HashMap<Provider, ProviderCredentials>,
    #[serde(default)]
    pub sync: SyncSettings,
}

impl IntegrationConfig {
    /// Registered credentials for a provider, if any.
    #[must_use]
    pub fn credentials(&self, provider: Provider) -> Option<&ProviderCredentials> {
        self.providers.get(&provider)
    }
}
