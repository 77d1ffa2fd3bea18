//! Provider adapter implementations
//!
//! Six variants behind the one [`ProviderAdapter`] capability trait, each
//! normalizing its provider's authorization, listing, and download
//! protocols. Selection is by provider tag through [`create_adapter`];
//! there is no hierarchy between variants.

pub mod dropbox;
pub mod google_calendar;
pub mod google_drive;
pub mod nextcloud;
pub mod onedrive;
pub mod outlook_calendar;

use std::collections::HashMap;
use std::sync::Arc;

use orbit_core::providers::ports::{AdapterRegistry, ProviderAdapter, TokenGrant};
use orbit_domain::{IntegrationConfig, OrbitError, Provider, Result};
use serde::Deserialize;
use tracing::warn;

/// Create an adapter instance by provider tag.
///
/// # Errors
/// Returns `OrbitError::Config` when the provider needs configuration the
/// caller did not supply (Nextcloud requires a server base URL).
pub fn create_adapter(
    provider: Provider,
    config: &IntegrationConfig,
) -> Result<Arc<dyn ProviderAdapter>> {
    match provider {
        Provider::GoogleCalendar => Ok(Arc::new(google_calendar::GoogleCalendarAdapter::new())),
        Provider::OutlookCalendar => Ok(Arc::new(outlook_calendar::OutlookCalendarAdapter::new())),
        Provider::GoogleDrive => Ok(Arc::new(google_drive::GoogleDriveAdapter::new())),
        Provider::OneDrive => Ok(Arc::new(onedrive::OneDriveAdapter::new())),
        Provider::Dropbox => Ok(Arc::new(dropbox::DropboxAdapter::new())),
        Provider::Nextcloud => {
            let base_url = config
                .credentials(Provider::Nextcloud)
                .and_then(|creds| creds.base_url.clone())
                .ok_or_else(|| {
                    OrbitError::Config("nextcloud requires a server base URL".to_string())
                })?;
            Ok(Arc::new(nextcloud::NextcloudAdapter::new(base_url)))
        }
    }
}

/// Registry built once from configuration.
///
/// Providers that fail construction (missing required configuration) are
/// simply absent; linking them surfaces a configuration error.
pub struct ConfiguredAdapterRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ConfiguredAdapterRegistry {
    #[must_use]
    pub fn from_config(config: &IntegrationConfig) -> Self {
        let mut adapters = HashMap::new();
        for provider in Provider::all() {
            match create_adapter(provider, config) {
                Ok(adapter) => {
                    adapters.insert(provider, adapter);
                }
                Err(err) => {
                    warn!(provider = %provider, error = %err, "adapter not registered");
                }
            }
        }
        Self { adapters }
    }
}

impl AdapterRegistry for ConfiguredAdapterRegistry {
    fn adapter(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }
}

/// Standard OAuth 2.0 token endpoint response (RFC 6749).
#[derive(Debug, Deserialize)]
pub(crate) struct OAuthTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl From<OAuthTokenResponse> for TokenGrant {
    fn from(response: OAuthTokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in_secs: response.expires_in.unwrap_or(3600),
        }
    }
}

/// Build an authorization URL from standard code-flow parameters.
pub(crate) fn build_oauth_url(
    endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[&str],
    state: &str,
    extra_params: &[(&str, &str)],
) -> String {
    let scope_string = scopes.join(" ");
    let mut params = vec![
        ("response_type", "code"),
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("scope", &scope_string),
        ("state", state),
    ];
    params.extend_from_slice(extra_params);

    let query_string = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{endpoint}?{query_string}")
}
