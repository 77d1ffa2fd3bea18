//! OneDrive (Microsoft Graph) file-storage adapter
//!
//! OAuth2 file storage. Graph paginates drive children with
//! `@odata.nextLink` — a full next-page URL used verbatim as the
//! continuation token.

use async_trait::async_trait;
use orbit_core::providers::ports::{DownloadedItem, ItemPage, ProviderAdapter, TokenGrant};
use orbit_domain::{
    AccountProfile, Provider, ProviderCredentials, ProviderError, RemoteItem,
};
use reqwest::Client;
use serde::Deserialize;

use super::{build_oauth_url, OAuthTokenResponse};
use crate::errors::{classify_status, network_error, parse_error};
use crate::http::{body_for_error, default_client};

const AUTH_ENDPOINT: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const TOKEN_ENDPOINT: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

const SCOPES: &[&str] = &["offline_access", "Files.Read", "User.Read"];

/// OneDrive provider adapter
pub struct OneDriveAdapter {
    client: Client,
    token_endpoint: String,
    graph_base: String,
}

impl OneDriveAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: default_client(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            graph_base: GRAPH_BASE.to_string(),
        }
    }

    /// Point every endpoint at a test server.
    #[must_use]
    pub fn with_base_url(base: &str) -> Self {
        Self {
            client: default_client(),
            token_endpoint: format!("{base}/token"),
            graph_base: format!("{base}/v1.0"),
        }
    }
}

impl Default for OneDriveAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for OneDriveAdapter {
    fn provider(&self) -> Provider {
        Provider::OneDrive
    }

    fn build_authorization_url(
        &self,
        creds: &ProviderCredentials,
        state: &str,
    ) -> Result<String, ProviderError> {
        Ok(build_oauth_url(
            AUTH_ENDPOINT,
            &creds.client_id,
            &creds.redirect_uri,
            SCOPES,
            state,
            &[("response_mode", "query")],
        ))
    }

    async fn exchange_code(
        &self,
        creds: &ProviderCredentials,
        code: &str,
    ) -> Result<TokenGrant, ProviderError> {
        let response = self
            .client
            .post(&self.token_endpoint)
            .form(&[
                ("code", code),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("redirect_uri", creds.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| network_error(&e, "onedrive token exchange"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "onedrive token exchange",
                &body_for_error(response).await,
            ));
        }

        let token: OAuthTokenResponse =
            response.json().await.map_err(|e| parse_error(e, "onedrive token exchange"))?;
        Ok(token.into())
    }

    async fn fetch_account_profile(
        &self,
        access_token: &str,
    ) -> Result<AccountProfile, ProviderError> {
        let url = format!("{}/me", self.graph_base);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(&e, "onedrive profile"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(status, "onedrive profile", &body_for_error(response).await));
        }

        let me: GraphUser =
            response.json().await.map_err(|e| parse_error(e, "onedrive profile"))?;
        Ok(AccountProfile { email: me.mail.or(me.user_principal_name) })
    }

    async fn refresh_access_token(
        &self,
        creds: &ProviderCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant, ProviderError> {
        let response = self
            .client
            .post(&self.token_endpoint)
            .form(&[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| network_error(&e, "onedrive token refresh"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "onedrive token refresh",
                &body_for_error(response).await,
            ));
        }

        let token: OAuthTokenResponse =
            response.json().await.map_err(|e| parse_error(e, "onedrive token refresh"))?;
        Ok(token.into())
    }

    async fn list_items(
        &self,
        access_token: &str,
        continuation: Option<&str>,
    ) -> Result<ItemPage, ProviderError> {
        // Continuation is Graph's @odata.nextLink: a complete URL.
        let url = match continuation {
            Some(next_link) => next_link.to_string(),
            None => format!("{}/me/drive/root/children?$top=200", self.graph_base),
        };

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(&e, "onedrive listing"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(status, "onedrive listing", &body_for_error(response).await));
        }

        let page: GraphDriveChildren =
            response.json().await.map_err(|e| parse_error(e, "onedrive listing"))?;

        let items = page
            .value
            .into_iter()
            // Only file items carry downloadable content.
            .filter(|entry| entry.file.is_some())
            .map(|entry| {
                let modified_at = entry
                    .last_modified_date_time
                    .as_deref()
                    .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc));
                let content_type = entry.file.and_then(|file| file.mime_type);
                RemoteItem {
                    id: entry.id,
                    name: entry.name,
                    content_type,
                    size: entry.size,
                    modified_at,
                    parent: None,
                }
            })
            .collect();

        Ok(ItemPage { items, next_continuation: page.next_link })
    }

    async fn download_item(
        &self,
        access_token: &str,
        item: &RemoteItem,
    ) -> Result<DownloadedItem, ProviderError> {
        let url = format!(
            "{}/me/drive/items/{}/content",
            self.graph_base,
            urlencoding::encode(&item.id)
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(&e, "onedrive download"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(status, "onedrive download", &body_for_error(response).await));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| item.content_type.clone());

        let bytes = response.bytes().await.map_err(|e| network_error(&e, "onedrive download"))?;
        Ok(DownloadedItem { bytes: bytes.to_vec(), content_type })
    }
}

#[derive(Debug, Deserialize)]
struct GraphUser {
    mail: Option<String>,
    #[serde(rename = "userPrincipalName")]
    user_principal_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphDriveChildren {
    #[serde(default)]
    value: Vec<GraphDriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphDriveItem {
    id: String,
    name: String,
    size: Option<u64>,
    #[serde(rename = "lastModifiedDateTime")]
    last_modified_date_time: Option<String>,
    file: Option<GraphFileFacet>,
}

#[derive(Debug, Deserialize)]
struct GraphFileFacet {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}
