//! Google Drive adapter
//!
//! OAuth2 file storage. Drive paginates with a bare `nextPageToken` string
//! sent back as the `pageToken` query parameter.

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

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const REVOKE_ENDPOINT: &str = "https://oauth2.googleapis.com/revoke";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const API_BASE: &str = "https://www.googleapis.com/drive/v3";

const SCOPES: &[&str] =
    &["https://www.googleapis.com/auth/drive.readonly", "openid", "email"];

/// Google Drive provider adapter
pub struct GoogleDriveAdapter {
    client: Client,
    token_endpoint: String,
    revoke_endpoint: String,
    userinfo_endpoint: String,
    api_base: String,
}

impl GoogleDriveAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: default_client(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            revoke_endpoint: REVOKE_ENDPOINT.to_string(),
            userinfo_endpoint: USERINFO_ENDPOINT.to_string(),
            api_base: API_BASE.to_string(),
        }
    }

    /// Point every endpoint at a test server.
    #[must_use]
    pub fn with_base_url(base: &str) -> Self {
        Self {
            client: default_client(),
            token_endpoint: format!("{base}/token"),
            revoke_endpoint: format!("{base}/revoke"),
            userinfo_endpoint: format!("{base}/userinfo"),
            api_base: format!("{base}/drive/v3"),
        }
    }
}

impl Default for GoogleDriveAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for GoogleDriveAdapter {
    fn provider(&self) -> Provider {
        Provider::GoogleDrive
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
            &[("access_type", "offline"), ("prompt", "consent")],
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
            .map_err(|e| network_error(&e, "drive token exchange"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "drive token exchange",
                &body_for_error(response).await,
            ));
        }

        let token: OAuthTokenResponse =
            response.json().await.map_err(|e| parse_error(e, "drive token exchange"))?;
        Ok(token.into())
    }

    async fn fetch_account_profile(
        &self,
        access_token: &str,
    ) -> Result<AccountProfile, ProviderError> {
        let response = self
            .client
            .get(&self.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(&e, "drive userinfo"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(status, "drive userinfo", &body_for_error(response).await));
        }

        let info: DriveUserInfo =
            response.json().await.map_err(|e| parse_error(e, "drive userinfo"))?;
        Ok(AccountProfile { email: info.email })
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
            .map_err(|e| network_error(&e, "drive token refresh"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "drive token refresh",
                &body_for_error(response).await,
            ));
        }

        let token: OAuthTokenResponse =
            response.json().await.map_err(|e| parse_error(e, "drive token refresh"))?;
        Ok(token.into())
    }

    async fn list_items(
        &self,
        access_token: &str,
        continuation: Option<&str>,
    ) -> Result<ItemPage, ProviderError> {
        let url = format!("{}/files", self.api_base);

        let mut query: Vec<(&str, String)> = vec![
            ("pageSize", "100".to_string()),
            ("q", "trashed = false".to_string()),
            (
                "fields",
                "nextPageToken,files(id,name,mimeType,size,modifiedTime)".to_string(),
            ),
        ];
        if let Some(token) = continuation {
            query.push(("pageToken", token.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| network_error(&e, "drive listing"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(status, "drive listing", &body_for_error(response).await));
        }

        let page: DriveFilesResponse =
            response.json().await.map_err(|e| parse_error(e, "drive listing"))?;

        let items = page
            .files
            .into_iter()
            // Folders have no content to mirror.
            .filter(|file| file.mime_type.as_deref() != Some(FOLDER_MIME))
            .map(|file| {
                let modified_at = file
                    .modified_time
                    .as_deref()
                    .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc));
                RemoteItem {
                    id: file.id,
                    name: file.name,
                    content_type: file.mime_type,
                    size: file.size.and_then(|s| s.parse().ok()),
                    modified_at,
                    parent: None,
                }
            })
            .collect();

        Ok(ItemPage { items, next_continuation: page.next_page_token })
    }

    async fn download_item(
        &self,
        access_token: &str,
        item: &RemoteItem,
    ) -> Result<DownloadedItem, ProviderError> {
        let url = format!("{}/files/{}", self.api_base, urlencoding::encode(&item.id));
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| network_error(&e, "drive download"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(status, "drive download", &body_for_error(response).await));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| item.content_type.clone());

        let bytes = response.bytes().await.map_err(|e| network_error(&e, "drive download"))?;
        Ok(DownloadedItem { bytes: bytes.to_vec(), content_type })
    }

    async fn revoke_token(
        &self,
        _creds: &ProviderCredentials,
        access_token: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(&self.revoke_endpoint)
            .form(&[("token", access_token)])
            .send()
            .await
            .map_err(|e| network_error(&e, "drive token revocation"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "drive token revocation",
                &body_for_error(response).await,
            ));
        }
        Ok(())
    }
}

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Deserialize)]
struct DriveFilesResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    // Drive serializes sizes as strings
    size: Option<String>,
    #[serde(rename = "modifiedTime")]
    modified_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveUserInfo {
    email: Option<String>,
}
