//! Dropbox file-storage adapter
//!
//! OAuth2, but the token endpoint authenticates with HTTP Basic (client
//! id and secret in the Authorization header) instead of form-body
//! credentials. Listing is cursor-based: `list_folder` issues an opaque
//! cursor that `list_folder/continue` consumes.

use async_trait::async_trait;
use orbit_core::providers::ports::{DownloadedItem, ItemPage, ProviderAdapter, TokenGrant};
use orbit_domain::{
    AccountProfile, Provider, ProviderCredentials, ProviderError, RemoteItem,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{build_oauth_url, OAuthTokenResponse};
use crate::errors::{classify_status, network_error, parse_error};
use crate::http::{body_for_error, default_client};

const AUTH_ENDPOINT: &str = "https://www.dropbox.com/oauth2/authorize";
const TOKEN_ENDPOINT: &str = "https://api.dropboxapi.com/oauth2/token";
const API_BASE: &str = "https://api.dropboxapi.com/2";
const CONTENT_BASE: &str = "https://content.dropboxapi.com/2";

/// Dropbox provider adapter
pub struct DropboxAdapter {
    client: Client,
    token_endpoint: String,
    api_base: String,
    content_base: String,
}

impl DropboxAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: default_client(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            api_base: API_BASE.to_string(),
            content_base: CONTENT_BASE.to_string(),
        }
    }

    /// Point every endpoint at a test server.
    #[must_use]
    pub fn with_base_url(base: &str) -> Self {
        Self {
            client: default_client(),
            token_endpoint: format!("{base}/oauth2/token"),
            api_base: format!("{base}/2"),
            content_base: format!("{base}/2"),
        }
    }

    /// Token endpoint call with HTTP Basic client authentication; no
    /// client secret ever enters the form body.
    async fn token_request(
        &self,
        creds: &ProviderCredentials,
        form: &[(&str, &str)],
        context: &'static str,
    ) -> Result<TokenGrant, ProviderError> {
        let response = self
            .client
            .post(&self.token_endpoint)
            .basic_auth(&creds.client_id, Some(&creds.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| network_error(&e, context))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(status, context, &body_for_error(response).await));
        }

        let token: OAuthTokenResponse =
            response.json().await.map_err(|e| parse_error(e, context))?;
        Ok(token.into())
    }
}

impl Default for DropboxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for DropboxAdapter {
    fn provider(&self) -> Provider {
        Provider::Dropbox
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
            &[],
            state,
            &[("token_access_type", "offline")],
        ))
    }

    async fn exchange_code(
        &self,
        creds: &ProviderCredentials,
        code: &str,
    ) -> Result<TokenGrant, ProviderError> {
        self.token_request(
            creds,
            &[
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", creds.redirect_uri.as_str()),
            ],
            "dropbox token exchange",
        )
        .await
    }

    async fn fetch_account_profile(
        &self,
        access_token: &str,
    ) -> Result<AccountProfile, ProviderError> {
        let url = format!("{}/users/get_current_account", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(&e, "dropbox profile"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(status, "dropbox profile", &body_for_error(response).await));
        }

        let account: DropboxAccount =
            response.json().await.map_err(|e| parse_error(e, "dropbox profile"))?;
        Ok(AccountProfile { email: account.email })
    }

    async fn refresh_access_token(
        &self,
        creds: &ProviderCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant, ProviderError> {
        self.token_request(
            creds,
            &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
            "dropbox token refresh",
        )
        .await
    }

    async fn list_items(
        &self,
        access_token: &str,
        continuation: Option<&str>,
    ) -> Result<ItemPage, ProviderError> {
        // A fresh listing starts at the root; afterwards the cursor from
        // the previous page drives list_folder/continue.
        let (url, body) = match continuation {
            Some(cursor) => (
                format!("{}/files/list_folder/continue", self.api_base),
                json!({ "cursor": cursor }),
            ),
            None => (
                format!("{}/files/list_folder", self.api_base),
                json!({ "path": "", "recursive": true }),
            ),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(&e, "dropbox listing"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(status, "dropbox listing", &body_for_error(response).await));
        }

        let page: DropboxListFolderResponse =
            response.json().await.map_err(|e| parse_error(e, "dropbox listing"))?;

        let items = page
            .entries
            .into_iter()
            .filter(|entry| entry.tag == "file")
            .map(|entry| {
                let modified_at = entry
                    .server_modified
                    .as_deref()
                    .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc));
                RemoteItem {
                    // The display path doubles as the download argument.
                    id: entry.path_display.unwrap_or_else(|| format!("/{}", entry.name)),
                    name: entry.name,
                    content_type: None,
                    size: entry.size,
                    modified_at,
                    parent: None,
                }
            })
            .collect();

        let next_continuation = if page.has_more { Some(page.cursor) } else { None };
        Ok(ItemPage { items, next_continuation })
    }

    async fn download_item(
        &self,
        access_token: &str,
        item: &RemoteItem,
    ) -> Result<DownloadedItem, ProviderError> {
        let url = format!("{}/files/download", self.content_base);
        let arg = json!({ "path": item.id }).to_string();

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .header("Dropbox-API-Arg", arg)
            .send()
            .await
            .map_err(|e| network_error(&e, "dropbox download"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(status, "dropbox download", &body_for_error(response).await));
        }

        let bytes = response.bytes().await.map_err(|e| network_error(&e, "dropbox download"))?;
        Ok(DownloadedItem { bytes: bytes.to_vec(), content_type: None })
    }

    async fn revoke_token(
        &self,
        _creds: &ProviderCredentials,
        access_token: &str,
    ) -> Result<(), ProviderError> {
        let url = format!("{}/auth/token/revoke", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(&e, "dropbox token revocation"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "dropbox token revocation",
                &body_for_error(response).await,
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DropboxAccount {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DropboxListFolderResponse {
    #[serde(default)]
    entries: Vec<DropboxEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct DropboxEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
    path_display: Option<String>,
    size: Option<u64>,
    server_modified: Option<String>,
}
