//! Outlook (Microsoft Graph) calendar adapter
//!
//! OAuth2 authorization-code flow against the Microsoft identity platform.
//! Graph paginates with `@odata.nextLink`, a full next-page URL; that URL
//! is the continuation token, passed back verbatim and requested as-is.

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

const SCOPES: &[&str] = &["offline_access", "Calendars.Read", "User.Read"];

/// Outlook calendar provider adapter
pub struct OutlookCalendarAdapter {
    client: Client,
    token_endpoint: String,
    graph_base: String,
}

impl OutlookCalendarAdapter {
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

    async fn token_request(
        &self,
        form: &[(&str, &str)],
        context: &'static str,
    ) -> Result<TokenGrant, ProviderError> {
        let response = self
            .client
            .post(&self.token_endpoint)
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

impl Default for OutlookCalendarAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for OutlookCalendarAdapter {
    fn provider(&self) -> Provider {
        Provider::OutlookCalendar
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
        self.token_request(
            &[
                ("code", code),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("redirect_uri", creds.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ],
            "microsoft token exchange",
        )
        .await
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
            .map_err(|e| network_error(&e, "microsoft profile"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(status, "microsoft profile", &body_for_error(response).await));
        }

        let me: GraphUser = response.json().await.map_err(|e| parse_error(e, "microsoft profile"))?;
        Ok(AccountProfile { email: me.mail.or(me.user_principal_name) })
    }

    async fn refresh_access_token(
        &self,
        creds: &ProviderCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant, ProviderError> {
        self.token_request(
            &[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
            "microsoft token refresh",
        )
        .await
    }

    async fn list_items(
        &self,
        access_token: &str,
        continuation: Option<&str>,
    ) -> Result<ItemPage, ProviderError> {
        // Continuation is Graph's @odata.nextLink: a complete URL.
        let url = match continuation {
            Some(next_link) => next_link.to_string(),
            None => format!(
                "{}/me/calendar/events?$top=50&$select=id,subject,lastModifiedDateTime",
                self.graph_base
            ),
        };

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(&e, "microsoft events listing"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "microsoft events listing",
                &body_for_error(response).await,
            ));
        }

        let page: GraphEventsResponse = response
            .json()
            .await
            .map_err(|e| parse_error(e, "microsoft events listing"))?;

        let items = page
            .value
            .into_iter()
            .map(|event| {
                let modified_at = event
                    .last_modified_date_time
                    .as_deref()
                    .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc));
                RemoteItem {
                    id: event.id,
                    name: event.subject.unwrap_or_else(|| "Untitled event".to_string()),
                    content_type: Some("application/json".to_string()),
                    size: None,
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
        let url = format!("{}/me/events/{}", self.graph_base, urlencoding::encode(&item.id));
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(&e, "microsoft event fetch"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "microsoft event fetch",
                &body_for_error(response).await,
            ));
        }

        let bytes =
            response.bytes().await.map_err(|e| network_error(&e, "microsoft event fetch"))?;
        Ok(DownloadedItem {
            bytes: bytes.to_vec(),
            content_type: Some("application/json".to_string()),
        })
    }

    async fn list_calendars(
        &self,
        access_token: &str,
    ) -> Result<Vec<(String, String)>, ProviderError> {
        let url = format!("{}/me/calendars?$select=id,name", self.graph_base);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(&e, "microsoft calendar list"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "microsoft calendar list",
                &body_for_error(response).await,
            ));
        }

        let list: GraphCalendarsResponse = response
            .json()
            .await
            .map_err(|e| parse_error(e, "microsoft calendar list"))?;

        Ok(list.value.into_iter().map(|cal| (cal.id, cal.name)).collect())
    }
}

#[derive(Debug, Deserialize)]
struct GraphUser {
    mail: Option<String>,
    #[serde(rename = "userPrincipalName")]
    user_principal_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphEventsResponse {
    #[serde(default)]
    value: Vec<GraphEvent>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphEvent {
    id: String,
    subject: Option<String>,
    #[serde(rename = "lastModifiedDateTime")]
    last_modified_date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphCalendarsResponse {
    #[serde(default)]
    value: Vec<GraphCalendar>,
}

#[derive(Debug, Deserialize)]
struct GraphCalendar {
    id: String,
    name: String,
}
