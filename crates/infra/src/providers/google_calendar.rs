//! Google Calendar adapter
//!
//! OAuth2 authorization-code flow with offline access. Listing walks every
//! calendar in the account's calendar list; the continuation token encodes
//! the walk position (current calendar, its page token, calendars still to
//! visit) as a JSON blob only this adapter understands.

use async_trait::async_trait;
use orbit_core::providers::ports::{DownloadedItem, ItemPage, ProviderAdapter, TokenGrant};
use orbit_domain::{
    AccountProfile, Provider, ProviderCredentials, ProviderError, RemoteItem,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{build_oauth_url, OAuthTokenResponse};
use crate::errors::{classify_status, network_error, parse_error};
use crate::http::{body_for_error, default_client};

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const REVOKE_ENDPOINT: &str = "https://oauth2.googleapis.com/revoke";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const API_BASE: &str = "https://www.googleapis.com/calendar/v3";

const SCOPES: &[&str] =
    &["https://www.googleapis.com/auth/calendar.readonly", "openid", "email"];

/// Google Calendar provider adapter
pub struct GoogleCalendarAdapter {
    client: Client,
    token_endpoint: String,
    revoke_endpoint: String,
    userinfo_endpoint: String,
    api_base: String,
}

impl GoogleCalendarAdapter {
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
            api_base: format!("{base}/calendar/v3"),
        }
    }

    async fn fetch_calendar_ids(&self, access_token: &str) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(&e, "google calendar list"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "google calendar list",
                &body_for_error(response).await,
            ));
        }

        let list: GoogleCalendarList = response
            .json()
            .await
            .map_err(|e| parse_error(e, "google calendar list"))?;

        Ok(list.items.into_iter().map(|cal| cal.id).collect())
    }

    async fn fetch_events_page(
        &self,
        access_token: &str,
        calendar_id: &str,
        page_token: Option<&str>,
    ) -> Result<GoogleEventsResponse, ProviderError> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );

        let mut query: Vec<(&str, String)> = vec![
            ("singleEvents", "true".to_string()),
            ("maxResults", "250".to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| network_error(&e, "google events listing"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "google events listing",
                &body_for_error(response).await,
            ));
        }

        response.json().await.map_err(|e| parse_error(e, "google events listing"))
    }
}

impl Default for GoogleCalendarAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for GoogleCalendarAdapter {
    fn provider(&self) -> Provider {
        Provider::GoogleCalendar
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
            .map_err(|e| network_error(&e, "google token exchange"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "google token exchange",
                &body_for_error(response).await,
            ));
        }

        let token: OAuthTokenResponse =
            response.json().await.map_err(|e| parse_error(e, "google token exchange"))?;
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
            .map_err(|e| network_error(&e, "google userinfo"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(status, "google userinfo", &body_for_error(response).await));
        }

        let info: GoogleUserInfo =
            response.json().await.map_err(|e| parse_error(e, "google userinfo"))?;
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
            .map_err(|e| network_error(&e, "google token refresh"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "google token refresh",
                &body_for_error(response).await,
            ));
        }

        let token: OAuthTokenResponse =
            response.json().await.map_err(|e| parse_error(e, "google token refresh"))?;
        Ok(token.into())
    }

    async fn list_items(
        &self,
        access_token: &str,
        continuation: Option<&str>,
    ) -> Result<ItemPage, ProviderError> {
        let cursor = match continuation {
            Some(raw) => serde_json::from_str::<CalendarCursor>(raw)
                .map_err(|e| parse_error(e, "google continuation token"))?,
            None => {
                let mut calendar_ids = self.fetch_calendar_ids(access_token).await?;
                if calendar_ids.is_empty() {
                    return Ok(ItemPage { items: Vec::new(), next_continuation: None });
                }
                let first = calendar_ids.remove(0);
                CalendarCursor { calendar_id: first, page_token: None, remaining: calendar_ids }
            }
        };

        let page = self
            .fetch_events_page(access_token, &cursor.calendar_id, cursor.page_token.as_deref())
            .await?;

        let items = page
            .items
            .into_iter()
            .map(|event| {
                let modified_at = event
                    .updated
                    .as_deref()
                    .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc));
                RemoteItem {
                    id: event.id,
                    name: event.summary.unwrap_or_else(|| "Untitled event".to_string()),
                    content_type: Some("application/json".to_string()),
                    size: None,
                    modified_at,
                    parent: Some(cursor.calendar_id.clone()),
                }
            })
            .collect();

        // Advance within the current calendar first, then to the next one.
        let next = match page.next_page_token {
            Some(token) => Some(CalendarCursor {
                calendar_id: cursor.calendar_id,
                page_token: Some(token),
                remaining: cursor.remaining,
            }),
            None => {
                let mut remaining = cursor.remaining;
                if remaining.is_empty() {
                    None
                } else {
                    let next_calendar = remaining.remove(0);
                    Some(CalendarCursor {
                        calendar_id: next_calendar,
                        page_token: None,
                        remaining,
                    })
                }
            }
        };

        let next_continuation = match next {
            Some(cursor) => Some(
                serde_json::to_string(&cursor)
                    .map_err(|e| parse_error(e, "google continuation token"))?,
            ),
            None => None,
        };

        Ok(ItemPage { items, next_continuation })
    }

    async fn download_item(
        &self,
        access_token: &str,
        item: &RemoteItem,
    ) -> Result<DownloadedItem, ProviderError> {
        let calendar_id = item.parent.as_deref().unwrap_or("primary");
        let url = format!(
            "{}/calendars/{}/events/{}",
            self.api_base,
            urlencoding::encode(calendar_id),
            urlencoding::encode(&item.id)
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(&e, "google event fetch"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "google event fetch",
                &body_for_error(response).await,
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| network_error(&e, "google event fetch"))?;

        Ok(DownloadedItem {
            bytes: bytes.to_vec(),
            content_type: Some("application/json".to_string()),
        })
    }

    async fn list_calendars(
        &self,
        access_token: &str,
    ) -> Result<Vec<(String, String)>, ProviderError> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error(&e, "google calendar list"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "google calendar list",
                &body_for_error(response).await,
            ));
        }

        let list: GoogleCalendarList = response
            .json()
            .await
            .map_err(|e| parse_error(e, "google calendar list"))?;

        Ok(list
            .items
            .into_iter()
            .map(|cal| {
                let name = cal.summary.unwrap_or_else(|| cal.id.clone());
                (cal.id, name)
            })
            .collect())
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
            .map_err(|e| network_error(&e, "google token revocation"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "google token revocation",
                &body_for_error(response).await,
            ));
        }
        Ok(())
    }
}

/// Walk position across the account's calendars; serialized into the
/// continuation token.
#[derive(Debug, Serialize, Deserialize)]
struct CalendarCursor {
    calendar_id: String,
    page_token: Option<String>,
    remaining: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarList {
    #[serde(default)]
    items: Vec<GoogleCalendarEntry>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarEntry {
    id: String,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    id: String,
    summary: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: Option<String>,
}
