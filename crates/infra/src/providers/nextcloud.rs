//! Nextcloud (WebDAV/CalDAV) adapter
//!
//! No redirect flow: the account links with a username and app-specific
//! password, verified by a Depth:0 `PROPFIND` probe against the user's DAV
//! root. The stored credential is the `username:app_password` pair, used
//! for HTTP Basic on every request. Listing issues a Depth:1 `PROPFIND`
//! and parses the multistatus body.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orbit_core::providers::ports::{DownloadedItem, ItemPage, ProviderAdapter, TokenGrant};
use orbit_domain::{
    AccountProfile, Provider, ProviderCredentials, ProviderError, ProviderErrorKind, RemoteItem,
};
use regex::Regex;
use reqwest::{Client, Method, StatusCode};
use std::sync::OnceLock;
use url::Url;

use crate::errors::{classify_status, network_error, parse_error};
use crate::http::{body_for_error, default_client};

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getcontenttype/>
    <d:getlastmodified/>
  </d:prop>
</d:propfind>"#;

/// Nextcloud provider adapter
pub struct NextcloudAdapter {
    client: Client,
    base_url: String,
}

impl NextcloudAdapter {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self { client: default_client(), base_url: base_url.trim_end_matches('/').to_string() }
    }

    fn dav_root(&self, username: &str) -> String {
        format!("{}/remote.php/dav/files/{}/", self.base_url, urlencoding::encode(username))
    }

    /// Scheme + authority of the server, for resolving multistatus hrefs.
    fn server_origin(&self) -> Result<String, ProviderError> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            ProviderError::unknown(format!("invalid nextcloud base URL: {e}"))
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| ProviderError::unknown("nextcloud base URL missing host"))?;
        Ok(match url.port() {
            Some(port) => format!("{}://{host}:{port}", url.scheme()),
            None => format!("{}://{host}", url.scheme()),
        })
    }

    fn propfind(&self) -> Result<Method, ProviderError> {
        Method::from_bytes(b"PROPFIND")
            .map_err(|e| ProviderError::unknown(format!("PROPFIND verb unavailable: {e}")))
    }

    async fn propfind_request(
        &self,
        url: &str,
        username: &str,
        password: &str,
        depth: &str,
        context: &'static str,
    ) -> Result<String, ProviderError> {
        let response = self
            .client
            .request(self.propfind()?, url)
            .basic_auth(username, Some(password))
            .header("Depth", depth)
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await
            .map_err(|e| network_error(&e, context))?;

        let status = response.status();
        // 207 Multi-Status is the expected success response.
        if !(status.is_success() || status == StatusCode::MULTI_STATUS) {
            return Err(classify_status(status, context, &body_for_error(response).await));
        }

        response.text().await.map_err(|e| network_error(&e, context))
    }
}

/// The stored credential for CalDAV-style links is `username:app_password`.
fn split_credentials(access_token: &str) -> Result<(&str, &str), ProviderError> {
    access_token.split_once(':').ok_or_else(|| {
        ProviderError::new(
            ProviderErrorKind::AuthExpired,
            false,
            "stored credential is not a username:password pair",
        )
    })
}

#[async_trait]
impl ProviderAdapter for NextcloudAdapter {
    fn provider(&self) -> Provider {
        Provider::Nextcloud
    }

    fn build_authorization_url(
        &self,
        _creds: &ProviderCredentials,
        _state: &str,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::unknown(
            "nextcloud links with an app password, not an authorization-code flow",
        ))
    }

    async fn exchange_code(
        &self,
        _creds: &ProviderCredentials,
        _code: &str,
    ) -> Result<TokenGrant, ProviderError> {
        Err(ProviderError::unknown(
            "nextcloud links with an app password, not an authorization-code flow",
        ))
    }

    async fn fetch_account_profile(
        &self,
        access_token: &str,
    ) -> Result<AccountProfile, ProviderError> {
        let (username, _) = split_credentials(access_token)?;
        Ok(AccountProfile { email: Some(username.to_string()) })
    }

    async fn refresh_access_token(
        &self,
        _creds: &ProviderCredentials,
        _refresh_token: &str,
    ) -> Result<TokenGrant, ProviderError> {
        Err(ProviderError::unknown("app passwords are not refreshable"))
    }

    async fn list_items(
        &self,
        access_token: &str,
        continuation: Option<&str>,
    ) -> Result<ItemPage, ProviderError> {
        let (username, password) = split_credentials(access_token)?;

        // Continuation is a queue of directory hrefs still to visit; each
        // page walks one directory and appends the subdirectories it finds.
        // The root listing starts at the DAV root.
        let mut pending_dirs: Vec<String> = match continuation {
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| parse_error(e, "nextcloud continuation token"))?,
            None => Vec::new(),
        };

        let url = if pending_dirs.is_empty() {
            match continuation {
                // An exhausted queue means the walk already finished.
                Some(_) => return Ok(ItemPage { items: Vec::new(), next_continuation: None }),
                None => self.dav_root(username),
            }
        } else {
            format!("{}{}", self.server_origin()?, pending_dirs.remove(0))
        };

        let body = self
            .propfind_request(&url, username, password, "1", "nextcloud listing")
            .await?;

        let listing = parse_multistatus(&body);

        // The first response is the directory itself.
        let mut items = Vec::new();
        let request_path = Url::parse(&url)
            .ok()
            .map(|parsed| parsed.path().to_string())
            .unwrap_or_default();

        for entry in listing {
            // Some servers omit the trailing slash on the directory's own
            // entry; never re-queue the directory just visited.
            if entry.href.trim_end_matches('/') == request_path.trim_end_matches('/') {
                continue;
            }
            if entry.is_collection {
                pending_dirs.push(entry.href);
                continue;
            }

            let name = entry
                .href
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .map(|segment| urlencoding::decode(segment).map_or_else(
                    |_| segment.to_string(),
                    |decoded| decoded.into_owned(),
                ))
                .unwrap_or_else(|| "unnamed".to_string());

            items.push(RemoteItem {
                id: entry.href.clone(),
                name,
                content_type: entry.content_type,
                size: entry.content_length,
                modified_at: entry.last_modified,
                parent: None,
            });
        }

        // One directory per continuation step keeps the walk sequential;
        // deeper levels surface as their parents are visited.
        let next_continuation = if pending_dirs.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&pending_dirs)
                    .map_err(|e| parse_error(e, "nextcloud continuation token"))?,
            )
        };

        Ok(ItemPage { items, next_continuation })
    }

    async fn download_item(
        &self,
        access_token: &str,
        item: &RemoteItem,
    ) -> Result<DownloadedItem, ProviderError> {
        let (username, password) = split_credentials(access_token)?;
        let url = format!("{}{}", self.server_origin()?, item.id);

        let response = self
            .client
            .get(&url)
            .basic_auth(username, Some(password))
            .send()
            .await
            .map_err(|e| network_error(&e, "nextcloud download"))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(classify_status(
                status,
                "nextcloud download",
                &body_for_error(response).await,
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| item.content_type.clone());

        let bytes = response.bytes().await.map_err(|e| network_error(&e, "nextcloud download"))?;
        Ok(DownloadedItem { bytes: bytes.to_vec(), content_type })
    }

    async fn probe_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), ProviderError> {
        let url = self.dav_root(username);
        self.propfind_request(&url, username, password, "0", "nextcloud credential probe")
            .await?;
        Ok(())
    }
}

struct DavEntry {
    href: String,
    is_collection: bool,
    content_type: Option<String>,
    content_length: Option<u64>,
    last_modified: Option<DateTime<Utc>>,
}

fn response_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Namespace prefixes vary across servers (d:, D:, none).
        Regex::new(r"(?si)<(?:\w+:)?response[^>]*>(.*?)</(?:\w+:)?response>")
            .unwrap_or_else(|_| unreachable_regex())
    })
}

fn tag_regex(tag: &str) -> Regex {
    Regex::new(&format!(r"(?si)<(?:\w+:)?{tag}[^>]*>(.*?)</(?:\w+:)?{tag}>"))
        .unwrap_or_else(|_| unreachable_regex())
}

fn unreachable_regex() -> Regex {
    // The patterns above are static and valid; this exists only to avoid
    // panicking constructors in non-test code.
    #[allow(clippy::unwrap_used)]
    Regex::new("$^").unwrap()
}

/// Parse a WebDAV multistatus body into flat entries.
fn parse_multistatus(body: &str) -> Vec<DavEntry> {
    let href_re = tag_regex("href");
    let type_re = tag_regex("getcontenttype");
    let length_re = tag_regex("getcontentlength");
    let modified_re = tag_regex("getlastmodified");
    let collection_re = Regex::new(r"(?i)<(?:\w+:)?collection\s*/?>")
        .unwrap_or_else(|_| unreachable_regex());

    response_regex()
        .captures_iter(body)
        .filter_map(|response| {
            let block = response.get(1)?.as_str();
            let href = href_re.captures(block)?.get(1)?.as_str().trim().to_string();

            let first_capture = |re: &Regex| {
                re.captures(block)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
            };

            Some(DavEntry {
                href,
                is_collection: collection_re.is_match(block),
                content_type: first_capture(&type_re),
                content_length: first_capture(&length_re).and_then(|v| v.parse().ok()),
                last_modified: first_capture(&modified_re)
                    .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
            })
        })
        .collect()
}
