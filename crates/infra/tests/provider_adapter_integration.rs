//! Integration tests for provider adapters against a mock HTTP server
//!
//! **Coverage:**
//! - Dropbox token endpoint authenticates with HTTP Basic, never in the
//!   form body
//! - Google Drive pagination threads the bare `pageToken` continuation
//! - OneDrive pagination follows the full `@odata.nextLink` URL verbatim
//! - Nextcloud credential probe and multistatus listing
//! - HTTP status normalization into the uniform provider error taxonomy
//!
//! **Infrastructure:**
//! - WireMock HTTP server standing in for each provider API
//! - Real adapters with endpoints pointed at the mock server

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use orbit_core::providers::ports::ProviderAdapter;
use orbit_domain::{Provider, ProviderCredentials, ProviderErrorKind, RemoteItem};
use orbit_infra::providers::dropbox::DropboxAdapter;
use orbit_infra::providers::google_calendar::GoogleCalendarAdapter;
use orbit_infra::providers::google_drive::GoogleDriveAdapter;
use orbit_infra::providers::nextcloud::NextcloudAdapter;
use orbit_infra::providers::onedrive::OneDriveAdapter;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Install the test subscriber once; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn creds() -> ProviderCredentials {
    ProviderCredentials {
        client_id: "client-1".to_string(),
        client_secret: "secret-1".to_string(),
        redirect_uri: "https://app.example.com/callback".to_string(),
        base_url: None,
    }
}

fn file_item(id: &str, name: &str) -> RemoteItem {
    RemoteItem {
        id: id.to_string(),
        name: name.to_string(),
        content_type: None,
        size: None,
        modified_at: None,
        parent: None,
    }
}

// ============================================================================
// Dropbox: Basic-auth token endpoint
// ============================================================================

#[tokio::test]
async fn dropbox_token_exchange_uses_basic_auth() {
    init_tracing();
    let server = MockServer::start().await;
    let expected = format!("Basic {}", BASE64.encode("client-1:secret-1"));

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(header("Authorization", expected.as_str()))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "dbx-access",
            "refresh_token": "dbx-refresh",
            "expires_in": 14400
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = DropboxAdapter::with_base_url(&server.uri());
    let grant = adapter.exchange_code(&creds(), "auth-code").await.unwrap();

    assert_eq!(grant.access_token, "dbx-access");
    assert_eq!(grant.refresh_token.as_deref(), Some("dbx-refresh"));
    assert_eq!(grant.expires_in_secs, 14400);

    // The client secret never travels in the form body.
    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).into_owned();
    assert!(!body.contains("secret-1"));
}

#[tokio::test]
async fn dropbox_listing_follows_cursor() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [
                { ".tag": "file", "name": "a.txt", "path_display": "/a.txt",
                  "size": 3, "server_modified": "2025-08-01T10:00:00Z" },
                { ".tag": "folder", "name": "Documents", "path_display": "/Documents" }
            ],
            "cursor": "cursor-1",
            "has_more": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .and(body_string_contains("cursor-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [
                { ".tag": "file", "name": "b.txt", "path_display": "/b.txt", "size": 4 }
            ],
            "cursor": "cursor-2",
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = DropboxAdapter::with_base_url(&server.uri());

    let first = adapter.list_items("token", None).await.unwrap();
    // Folders are not listed as items.
    assert_eq!(first.items.len(), 1);
    assert_eq!(first.items[0].name, "a.txt");
    let cursor = first.next_continuation.unwrap();
    assert_eq!(cursor, "cursor-1");

    let second = adapter.list_items("token", Some(&cursor)).await.unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(second.next_continuation.is_none());
}

// ============================================================================
// Google Drive: bare pageToken continuation
// ============================================================================

#[tokio::test]
async fn drive_listing_threads_page_token() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                { "id": "f2", "name": "second.txt", "mimeType": "text/plain",
                  "size": "9", "modifiedTime": "2025-08-02T08:30:00Z" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                { "id": "f1", "name": "first.txt", "mimeType": "text/plain",
                  "size": "5", "modifiedTime": "2025-08-01T08:30:00Z" },
                { "id": "d1", "name": "Folder",
                  "mimeType": "application/vnd.google-apps.folder" }
            ],
            "nextPageToken": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = GoogleDriveAdapter::with_base_url(&server.uri());

    let first = adapter.list_items("token", None).await.unwrap();
    assert_eq!(first.items.len(), 1, "folders are filtered out");
    assert_eq!(first.items[0].size, Some(5));
    assert!(first.items[0].modified_at.is_some());

    let token = first.next_continuation.unwrap();
    let second = adapter.list_items("token", Some(&token)).await.unwrap();
    assert_eq!(second.items[0].id, "f2");
    assert!(second.next_continuation.is_none());
}

#[tokio::test]
async fn drive_download_fetches_media() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .and(query_param("alt", "media"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"file-bytes".to_vec())
                .insert_header("Content-Type", "text/plain"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let adapter = GoogleDriveAdapter::with_base_url(&server.uri());
    let downloaded = adapter.download_item("token", &file_item("f1", "a.txt")).await.unwrap();

    assert_eq!(downloaded.bytes, b"file-bytes");
    assert_eq!(downloaded.content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn drive_rate_limit_maps_to_retryable_error() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limit exceeded"))
        .mount(&server)
        .await;

    let adapter = GoogleDriveAdapter::with_base_url(&server.uri());
    let err = adapter.download_item("token", &file_item("f1", "a.txt")).await.unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::RateLimited);
    assert!(err.retryable);
}

#[tokio::test]
async fn drive_unauthorized_maps_to_auth_expired() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .mount(&server)
        .await;

    let adapter = GoogleDriveAdapter::with_base_url(&server.uri());
    let err = adapter.list_items("token", None).await.unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::AuthExpired);
    assert!(!err.retryable);
}

// ============================================================================
// OneDrive: full-URL continuation
// ============================================================================

#[tokio::test]
async fn onedrive_follows_next_link_verbatim() {
    init_tracing();
    let server = MockServer::start().await;
    let next_link = format!("{}/v1.0/me/drive/root/children?$skiptoken=abc123", server.uri());

    Mock::given(method("GET"))
        .and(path("/v1.0/me/drive/root/children"))
        .and(query_param("$skiptoken", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "i2", "name": "two.bin", "size": 2,
                  "lastModifiedDateTime": "2025-08-02T12:00:00Z",
                  "file": { "mimeType": "application/octet-stream" } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me/drive/root/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "i1", "name": "one.bin", "size": 1,
                  "lastModifiedDateTime": "2025-08-01T12:00:00Z",
                  "file": { "mimeType": "application/octet-stream" } },
                { "id": "dir1", "name": "Folder", "folder": { "childCount": 2 } }
            ],
            "@odata.nextLink": next_link
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OneDriveAdapter::with_base_url(&server.uri());

    let first = adapter.list_items("token", None).await.unwrap();
    assert_eq!(first.items.len(), 1, "folder entries are filtered out");
    let continuation = first.next_continuation.unwrap();
    assert!(continuation.starts_with("http"), "continuation is a full URL");

    let second = adapter.list_items("token", Some(&continuation)).await.unwrap();
    assert_eq!(second.items[0].id, "i2");
    assert!(second.next_continuation.is_none());
}

// ============================================================================
// Google Calendar: calendar walk encoded in the continuation
// ============================================================================

#[tokio::test]
async fn google_calendar_walks_every_calendar() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "primary", "summary": "Primary" },
                { "id": "team", "summary": "Team" }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "e1", "summary": "Standup", "updated": "2025-08-01T09:00:00Z" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/team/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "e2", "summary": "Planning", "updated": "2025-08-01T10:00:00Z" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = GoogleCalendarAdapter::with_base_url(&server.uri());

    let first = adapter.list_items("token", None).await.unwrap();
    assert_eq!(first.items.len(), 1);
    assert_eq!(first.items[0].parent.as_deref(), Some("primary"));

    let continuation = first.next_continuation.unwrap();
    let second = adapter.list_items("token", Some(&continuation)).await.unwrap();
    assert_eq!(second.items[0].id, "e2");
    assert_eq!(second.items[0].parent.as_deref(), Some("team"));
    assert!(second.next_continuation.is_none());
}

#[tokio::test]
async fn google_calendar_refresh_posts_form_credentials() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .and(body_string_contains("client_id=client-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = GoogleCalendarAdapter::with_base_url(&server.uri());
    let grant = adapter.refresh_access_token(&creds(), "rt-1").await.unwrap();

    assert_eq!(grant.access_token, "fresh-token");
    assert!(grant.refresh_token.is_none());
}

#[tokio::test]
async fn google_calendar_exchange_failure_maps_status() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let adapter = GoogleCalendarAdapter::with_base_url(&server.uri());
    let err = adapter.exchange_code(&creds(), "stale-code").await.unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::Unknown);
    assert!(err.message.contains("invalid_grant"));
}

// ============================================================================
// Nextcloud: PROPFIND probe and multistatus listing
// ============================================================================

const MULTISTATUS_BODY: &str = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/remote.php/dav/files/erin/</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/files/erin/notes.txt</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype/>
        <d:getcontentlength>11</d:getcontentlength>
        <d:getcontenttype>text/plain</d:getcontenttype>
        <d:getlastmodified>Fri, 01 Aug 2025 09:00:00 GMT</d:getlastmodified>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

#[tokio::test]
async fn nextcloud_probe_accepts_multistatus() {
    init_tracing();
    let server = MockServer::start().await;
    let expected = format!("Basic {}", BASE64.encode("erin:app-pass"));

    Mock::given(method("PROPFIND"))
        .and(path("/remote.php/dav/files/erin/"))
        .and(header("Authorization", expected.as_str()))
        .and(header("Depth", "0"))
        .respond_with(ResponseTemplate::new(207).set_body_string(MULTISTATUS_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = NextcloudAdapter::new(server.uri());
    adapter.probe_credentials("erin", "app-pass").await.unwrap();
}

#[tokio::test]
async fn nextcloud_probe_rejects_bad_password() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("PROPFIND"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let adapter = NextcloudAdapter::new(server.uri());
    let err = adapter.probe_credentials("erin", "wrong").await.unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::AuthExpired);
}

#[tokio::test]
async fn nextcloud_listing_and_download() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("PROPFIND"))
        .and(path("/remote.php/dav/files/erin/"))
        .and(header("Depth", "1"))
        .respond_with(ResponseTemplate::new(207).set_body_string(MULTISTATUS_BODY))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/remote.php/dav/files/erin/notes.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"hello notes".to_vec())
                .insert_header("Content-Type", "text/plain"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let adapter = NextcloudAdapter::new(server.uri());

    let page = adapter.list_items("erin:app-pass", None).await.unwrap();
    assert_eq!(page.items.len(), 1);
    let item = &page.items[0];
    assert_eq!(item.name, "notes.txt");
    assert_eq!(item.size, Some(11));
    assert_eq!(item.content_type.as_deref(), Some("text/plain"));
    assert!(item.modified_at.is_some());

    let downloaded = adapter.download_item("erin:app-pass", item).await.unwrap();
    assert_eq!(downloaded.bytes, b"hello notes");
}

#[tokio::test]
async fn nextcloud_walks_every_discovered_directory() {
    init_tracing();
    let server = MockServer::start().await;

    let root_body = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/remote.php/dav/files/erin/</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/files/erin/Documents/</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/files/erin/Photos/</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    let documents_body = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/remote.php/dav/files/erin/Documents/</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/files/erin/Documents/cv.pdf</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype/>
        <d:getcontentlength>7</d:getcontentlength>
        <d:getcontenttype>application/pdf</d:getcontenttype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    let photos_body = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/remote.php/dav/files/erin/Photos/</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/files/erin/Photos/cat.jpg</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype/>
        <d:getcontentlength>9</d:getcontentlength>
        <d:getcontenttype>image/jpeg</d:getcontenttype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    Mock::given(method("PROPFIND"))
        .and(path("/remote.php/dav/files/erin/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(root_body))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/remote.php/dav/files/erin/Documents/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(documents_body))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/remote.php/dav/files/erin/Photos/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(photos_body))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = NextcloudAdapter::new(server.uri());

    // Walk the full tree, threading the continuation like the orchestrator.
    let mut names = Vec::new();
    let mut continuation: Option<String> = None;
    loop {
        let page = adapter.list_items("erin:app-pass", continuation.as_deref()).await.unwrap();
        names.extend(page.items.into_iter().map(|item| item.name));
        continuation = page.next_continuation;
        if continuation.is_none() {
            break;
        }
    }

    names.sort();
    assert_eq!(names, vec!["cat.jpg".to_string(), "cv.pdf".to_string()]);
}

#[tokio::test]
async fn nextcloud_rejects_malformed_stored_credential() {
    init_tracing();
    let adapter = NextcloudAdapter::new("https://cloud.example.com".to_string());
    let err = adapter.list_items("not-a-pair", None).await.unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::AuthExpired);
}

#[tokio::test]
async fn caldav_adapter_has_no_redirect_flow() {
    init_tracing();
    let adapter = NextcloudAdapter::new("https://cloud.example.com".to_string());
    assert!(adapter.build_authorization_url(&creds(), "state").is_err());
    assert!(adapter.exchange_code(&creds(), "code").await.is_err());
}
