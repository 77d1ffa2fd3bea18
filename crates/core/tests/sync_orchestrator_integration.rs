//! Integration tests for the sync orchestrator
//!
//! Coverage:
//! - Per-connection fault isolation (one failing connection never taints
//!   its siblings)
//! - Item-level error isolation (failed downloads count, run still
//!   succeeds)
//! - Opaque continuation-token threading across pages
//! - Modified-since filtering against last_synced_at
//! - Lease-based mutual exclusion, including reclamation of expired leases
//! - Calendar upsert path with per-calendar opt-out

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use orbit_common::vault::CredentialVault;
use orbit_core::testing::{
    InMemoryCalendarRegistry, InMemoryConnectionRepository, InMemoryLeaseStore,
    InMemoryMirrorStore, InMemoryObjectStore, InMemorySyncRunRepository, StaticAdapterRegistry,
    StubAdapter,
};
use orbit_core::{
    CalendarRegistry, ConnectionRepository, ProviderAdapter, SyncOrchestrator, SyncOutcome,
    SyncRunRepository, TokenRefreshService,
};
use orbit_domain::{
    Caller, Connection, IntegrationConfig, Provider, ProviderCredentials, ProviderError,
    ProviderErrorKind, RemoteItem, Role, SyncLease, SyncRunStatus, SyncSettings, VaultConfig,
};
use uuid::Uuid;

const MASTER_SECRET: &str = "test-master-secret-with-enough-length!";

fn test_config() -> IntegrationConfig {
    let mut providers = HashMap::new();
    for provider in Provider::all() {
        providers.insert(
            provider,
            ProviderCredentials {
                client_id: format!("{provider}-client"),
                client_secret: format!("{provider}-secret"),
                redirect_uri: "https://app.example.com/oauth/callback".to_string(),
                base_url: None,
            },
        );
    }
    IntegrationConfig {
        vault: VaultConfig { master_secret: MASTER_SECRET.to_string() },
        providers,
        sync: SyncSettings::default(),
    }
}

fn caller() -> Caller {
    Caller::new("org-1", "user-1", Role::Admin)
}

fn item(id: &str, name: &str) -> RemoteItem {
    RemoteItem {
        id: id.to_string(),
        name: name.to_string(),
        content_type: Some("application/octet-stream".to_string()),
        size: Some(42),
        modified_at: Some(Utc::now()),
        parent: None,
    }
}

struct Harness {
    vault: Arc<CredentialVault>,
    connections: Arc<InMemoryConnectionRepository>,
    runs: Arc<InMemorySyncRunRepository>,
    leases: Arc<InMemoryLeaseStore>,
    objects: Arc<InMemoryObjectStore>,
    mirror: Arc<InMemoryMirrorStore>,
    calendars: Arc<InMemoryCalendarRegistry>,
    orchestrator: Arc<SyncOrchestrator>,
}

fn harness(adapters: Vec<Arc<StubAdapter>>) -> Harness {
    let vault = Arc::new(CredentialVault::new(MASTER_SECRET).unwrap());
    let connections = Arc::new(InMemoryConnectionRepository::new());
    let runs = Arc::new(InMemorySyncRunRepository::new());
    let leases = Arc::new(InMemoryLeaseStore::new());
    let objects = Arc::new(InMemoryObjectStore::new());
    let mirror = Arc::new(InMemoryMirrorStore::new());
    let calendars = Arc::new(InMemoryCalendarRegistry::new());

    let mut registry = StaticAdapterRegistry::new();
    for adapter in adapters {
        registry = registry.with(adapter as Arc<dyn ProviderAdapter>);
    }
    let registry = Arc::new(registry);

    let tokens = Arc::new(TokenRefreshService::new(
        vault.clone(),
        connections.clone(),
        registry.clone(),
        test_config(),
    ));

    let orchestrator = Arc::new(SyncOrchestrator::new(
        connections.clone(),
        runs.clone(),
        leases.clone(),
        objects.clone(),
        mirror.clone(),
        calendars.clone(),
        registry,
        tokens,
        SyncSettings::default(),
    ));

    Harness { vault, connections, runs, leases, objects, mirror, calendars, orchestrator }
}

async fn linked_connection(h: &Harness, provider: Provider) -> Connection {
    let who = caller();
    let mut conn = Connection::new(who.org_id, who.user_id, provider);
    conn.access_token_enc = Some(h.vault.encrypt("valid-access").unwrap());
    conn.refresh_token_enc = Some(h.vault.encrypt("valid-refresh").unwrap());
    conn.expires_at = Some(Utc::now() + Duration::hours(1));
    h.connections.upsert(conn).await.unwrap()
}

#[tokio::test]
async fn first_sync_downloads_everything() {
    let adapter = Arc::new(StubAdapter::new(Provider::GoogleDrive));
    adapter.push_page(vec![item("f1", "a.txt"), item("f2", "b.txt")], None);
    let h = harness(vec![adapter]);
    let conn = linked_connection(&h, Provider::GoogleDrive).await;

    let results = h.orchestrator.sync_connections(&caller(), None).await;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.outcome, SyncOutcome::Succeeded);
    assert_eq!(result.stats.listed, 2);
    assert_eq!(result.stats.downloaded, 2);
    assert_eq!(result.stats.errors, 0);

    let keys = h.objects.keys();
    assert!(keys.contains(&"org-1/google_drive/user-1/a.txt".to_string()));
    assert!(keys.contains(&"org-1/google_drive/user-1/b.txt".to_string()));

    // last_synced_at advanced to the run's start time.
    let run = h.runs.get(result.run_id.unwrap()).unwrap();
    let stored = h.connections.get(conn.id).unwrap();
    assert_eq!(stored.last_synced_at, Some(run.started_at));
}

#[tokio::test]
async fn item_failures_are_counted_but_do_not_fail_the_run() {
    let adapter = Arc::new(StubAdapter::new(Provider::GoogleDrive));
    let items: Vec<RemoteItem> =
        (0..10).map(|i| item(&format!("f{i}"), &format!("file-{i}.txt"))).collect();
    adapter.push_page(items, None);
    adapter.fail_download("f3", ProviderError::new(ProviderErrorKind::NotFound, false, "410"));
    adapter.fail_download("f7", ProviderError::unknown("500 internal"));
    let h = harness(vec![adapter]);
    linked_connection(&h, Provider::GoogleDrive).await;

    let results = h.orchestrator.sync_connections(&caller(), None).await;

    let result = &results[0];
    assert_eq!(result.outcome, SyncOutcome::Succeeded);
    assert_eq!(result.stats.listed, 10);
    assert_eq!(result.stats.downloaded, 8);
    assert_eq!(result.stats.errors, 2);

    let run = h.runs.get(result.run_id.unwrap()).unwrap();
    assert_eq!(run.status, SyncRunStatus::Succeeded);
    assert_eq!(run.stats.errors, 2);
}

#[tokio::test]
async fn auth_failure_on_one_connection_leaves_siblings_untouched() {
    let drive = Arc::new(StubAdapter::new(Provider::GoogleDrive));
    drive.push_page(vec![item("f1", "ok.txt")], None);
    let dropbox = Arc::new(StubAdapter::new(Provider::Dropbox));
    dropbox.fail_listing(ProviderError::new(
        ProviderErrorKind::AuthExpired,
        false,
        "token revoked upstream",
    ));
    let onedrive = Arc::new(StubAdapter::new(Provider::OneDrive));
    onedrive.push_page(vec![item("f2", "also-ok.txt")], None);

    let h = harness(vec![drive, dropbox, onedrive]);
    linked_connection(&h, Provider::GoogleDrive).await;
    let failing = linked_connection(&h, Provider::Dropbox).await;
    linked_connection(&h, Provider::OneDrive).await;

    let results = h.orchestrator.sync_connections(&caller(), None).await;
    assert_eq!(results.len(), 3);

    let by_provider: HashMap<Provider, SyncOutcome> =
        results.iter().map(|r| (r.provider, r.outcome)).collect();
    assert_eq!(by_provider[&Provider::GoogleDrive], SyncOutcome::Succeeded);
    assert_eq!(by_provider[&Provider::Dropbox], SyncOutcome::Failed);
    assert_eq!(by_provider[&Provider::OneDrive], SyncOutcome::Succeeded);

    let failed = results.iter().find(|r| r.provider == Provider::Dropbox).unwrap();
    let run = h.runs.get(failed.run_id.unwrap()).unwrap();
    assert_eq!(run.status, SyncRunStatus::Failed);
    assert!(run.error.unwrap().contains("token revoked"));

    // The failed connection's last_synced_at did not advance.
    assert!(h.connections.get(failing.id).unwrap().last_synced_at.is_none());
}

#[tokio::test]
async fn degraded_connections_are_skipped_entirely() {
    let adapter = Arc::new(StubAdapter::new(Provider::GoogleDrive));
    let h = harness(vec![adapter]);
    let conn = linked_connection(&h, Provider::GoogleDrive).await;
    h.connections
        .set_status(conn.id, orbit_domain::ConnectionStatus::Error, Some("degraded".into()))
        .await
        .unwrap();

    let results = h.orchestrator.sync_connections(&caller(), None).await;

    assert!(results.is_empty());
    assert_eq!(h.runs.list_by_connection(conn.id).await.unwrap().len(), 0);
}

#[tokio::test]
async fn pagination_threads_continuation_tokens_verbatim() {
    let adapter = Arc::new(StubAdapter::new(Provider::OneDrive));
    // OneDrive-style continuation: a full URL, opaque to the orchestrator.
    let next = "https://graph.microsoft.com/v1.0/me/drive/root/children?$skiptoken=abc123";
    adapter.push_page(vec![item("f1", "one.txt")], Some(next.to_string()));
    adapter.push_page(vec![item("f2", "two.txt")], None);
    let h = harness(vec![adapter.clone()]);
    linked_connection(&h, Provider::OneDrive).await;

    let results = h.orchestrator.sync_connections(&caller(), None).await;

    assert_eq!(results[0].stats.listed, 2);
    assert_eq!(results[0].stats.downloaded, 2);
    assert_eq!(
        adapter.seen_continuations(),
        vec![None, Some(next.to_string())],
        "continuation token must be passed back unchanged"
    );
}

#[tokio::test]
async fn unchanged_items_are_skipped_on_resync() {
    let adapter = Arc::new(StubAdapter::new(Provider::GoogleDrive));
    let mut stale = item("f1", "stale.txt");
    stale.modified_at = Some(Utc::now() - Duration::days(7));
    let fresh = item("f2", "fresh.txt");
    adapter.push_page(vec![stale, fresh], None);
    let h = harness(vec![adapter]);

    let conn = linked_connection(&h, Provider::GoogleDrive).await;
    h.connections
        .set_last_synced(conn.id, Utc::now() - Duration::days(1))
        .await
        .unwrap();
    let results = h.orchestrator.sync_connections(&caller(), None).await;

    let result = &results[0];
    assert_eq!(result.stats.listed, 2);
    assert_eq!(result.stats.downloaded, 1);
    assert_eq!(result.stats.skipped, 1);
    assert_eq!(h.objects.keys(), vec!["org-1/google_drive/user-1/fresh.txt".to_string()]);
}

#[tokio::test]
async fn rate_limited_download_is_retried_once() {
    let adapter = Arc::new(StubAdapter::new(Provider::GoogleDrive));
    adapter.push_page(vec![item("f1", "slow.txt")], None);
    // First attempt rate-limited, retry succeeds.
    adapter.fail_download(
        "f1",
        ProviderError::new(ProviderErrorKind::RateLimited, true, "429 too many requests"),
    );
    let h = harness(vec![adapter]);
    linked_connection(&h, Provider::GoogleDrive).await;

    let results = h.orchestrator.sync_connections(&caller(), None).await;

    let result = &results[0];
    assert_eq!(result.outcome, SyncOutcome::Succeeded);
    assert_eq!(result.stats.downloaded, 1);
    assert_eq!(result.stats.errors, 0);
}

#[tokio::test]
async fn held_lease_rejects_second_sync() {
    let adapter = Arc::new(StubAdapter::new(Provider::GoogleDrive));
    adapter.push_page(vec![item("f1", "a.txt")], None);
    let h = harness(vec![adapter]);
    let conn = linked_connection(&h, Provider::GoogleDrive).await;

    // Another worker currently holds the lease.
    h.leases.plant(SyncLease {
        connection_id: conn.id,
        holder: Uuid::now_v7(),
        expires_at: Utc::now() + Duration::seconds(600),
    });

    let results = h.orchestrator.sync_connections(&caller(), None).await;

    assert_eq!(results[0].outcome, SyncOutcome::AlreadyRunning);
    assert!(results[0].run_id.is_none());
    assert_eq!(h.runs.list_by_connection(conn.id).await.unwrap().len(), 0);
}

#[tokio::test]
async fn expired_lease_is_reclaimed() {
    let adapter = Arc::new(StubAdapter::new(Provider::GoogleDrive));
    adapter.push_page(vec![item("f1", "a.txt")], None);
    let h = harness(vec![adapter]);
    let conn = linked_connection(&h, Provider::GoogleDrive).await;

    // Lease left behind by a crashed run, already expired.
    h.leases.plant(SyncLease {
        connection_id: conn.id,
        holder: Uuid::now_v7(),
        expires_at: Utc::now() - Duration::seconds(30),
    });

    let results = h.orchestrator.sync_connections(&caller(), None).await;

    assert_eq!(results[0].outcome, SyncOutcome::Succeeded);
    // Lease released after the run.
    assert!(h.leases.holder_of(conn.id).is_none());
}

#[tokio::test]
async fn concurrent_syncs_never_double_run_a_connection() {
    let adapter = Arc::new(StubAdapter::new(Provider::GoogleDrive));
    // Two invocations race; only one will find pages, which is fine --
    // the assertion is about run bookkeeping, not item counts.
    adapter.push_page(vec![item("f1", "a.txt")], None);
    let h = harness(vec![adapter]);
    let conn = linked_connection(&h, Provider::GoogleDrive).await;

    let caller_a = caller();
    let caller_b = caller();
    let (first, second) = tokio::join!(
        h.orchestrator.sync_connections(&caller_a, None),
        h.orchestrator.sync_connections(&caller_b, None),
    );

    let outcomes = [first[0].outcome, second[0].outcome];
    let ran = outcomes.iter().filter(|o| **o != SyncOutcome::AlreadyRunning).count();
    let runs = h.runs.list_by_connection(conn.id).await.unwrap();

    // However the race lands, there is never more than one run per
    // invocation that actually executed, and none were running
    // simultaneously at the end.
    assert_eq!(runs.len(), ran);
    assert_eq!(h.runs.running_count(), 0);
    assert!(runs.iter().all(|run| run.status.is_terminal()));
}

#[tokio::test]
async fn provider_filter_limits_the_sweep() {
    let drive = Arc::new(StubAdapter::new(Provider::GoogleDrive));
    drive.push_page(vec![item("f1", "a.txt")], None);
    let dropbox = Arc::new(StubAdapter::new(Provider::Dropbox));
    dropbox.push_page(vec![item("f2", "b.txt")], None);
    let h = harness(vec![drive, dropbox]);
    linked_connection(&h, Provider::GoogleDrive).await;
    linked_connection(&h, Provider::Dropbox).await;

    let results = h.orchestrator.sync_connections(&caller(), Some(Provider::Dropbox)).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].provider, Provider::Dropbox);
}

#[tokio::test]
async fn calendar_events_upsert_and_disabled_calendars_are_skipped() {
    let adapter = Arc::new(StubAdapter::new(Provider::GoogleCalendar));
    adapter.set_calendars(vec![
        ("primary".to_string(), "Primary".to_string()),
        ("noise".to_string(), "Noisy calendar".to_string()),
    ]);
    let mut wanted = item("evt-1", "Standup");
    wanted.parent = Some("primary".to_string());
    let mut unwanted = item("evt-2", "Spam");
    unwanted.parent = Some("noise".to_string());
    adapter.push_page(vec![wanted, unwanted], None);

    let h = harness(vec![adapter]);
    let conn = linked_connection(&h, Provider::GoogleCalendar).await;

    // User opted the noisy calendar out beforehand.
    let noisy = h.calendars.upsert_discovered(conn.id, "noise", "Noisy calendar").await.unwrap();
    h.calendars.set_enabled(noisy.id, false).await.unwrap();

    let results = h.orchestrator.sync_connections(&caller(), None).await;

    let result = &results[0];
    assert_eq!(result.outcome, SyncOutcome::Succeeded);
    assert_eq!(result.stats.downloaded, 1);
    assert_eq!(result.stats.skipped, 1);

    assert!(h.mirror.get_event(conn.id, "evt-1").is_some());
    assert!(h.mirror.get_event(conn.id, "evt-2").is_none());

    // Events keyed by provider id: a second sweep overwrites, not
    // duplicates.
    assert_eq!(h.mirror.event_count(conn.id), 1);
}
