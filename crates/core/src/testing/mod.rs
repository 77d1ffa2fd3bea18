//! In-memory port implementations for tests
//!
//! Deterministic doubles for every storage port plus a scriptable provider
//! adapter. Production code never touches this module; integration tests
//! across the workspace build services on top of these.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use orbit_domain::{
    AccountProfile, Connection, ConnectionStatus, EncryptedSecret, OrbitError, Provider,
    ProviderCredentials, ProviderError, RemoteCalendar, RemoteItem, Result, SyncLease, SyncRun,
    SyncRunStatus, SyncStats,
};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::connections::ports::{CalendarRegistry, ConnectionRepository, MirrorStore};
use crate::providers::ports::{
    AdapterRegistry, DownloadedItem, ItemPage, ProviderAdapter, TokenGrant,
};
use crate::sync::ports::{ObjectStore, SyncLeaseStore, SyncRunRepository};

/// In-memory connection repository
#[derive(Default)]
pub struct InMemoryConnectionRepository {
    rows: Mutex<HashMap<Uuid, Connection>>,
}

impl InMemoryConnectionRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct snapshot for assertions.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Connection> {
        self.rows.lock().get(&id).cloned()
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnectionRepository {
    async fn upsert(&self, connection: Connection) -> Result<Connection> {
        let mut rows = self.rows.lock();
        // One connection per (user, provider): replace any existing row.
        rows.retain(|_, existing| {
            !(existing.user_id == connection.user_id && existing.provider == connection.provider)
        });
        rows.insert(connection.id, connection.clone());
        Ok(connection)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Connection>> {
        Ok(self.rows.lock().get(&id).cloned())
    }

    async fn find_by_user_provider(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<Connection>> {
        Ok(self
            .rows
            .lock()
            .values()
            .find(|conn| conn.user_id == user_id && conn.provider == provider)
            .cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Connection>> {
        let mut connections: Vec<Connection> =
            self.rows.lock().values().filter(|conn| conn.user_id == user_id).cloned().collect();
        connections.sort_by_key(|conn| conn.created_at);
        Ok(connections)
    }

    async fn list_active_by_user(&self, user_id: &str) -> Result<Vec<Connection>> {
        Ok(self
            .list_by_user(user_id)
            .await?
            .into_iter()
            .filter(Connection::is_active)
            .collect())
    }

    async fn update_tokens(
        &self,
        id: Uuid,
        access: EncryptedSecret,
        refresh: Option<EncryptedSecret>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut rows = self.rows.lock();
        let conn = rows
            .get_mut(&id)
            .ok_or_else(|| OrbitError::NotFound("connection not found".to_string()))?;
        conn.access_token_enc = Some(access);
        if let Some(refresh) = refresh {
            conn.refresh_token_enc = Some(refresh);
        }
        conn.expires_at = expires_at;
        conn.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: ConnectionStatus,
        error: Option<String>,
    ) -> Result<()> {
        let mut rows = self.rows.lock();
        let conn = rows
            .get_mut(&id)
            .ok_or_else(|| OrbitError::NotFound("connection not found".to_string()))?;
        conn.status = status;
        conn.last_error = error;
        conn.updated_at = Utc::now();
        Ok(())
    }

    async fn set_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut rows = self.rows.lock();
        let conn = rows
            .get_mut(&id)
            .ok_or_else(|| OrbitError::NotFound("connection not found".to_string()))?;
        conn.last_synced_at = Some(at);
        conn.updated_at = Utc::now();
        Ok(())
    }

    async fn revoke(&self, id: Uuid) -> Result<()> {
        let mut rows = self.rows.lock();
        let conn = rows
            .get_mut(&id)
            .ok_or_else(|| OrbitError::NotFound("connection not found".to_string()))?;
        conn.revoke();
        Ok(())
    }
}

/// In-memory sync-run repository
#[derive(Default)]
pub struct InMemorySyncRunRepository {
    rows: Mutex<HashMap<Uuid, SyncRun>>,
}

impl InMemorySyncRunRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<SyncRun> {
        self.rows.lock().get(&id).cloned()
    }

    /// Number of runs currently in `Running` state.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.rows.lock().values().filter(|run| run.status == SyncRunStatus::Running).count()
    }
}

#[async_trait]
impl SyncRunRepository for InMemorySyncRunRepository {
    async fn create(&self, run: SyncRun) -> Result<SyncRun> {
        self.rows.lock().insert(run.id, run.clone());
        Ok(run)
    }

    async fn finish(
        &self,
        run_id: Uuid,
        status: SyncRunStatus,
        stats: SyncStats,
        error: Option<String>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(OrbitError::InvalidInput(
                "finish requires a terminal status".to_string(),
            ));
        }
        let mut rows = self.rows.lock();
        let run = rows
            .get_mut(&run_id)
            .ok_or_else(|| OrbitError::NotFound("sync run not found".to_string()))?;
        if run.status.is_terminal() {
            return Err(OrbitError::Storage("sync run is already terminal".to_string()));
        }
        run.finish(status, stats, error);
        Ok(())
    }

    async fn list_by_connection(&self, connection_id: Uuid) -> Result<Vec<SyncRun>> {
        let mut runs: Vec<SyncRun> = self
            .rows
            .lock()
            .values()
            .filter(|run| run.connection_id == connection_id)
            .cloned()
            .collect();
        runs.sort_by_key(|run| run.started_at);
        Ok(runs)
    }
}

/// In-memory lease store with expiry-based reclamation
#[derive(Default)]
pub struct InMemoryLeaseStore {
    leases: Mutex<HashMap<Uuid, SyncLease>>,
}

impl InMemoryLeaseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plant a lease directly (crash simulation in tests).
    pub fn plant(&self, lease: SyncLease) {
        self.leases.lock().insert(lease.connection_id, lease);
    }

    #[must_use]
    pub fn holder_of(&self, connection_id: Uuid) -> Option<Uuid> {
        self.leases.lock().get(&connection_id).map(|lease| lease.holder)
    }
}

#[async_trait]
impl SyncLeaseStore for InMemoryLeaseStore {
    async fn acquire(&self, connection_id: Uuid, holder: Uuid, ttl_secs: i64) -> Result<bool> {
        let mut leases = self.leases.lock();
        let now = Utc::now();
        if let Some(existing) = leases.get(&connection_id) {
            if !existing.is_expired(now) {
                return Ok(false);
            }
        }
        leases.insert(
            connection_id,
            SyncLease { connection_id, holder, expires_at: now + Duration::seconds(ttl_secs) },
        );
        Ok(true)
    }

    async fn release(&self, connection_id: Uuid, holder: Uuid) -> Result<()> {
        let mut leases = self.leases.lock();
        if leases.get(&connection_id).map(|lease| lease.holder) == Some(holder) {
            leases.remove(&connection_id);
        }
        Ok(())
    }
}

/// In-memory destination object store
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, Option<String>)>>,
}

impl InMemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(key).map(|(bytes, _)| bytes.clone())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: Option<&str>) -> Result<()> {
        self.objects
            .lock()
            .insert(key.to_string(), (bytes.to_vec(), content_type.map(str::to_string)));
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let full_prefix = format!("{prefix}/");
        self.objects.lock().retain(|key, _| key != prefix && !key.starts_with(&full_prefix));
        Ok(())
    }
}

/// In-memory mirrored calendar-event store
#[derive(Default)]
pub struct InMemoryMirrorStore {
    events: Mutex<HashMap<(Uuid, String), Vec<u8>>>,
}

impl InMemoryMirrorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn event_count(&self, connection_id: Uuid) -> usize {
        self.events.lock().keys().filter(|(conn, _)| *conn == connection_id).count()
    }

    #[must_use]
    pub fn get_event(&self, connection_id: Uuid, provider_event_id: &str) -> Option<Vec<u8>> {
        self.events.lock().get(&(connection_id, provider_event_id.to_string())).cloned()
    }
}

#[async_trait]
impl MirrorStore for InMemoryMirrorStore {
    async fn upsert_event(
        &self,
        connection_id: Uuid,
        provider_event_id: &str,
        payload: &[u8],
    ) -> Result<()> {
        self.events
            .lock()
            .insert((connection_id, provider_event_id.to_string()), payload.to_vec());
        Ok(())
    }

    async fn delete_by_connection(&self, connection_id: Uuid) -> Result<()> {
        self.events.lock().retain(|(conn, _), _| *conn != connection_id);
        Ok(())
    }
}

/// In-memory calendar registry
#[derive(Default)]
pub struct InMemoryCalendarRegistry {
    rows: Mutex<HashMap<Uuid, RemoteCalendar>>,
}

impl InMemoryCalendarRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalendarRegistry for InMemoryCalendarRegistry {
    async fn upsert_discovered(
        &self,
        connection_id: Uuid,
        provider_calendar_id: &str,
        name: &str,
    ) -> Result<RemoteCalendar> {
        let mut rows = self.rows.lock();
        if let Some(existing) = rows.values_mut().find(|cal| {
            cal.connection_id == connection_id && cal.provider_calendar_id == provider_calendar_id
        }) {
            existing.name = name.to_string();
            return Ok(existing.clone());
        }
        let calendar =
            RemoteCalendar::new(connection_id, provider_calendar_id.to_string(), name.to_string());
        rows.insert(calendar.id, calendar.clone());
        Ok(calendar)
    }

    async fn find(&self, calendar_id: Uuid) -> Result<Option<RemoteCalendar>> {
        Ok(self.rows.lock().get(&calendar_id).cloned())
    }

    async fn list_by_connection(&self, connection_id: Uuid) -> Result<Vec<RemoteCalendar>> {
        let mut calendars: Vec<RemoteCalendar> = self
            .rows
            .lock()
            .values()
            .filter(|cal| cal.connection_id == connection_id)
            .cloned()
            .collect();
        calendars.sort_by(|a, b| a.provider_calendar_id.cmp(&b.provider_calendar_id));
        Ok(calendars)
    }

    async fn set_enabled(&self, calendar_id: Uuid, enabled: bool) -> Result<()> {
        let mut rows = self.rows.lock();
        let calendar = rows
            .get_mut(&calendar_id)
            .ok_or_else(|| OrbitError::NotFound("calendar not found".to_string()))?;
        calendar.is_enabled = enabled;
        Ok(())
    }

    async fn delete_by_connection(&self, connection_id: Uuid) -> Result<()> {
        self.rows.lock().retain(|_, cal| cal.connection_id != connection_id);
        Ok(())
    }
}

/// Registry backed by a plain map
#[derive(Default)]
pub struct StaticAdapterRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl StaticAdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }
}

impl AdapterRegistry for StaticAdapterRegistry {
    fn adapter(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }
}

/// Scriptable provider adapter for tests.
///
/// Pages are served in order; download failures are queued per item id and
/// consumed one per call.
pub struct StubAdapter {
    provider: Provider,
    pages: Mutex<VecDeque<ItemPage>>,
    seen_continuations: Mutex<Vec<Option<String>>>,
    download_failures: Mutex<HashMap<String, VecDeque<ProviderError>>>,
    list_failure: Mutex<Option<ProviderError>>,
    exchange_result: Mutex<Option<std::result::Result<TokenGrant, ProviderError>>>,
    refresh_result: Mutex<Option<std::result::Result<TokenGrant, ProviderError>>>,
    refresh_calls: Mutex<u32>,
    profile: Mutex<std::result::Result<AccountProfile, ProviderError>>,
    calendars: Mutex<Vec<(String, String)>>,
    probe_result: Mutex<std::result::Result<(), ProviderError>>,
}

impl StubAdapter {
    #[must_use]
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            pages: Mutex::new(VecDeque::new()),
            seen_continuations: Mutex::new(Vec::new()),
            download_failures: Mutex::new(HashMap::new()),
            list_failure: Mutex::new(None),
            exchange_result: Mutex::new(None),
            refresh_result: Mutex::new(None),
            refresh_calls: Mutex::new(0),
            profile: Mutex::new(Ok(AccountProfile { email: Some("user@example.com".into()) })),
            calendars: Mutex::new(Vec::new()),
            probe_result: Mutex::new(Ok(())),
        }
    }

    pub fn push_page(&self, items: Vec<RemoteItem>, next_continuation: Option<String>) {
        self.pages.lock().push_back(ItemPage { items, next_continuation });
    }

    pub fn fail_download(&self, item_id: &str, error: ProviderError) {
        self.download_failures.lock().entry(item_id.to_string()).or_default().push_back(error);
    }

    pub fn fail_listing(&self, error: ProviderError) {
        *self.list_failure.lock() = Some(error);
    }

    pub fn set_exchange(&self, result: std::result::Result<TokenGrant, ProviderError>) {
        *self.exchange_result.lock() = Some(result);
    }

    pub fn set_refresh(&self, result: std::result::Result<TokenGrant, ProviderError>) {
        *self.refresh_result.lock() = Some(result);
    }

    pub fn set_profile(&self, result: std::result::Result<AccountProfile, ProviderError>) {
        *self.profile.lock() = result;
    }

    pub fn set_calendars(&self, calendars: Vec<(String, String)>) {
        *self.calendars.lock() = calendars;
    }

    pub fn set_probe(&self, result: std::result::Result<(), ProviderError>) {
        *self.probe_result.lock() = result;
    }

    #[must_use]
    pub fn refresh_calls(&self) -> u32 {
        *self.refresh_calls.lock()
    }

    /// Continuation tokens observed by `list_items`, in call order.
    #[must_use]
    pub fn seen_continuations(&self) -> Vec<Option<String>> {
        self.seen_continuations.lock().clone()
    }
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn build_authorization_url(
        &self,
        creds: &ProviderCredentials,
        state: &str,
    ) -> std::result::Result<String, ProviderError> {
        Ok(format!(
            "https://auth.example.com/authorize?client_id={}&state={state}",
            creds.client_id
        ))
    }

    async fn exchange_code(
        &self,
        _creds: &ProviderCredentials,
        _code: &str,
    ) -> std::result::Result<TokenGrant, ProviderError> {
        self.exchange_result.lock().take().unwrap_or_else(|| {
            Ok(TokenGrant {
                access_token: "stub-access".to_string(),
                refresh_token: Some("stub-refresh".to_string()),
                expires_in_secs: 3600,
            })
        })
    }

    async fn fetch_account_profile(
        &self,
        _access_token: &str,
    ) -> std::result::Result<AccountProfile, ProviderError> {
        self.profile.lock().clone()
    }

    async fn refresh_access_token(
        &self,
        _creds: &ProviderCredentials,
        _refresh_token: &str,
    ) -> std::result::Result<TokenGrant, ProviderError> {
        *self.refresh_calls.lock() += 1;
        self.refresh_result.lock().clone().unwrap_or_else(|| {
            Ok(TokenGrant {
                access_token: "refreshed-access".to_string(),
                refresh_token: None,
                expires_in_secs: 3600,
            })
        })
    }

    async fn list_items(
        &self,
        _access_token: &str,
        continuation: Option<&str>,
    ) -> std::result::Result<ItemPage, ProviderError> {
        self.seen_continuations.lock().push(continuation.map(str::to_string));
        if let Some(error) = self.list_failure.lock().take() {
            return Err(error);
        }
        Ok(self
            .pages
            .lock()
            .pop_front()
            .unwrap_or(ItemPage { items: Vec::new(), next_continuation: None }))
    }

    async fn download_item(
        &self,
        _access_token: &str,
        item: &RemoteItem,
    ) -> std::result::Result<DownloadedItem, ProviderError> {
        if let Some(queue) = self.download_failures.lock().get_mut(&item.id) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }
        Ok(DownloadedItem {
            bytes: format!("content-of-{}", item.id).into_bytes(),
            content_type: item.content_type.clone(),
        })
    }

    async fn list_calendars(
        &self,
        _access_token: &str,
    ) -> std::result::Result<Vec<(String, String)>, ProviderError> {
        Ok(self.calendars.lock().clone())
    }

    async fn probe_credentials(
        &self,
        _username: &str,
        _password: &str,
    ) -> std::result::Result<(), ProviderError> {
        self.probe_result.lock().clone()
    }
}
