//! Sync orchestrator
//!
//! Iterates a user's active connections, pulls remote items through the
//! provider adapter, and writes them into the organization's storage
//! domain, recording one `SyncRun` per connection per execution.
//!
//! Fault isolation is the load-bearing property: an item failure is
//! counted and logged but never aborts the run, and a connection-level
//! failure (expired authorization, listing failure) terminates only that
//! connection's run while siblings proceed. The whole invocation always
//! returns one structured result per connection and never raises.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use orbit_domain::{
    destination_prefix, sanitize_item_name, Caller, Connection, OrbitError, Provider,
    ProviderErrorKind, ProviderKind, RemoteItem, Result, SyncRun, SyncRunStatus, SyncSettings,
    SyncStats,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::connections::ports::{CalendarRegistry, ConnectionRepository, MirrorStore};
use crate::providers::ports::{AdapterRegistry, ProviderAdapter};
use crate::sync::ports::{ObjectStore, SyncLeaseStore, SyncRunRepository};
use crate::tokens::service::TokenRefreshService;

/// Outcome of one connection's sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Succeeded,
    Failed,
    /// Another run holds the connection's lease; nothing was started.
    AlreadyRunning,
}

/// Per-connection result returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSyncResult {
    pub connection_id: Uuid,
    pub provider: Provider,
    pub outcome: SyncOutcome,
    pub stats: SyncStats,
    pub error: Option<String>,
    pub run_id: Option<Uuid>,
}

/// Sync orchestrator
pub struct SyncOrchestrator {
    connections: Arc<dyn ConnectionRepository>,
    runs: Arc<dyn SyncRunRepository>,
    leases: Arc<dyn SyncLeaseStore>,
    objects: Arc<dyn ObjectStore>,
    mirror: Arc<dyn MirrorStore>,
    calendars: Arc<dyn CalendarRegistry>,
    adapters: Arc<dyn AdapterRegistry>,
    tokens: Arc<TokenRefreshService>,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        runs: Arc<dyn SyncRunRepository>,
        leases: Arc<dyn SyncLeaseStore>,
        objects: Arc<dyn ObjectStore>,
        mirror: Arc<dyn MirrorStore>,
        calendars: Arc<dyn CalendarRegistry>,
        adapters: Arc<dyn AdapterRegistry>,
        tokens: Arc<TokenRefreshService>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            connections,
            runs,
            leases,
            objects,
            mirror,
            calendars,
            adapters,
            tokens,
            settings,
        }
    }

    /// Sync every active connection the caller owns, optionally filtered
    /// to one provider. Connections run with bounded parallelism; each
    /// one's pagination stays strictly sequential.
    ///
    /// Never raises: every connection yields a structured result so the
    /// caller can render partial success per provider.
    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn sync_connections(
        &self,
        caller: &Caller,
        provider_filter: Option<Provider>,
    ) -> Vec<ConnectionSyncResult> {
        let connections = match self.connections.list_active_by_user(&caller.user_id).await {
            Ok(connections) => connections,
            Err(err) => {
                error!(error = %err, "failed to list connections; nothing to sync");
                return Vec::new();
            }
        };

        let selected: Vec<Connection> = connections
            .into_iter()
            .filter(|conn| provider_filter.map_or(true, |p| conn.provider == p))
            .collect();

        info!(count = selected.len(), "starting sync across connections");

        stream::iter(selected)
            .map(|connection| self.sync_one(connection))
            .buffer_unordered(self.settings.max_concurrent_connections.max(1))
            .collect()
            .await
    }

    /// Run one connection end to end, including lease handling and run
    /// bookkeeping. Infallible by construction: failures land in the
    /// result.
    async fn sync_one(&self, connection: Connection) -> ConnectionSyncResult {
        let holder = Uuid::now_v7();

        match self
            .leases
            .acquire(connection.id, holder, self.settings.lease_ttl_secs)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(connection_id = %connection.id, "sync already running; rejecting");
                return ConnectionSyncResult {
                    connection_id: connection.id,
                    provider: connection.provider,
                    outcome: SyncOutcome::AlreadyRunning,
                    stats: SyncStats::default(),
                    error: Some("a sync is already running for this connection".to_string()),
                    run_id: None,
                };
            }
            Err(err) => {
                return ConnectionSyncResult {
                    connection_id: connection.id,
                    provider: connection.provider,
                    outcome: SyncOutcome::Failed,
                    stats: SyncStats::default(),
                    error: Some(format!("lease acquisition failed: {err}")),
                    run_id: None,
                };
            }
        }

        let result = self.run_with_bookkeeping(&connection).await;

        if let Err(err) = self.leases.release(connection.id, holder).await {
            warn!(connection_id = %connection.id, error = %err, "failed to release sync lease");
        }

        result
    }

    async fn run_with_bookkeeping(&self, connection: &Connection) -> ConnectionSyncResult {
        let run = SyncRun::start(
            connection.id,
            connection.org_id.clone(),
            connection.user_id.clone(),
            connection.provider,
        );
        let started_at = run.started_at;
        let run_id = run.id;

        if let Err(err) = self.runs.create(run).await {
            return ConnectionSyncResult {
                connection_id: connection.id,
                provider: connection.provider,
                outcome: SyncOutcome::Failed,
                stats: SyncStats::default(),
                error: Some(format!("failed to record sync run: {err}")),
                run_id: None,
            };
        }

        let mut stats = SyncStats::default();
        match self.pull_connection(connection, &mut stats).await {
            Ok(()) => {
                // Partial item failure is not a run failure.
                if let Err(err) = self
                    .runs
                    .finish(run_id, SyncRunStatus::Succeeded, stats, None)
                    .await
                {
                    warn!(%run_id, error = %err, "failed to finalize sync run");
                }
                if let Err(err) = self.connections.set_last_synced(connection.id, started_at).await
                {
                    warn!(connection_id = %connection.id, error = %err, "failed to advance last_synced_at");
                }

                info!(
                    connection_id = %connection.id,
                    provider = %connection.provider,
                    listed = stats.listed,
                    downloaded = stats.downloaded,
                    skipped = stats.skipped,
                    errors = stats.errors,
                    "sync run succeeded"
                );

                ConnectionSyncResult {
                    connection_id: connection.id,
                    provider: connection.provider,
                    outcome: SyncOutcome::Succeeded,
                    stats,
                    error: None,
                    run_id: Some(run_id),
                }
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(finish_err) = self
                    .runs
                    .finish(run_id, SyncRunStatus::Failed, stats, Some(message.clone()))
                    .await
                {
                    warn!(%run_id, error = %finish_err, "failed to finalize sync run");
                }

                error!(
                    connection_id = %connection.id,
                    provider = %connection.provider,
                    error = %message,
                    "sync run failed"
                );

                ConnectionSyncResult {
                    connection_id: connection.id,
                    provider: connection.provider,
                    outcome: SyncOutcome::Failed,
                    stats,
                    error: Some(message),
                    run_id: Some(run_id),
                }
            }
        }
    }

    /// Page through the provider listing and mirror every new or changed
    /// item. Returns `Err` only for connection-level faults.
    async fn pull_connection(
        &self,
        connection: &Connection,
        stats: &mut SyncStats,
    ) -> Result<()> {
        let adapter = self.adapters.adapter(connection.provider).ok_or_else(|| {
            OrbitError::Config(format!("no adapter registered for {}", connection.provider))
        })?;

        let access_token = self.tokens.ensure_access_token(connection).await?;

        let prefix = destination_prefix(
            &connection.org_id,
            connection.provider,
            &connection.user_id,
            self.settings.destination_prefix_override.as_deref(),
        );

        let is_calendar = connection.provider.kind() == ProviderKind::Calendar;
        let enabled_calendars = if is_calendar {
            Some(self.refresh_calendar_registry(connection, adapter.as_ref(), &access_token).await?)
        } else {
            None
        };

        let mut continuation: Option<String> = None;

        loop {
            // Continuation tokens are opaque: threaded back verbatim,
            // interpreted only by the adapter that issued them.
            let page = adapter
                .list_items(&access_token, continuation.as_deref())
                .await
                .map_err(OrbitError::from)?;

            stats.listed += page.items.len() as u64;

            for item in &page.items {
                if let Some(enabled) = enabled_calendars.as_ref() {
                    let calendar_enabled = item
                        .parent
                        .as_deref()
                        .map_or(true, |calendar_id| enabled.contains(calendar_id));
                    if !calendar_enabled {
                        stats.skipped += 1;
                        continue;
                    }
                }

                if !self.needs_download(connection, item) {
                    stats.skipped += 1;
                    continue;
                }

                match self
                    .mirror_item(connection, adapter.as_ref(), &access_token, &prefix, item)
                    .await
                {
                    Ok(()) => stats.downloaded += 1,
                    Err(err) if err.kind == ProviderErrorKind::AuthExpired => {
                        // The whole connection is invalid; abort this run.
                        return Err(OrbitError::AuthExpired(err.message));
                    }
                    Err(err) => {
                        stats.errors += 1;
                        warn!(
                            connection_id = %connection.id,
                            item_id = %item.id,
                            error = %err,
                            "item sync failed; continuing"
                        );
                    }
                }
            }

            continuation = page.next_continuation;
            if continuation.is_none() {
                break;
            }
        }

        Ok(())
    }

    /// Unconditional download on first sync; afterwards only items modified
    /// since the last successful run. Items without a modification stamp
    /// are always re-downloaded.
    fn needs_download(&self, connection: &Connection, item: &RemoteItem) -> bool {
        match (item.modified_at, connection.last_synced_at) {
            (Some(modified), Some(last_synced)) => modified > last_synced,
            _ => true,
        }
    }

    /// Download one item and write it to the destination, retrying once
    /// after a backoff when the provider rate-limits.
    async fn mirror_item(
        &self,
        connection: &Connection,
        adapter: &dyn ProviderAdapter,
        access_token: &str,
        prefix: &str,
        item: &RemoteItem,
    ) -> std::result::Result<(), orbit_domain::ProviderError> {
        let mut attempt = 0u32;
        let downloaded = loop {
            match adapter.download_item(access_token, item).await {
                Ok(downloaded) => break downloaded,
                Err(err)
                    if err.kind == ProviderErrorKind::RateLimited
                        && err.retryable
                        && attempt < orbit_domain::constants::SYNC_MAX_ITEM_RETRIES =>
                {
                    let delay_ms = calculate_backoff(attempt);
                    debug!(item_id = %item.id, delay_ms, "rate limited; backing off");
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        let write_result = if connection.provider.kind() == ProviderKind::Calendar {
            self.mirror.upsert_event(connection.id, &item.id, &downloaded.bytes).await
        } else {
            let key = format!("{prefix}/{}", sanitize_item_name(&item.name));
            self.objects.put(&key, &downloaded.bytes, downloaded.content_type.as_deref()).await
        };

        write_result.map_err(|err| {
            orbit_domain::ProviderError::unknown(format!("destination write failed: {err}"))
        })
    }

    /// Re-discover the provider's calendars and return the enabled set of
    /// provider calendar ids.
    async fn refresh_calendar_registry(
        &self,
        connection: &Connection,
        adapter: &dyn ProviderAdapter,
        access_token: &str,
    ) -> Result<HashSet<String>> {
        match adapter.list_calendars(access_token).await {
            Ok(found) => {
                for (provider_calendar_id, name) in found {
                    if let Err(err) = self
                        .calendars
                        .upsert_discovered(connection.id, &provider_calendar_id, &name)
                        .await
                    {
                        warn!(error = %err, provider_calendar_id, "failed to record calendar");
                    }
                }
            }
            Err(err) => warn!(error = %err, "calendar discovery failed; using known registry"),
        }

        let known = self.calendars.list_by_connection(connection.id).await?;
        Ok(known
            .into_iter()
            .filter(|calendar| calendar.is_enabled)
            .map(|calendar| calendar.provider_calendar_id)
            .collect())
    }
}

/// Calculate exponential backoff delay with jitter (milliseconds).
#[must_use]
pub fn calculate_backoff(attempt: u32) -> u64 {
    let base_delay = 1000u64;
    let max_delay = 32000u64;

    let delay = base_delay * 2u64.pow(attempt.min(5));
    let capped_delay = delay.min(max_delay);

    // Add +/-25% jitter
    use rand::Rng;
    let jitter_range = (capped_delay as f64 * 0.25) as u64;
    let mut rng = rand::thread_rng();
    let jitter = rng.gen_range(0..=jitter_range * 2) as i64 - jitter_range as i64;

    (capped_delay as i64 + jitter).max(0) as u64
}
