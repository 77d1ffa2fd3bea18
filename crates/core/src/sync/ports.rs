//! Storage ports for sync runs, leases, and the destination object store

use async_trait::async_trait;
use orbit_domain::{Result, SyncRun, SyncRunStatus, SyncStats};
use uuid::Uuid;

/// Trait for sync-run persistence
#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    async fn create(&self, run: SyncRun) -> Result<SyncRun>;

    /// Finalize a running run with a terminal status. Finishing an
    /// already-terminal run is a storage error: terminal runs are
    /// immutable.
    async fn finish(
        &self,
        run_id: Uuid,
        status: SyncRunStatus,
        stats: SyncStats,
        error: Option<String>,
    ) -> Result<()>;

    async fn list_by_connection(&self, connection_id: Uuid) -> Result<Vec<SyncRun>>;
}

/// Trait for the persisted per-connection sync lease
///
/// The lease guarantees at most one running sync per connection across
/// independent worker processes; an expired lease (crashed run) is
/// reclaimed by the next acquire.
#[async_trait]
pub trait SyncLeaseStore: Send + Sync {
    /// Try to take the lease. Returns `false` when another holder has an
    /// unexpired lease on the connection.
    async fn acquire(&self, connection_id: Uuid, holder: Uuid, ttl_secs: i64) -> Result<bool>;

    /// Release the lease if `holder` still owns it.
    async fn release(&self, connection_id: Uuid, holder: Uuid) -> Result<()>;
}

/// Trait for the destination object store
///
/// Keys are namespaced by the orchestrator's computed prefix; the store
/// itself is implemented elsewhere.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: Option<&str>) -> Result<()>;

    /// Remove every object under a prefix (disconnect cascade).
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
}
