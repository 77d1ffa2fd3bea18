//! Sync run bookkeeping types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::connection::Provider;

/// Status of one orchestrator execution against one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl SyncRunStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Per-run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub listed: u64,
    pub downloaded: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// One execution attempt of the orchestrator against one connection
///
/// Immutable once terminal: the repository refuses to finish a run that is
/// already succeeded or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub org_id: String,
    pub user_id: String,
    pub provider: Provider,
    pub status: SyncRunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats: SyncStats,
    pub error: Option<String>,
}

impl SyncRun {
    /// New run in `Running` state, stamped with the current time.
    #[must_use]
    pub fn start(connection_id: Uuid, org_id: String, user_id: String, provider: Provider) -> Self {
        Self {
            id: Uuid::now_v7(),
            connection_id,
            org_id,
            user_id,
            provider,
            status: SyncRunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            stats: SyncStats::default(),
            error: None,
        }
    }

    /// Finalize in place with a terminal status.
    pub fn finish(&mut self, status: SyncRunStatus, stats: SyncStats, error: Option<String>) {
        self.status = status;
        self.stats = stats;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}

/// Persisted per-connection sync lease
///
/// Guarantees at most one running sync per connection across independent
/// worker processes. A crashed run's lease is reclaimable once expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLease {
    pub connection_id: Uuid,
    pub holder: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl SyncLease {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
