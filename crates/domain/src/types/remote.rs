//! Ephemeral remote-side types
//!
//! `RemoteItem` lives only for the duration of one sync run; it is never
//! persisted. `RemoteCalendar` is the per-calendar sync participation
//! record backing the enable/disable toggle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One listed remote entry (file or calendar event) from a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Provider-side identifier (file id, event id, or WebDAV href)
    pub id: String,
    pub name: String,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
    /// Provider-side container: folder path for files, calendar id for
    /// events. `None` for root-level entries.
    pub parent: Option<String>,
}

/// Account profile fetched after token exchange (best-effort)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountProfile {
    pub email: Option<String>,
}

/// A remote calendar discovered under a connection, with its sync toggle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCalendar {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub provider_calendar_id: String,
    pub name: String,
    pub is_enabled: bool,
}

impl RemoteCalendar {
    #[must_use]
    pub fn new(connection_id: Uuid, provider_calendar_id: String, name: String) -> Self {
        Self { id: Uuid::now_v7(), connection_id, provider_calendar_id, name, is_enabled: true }
    }
}
