//! Storage ports for connections and mirrored data
//!
//! The persistence layer is an external collaborator; these traits are the
//! narrow contracts it implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orbit_domain::{
    Connection, ConnectionStatus, EncryptedSecret, Provider, RemoteCalendar, Result,
};
use uuid::Uuid;

/// Trait for connection persistence
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    /// Insert or replace the connection keyed by (user, provider). This is
    /// what enforces the at-most-one-active-connection invariant.
    async fn upsert(&self, connection: Connection) -> Result<Connection>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Connection>>;

    async fn find_by_user_provider(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<Connection>>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Connection>>;

    async fn list_active_by_user(&self, user_id: &str) -> Result<Vec<Connection>>;

    /// Replace token material after a refresh. The four encrypted-field
    /// components are replaced together; `refresh` of `None` leaves the
    /// stored refresh token untouched (providers that do not rotate it).
    async fn update_tokens(
        &self,
        id: Uuid,
        access: EncryptedSecret,
        refresh: Option<EncryptedSecret>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn set_status(
        &self,
        id: Uuid,
        status: ConnectionStatus,
        error: Option<String>,
    ) -> Result<()>;

    async fn set_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Revoke locally: status to `Revoked`, both token fields nulled. The
    /// row itself is retained for audit.
    async fn revoke(&self, id: Uuid) -> Result<()>;
}

/// Trait for the per-calendar sync participation registry
#[async_trait]
pub trait CalendarRegistry: Send + Sync {
    /// Record a calendar discovered under a connection. Re-discovering an
    /// existing calendar refreshes its name but preserves `is_enabled`.
    async fn upsert_discovered(
        &self,
        connection_id: Uuid,
        provider_calendar_id: &str,
        name: &str,
    ) -> Result<RemoteCalendar>;

    async fn find(&self, calendar_id: Uuid) -> Result<Option<RemoteCalendar>>;

    async fn list_by_connection(&self, connection_id: Uuid) -> Result<Vec<RemoteCalendar>>;

    async fn set_enabled(&self, calendar_id: Uuid, enabled: bool) -> Result<()>;

    async fn delete_by_connection(&self, connection_id: Uuid) -> Result<()>;
}

/// Trait for mirrored calendar-event storage in the organization's domain
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Upsert one event payload keyed by (connection, provider event id).
    async fn upsert_event(
        &self,
        connection_id: Uuid,
        provider_event_id: &str,
        payload: &[u8],
    ) -> Result<()>;

    /// Cascade deletion when a connection is disconnected.
    async fn delete_by_connection(&self, connection_id: Uuid) -> Result<()>;
}
