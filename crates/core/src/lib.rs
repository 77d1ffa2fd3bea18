//! # Orbit Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The connection link/unlink state machine
//! - The token refresh service
//! - The sync orchestrator and run bookkeeping
//! - Port/adapter interfaces (traits)
//!
//! ## Architecture Principles
//! - Only depends on `orbit-domain` and `orbit-common`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod connections;
pub mod providers;
pub mod sync;
pub mod testing;
pub mod tokens;

// Re-export specific items to avoid ambiguity
pub use connections::ports::{CalendarRegistry, ConnectionRepository, MirrorStore};
pub use connections::service::{ConnectionService, LinkStart};
pub use providers::ports::{
    AdapterRegistry, DownloadedItem, ItemPage, ProviderAdapter, TokenGrant,
};
pub use sync::ports::{ObjectStore, SyncLeaseStore, SyncRunRepository};
pub use sync::service::{ConnectionSyncResult, SyncOrchestrator, SyncOutcome};
pub use tokens::service::TokenRefreshService;
