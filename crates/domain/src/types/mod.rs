//! Domain types and models

pub mod connection;
pub mod identity;
pub mod remote;
pub mod sync_run;

pub use connection::{Connection, ConnectionStatus, EncryptedSecret, Provider, ProviderKind};
pub use identity::{Caller, Role};
pub use remote::{AccountProfile, RemoteCalendar, RemoteItem};
pub use sync_run::{SyncLease, SyncRun, SyncRunStatus, SyncStats};
