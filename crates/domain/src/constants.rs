//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// Credential vault configuration
pub const MASTER_SECRET_MIN_LENGTH: usize = 32;
pub const KEY_DERIVATION_ITERATIONS: u32 = 100_000;

// OAuth linking configuration
pub const LINK_STATE_TTL_SECS: i64 = 600;

// Token refresh configuration
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

// Sync orchestration configuration
pub const SYNC_LEASE_TTL_SECS: i64 = 900;
pub const SYNC_MAX_CONCURRENT_CONNECTIONS: usize = 4;
pub const SYNC_MAX_ITEM_RETRIES: u32 = 1;
