//! # Orbit Domain
//!
//! Business domain types and models for Orbit.
//!
//! This crate contains:
//! - Domain data types (Connection, SyncRun, RemoteItem, etc.)
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Destination path utilities
//!
//! ## Architecture
//! - No dependencies on other Orbit crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
// Re-export path utilities
pub use utils::path::{destination_prefix, normalize_prefix, sanitize_item_name};
