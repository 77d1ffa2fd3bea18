//! # Orbit Common
//!
//! Reusable security services shared across the workspace:
//!
//! - [`vault`]: credential encryption at rest (slow KDF + AEAD)
//! - [`linkstate`]: signed, TTL-bounded CSRF link-state for OAuth flows
//!
//! ## Architecture
//! - Depends only on `orbit-domain` and external crates
//! - No I/O: every operation is pure given its explicit inputs

pub mod linkstate;
pub mod vault;

pub use linkstate::{generate_state, LinkStateCodec, LinkStateError, LinkTicket};
pub use vault::{CredentialVault, VaultError};
