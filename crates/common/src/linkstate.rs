//! Signed CSRF link-state for OAuth authorization flows.
//!
//! When a linking attempt starts, the manager issues an opaque random state
//! value and hands the browser a signed, TTL-bounded ticket binding that
//! state to the initiating user. The callback must present the ticket and
//! the provider-returned state; a forged signature, an expired ticket, a
//! state mismatch, or a different authenticated user all fail validation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use orbit_domain::constants::LINK_STATE_TTL_SECS;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Error type for link-state validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkStateError {
    #[error("signing key must be at least 32 bytes")]
    KeyTooShort,

    #[error("malformed link-state ticket")]
    Malformed,

    #[error("link-state signature mismatch")]
    SignatureMismatch,

    #[error("link-state ticket expired")]
    Expired,
}

/// Generate a random CSRF state token (32 bytes, base64url).
#[must_use]
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Payload sealed into the signed ticket at AUTHORIZING time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTicket {
    pub state: String,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
}

/// Seals and opens signed link-state tickets.
///
/// The codec is stateless; sealing is deterministic given a payload, and
/// opening verifies the HMAC before trusting any field.
pub struct LinkStateCodec {
    key: Vec<u8>,
    ttl_secs: i64,
}

impl std::fmt::Debug for LinkStateCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStateCodec")
            .field("key", &"[REDACTED]")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl LinkStateCodec {
    /// Create a codec with the default 600-second TTL.
    ///
    /// # Errors
    /// Returns [`LinkStateError::KeyTooShort`] for keys under 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, LinkStateError> {
        Self::with_ttl(key, LINK_STATE_TTL_SECS)
    }

    /// Create a codec with an explicit TTL (tests shrink it).
    ///
    /// # Errors
    /// Returns [`LinkStateError::KeyTooShort`] for keys under 32 bytes.
    pub fn with_ttl(key: &[u8], ttl_secs: i64) -> Result<Self, LinkStateError> {
        if key.len() < 32 {
            return Err(LinkStateError::KeyTooShort);
        }
        Ok(Self { key: key.to_vec(), ttl_secs })
    }

    /// Issue a fresh ticket for the given user.
    #[must_use]
    pub fn issue(&self, user_id: &str) -> (LinkTicket, String) {
        let ticket = LinkTicket {
            state: generate_state(),
            user_id: user_id.to_string(),
            issued_at: Utc::now(),
        };
        let sealed = self.seal(&ticket);
        (ticket, sealed)
    }

    /// Seal a ticket into `base64url(payload).base64url(hmac)`.
    #[must_use]
    pub fn seal(&self, ticket: &LinkTicket) -> String {
        // Serialization of a plain struct with string/timestamp fields
        // cannot fail.
        let payload = serde_json::to_vec(ticket).unwrap_or_default();
        let encoded = URL_SAFE_NO_PAD.encode(&payload);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&payload));
        format!("{encoded}.{signature}")
    }

    /// Verify and open a sealed ticket.
    ///
    /// # Errors
    /// - [`LinkStateError::Malformed`] for undecodable input
    /// - [`LinkStateError::SignatureMismatch`] for forged or re-keyed data
    /// - [`LinkStateError::Expired`] past the TTL
    pub fn open(&self, sealed: &str) -> Result<LinkTicket, LinkStateError> {
        let (encoded, signature) = sealed.split_once('.').ok_or(LinkStateError::Malformed)?;
        let payload =
            URL_SAFE_NO_PAD.decode(encoded).map_err(|_| LinkStateError::Malformed)?;
        let signature =
            URL_SAFE_NO_PAD.decode(signature).map_err(|_| LinkStateError::Malformed)?;

        let mut mac = self.mac();
        mac.update(&payload);
        mac.verify_slice(&signature).map_err(|_| LinkStateError::SignatureMismatch)?;

        let ticket: LinkTicket =
            serde_json::from_slice(&payload).map_err(|_| LinkStateError::Malformed)?;

        let age = Utc::now() - ticket.issued_at;
        if age.num_seconds() > self.ttl_secs || age.num_seconds() < 0 {
            return Err(LinkStateError::Expired);
        }

        Ok(ticket)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    fn mac(&self) -> HmacSha256 {
        // Key length is validated in the constructor; HMAC accepts any
        // length beyond that.
        #[allow(clippy::expect_used)]
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length")
    }
}
