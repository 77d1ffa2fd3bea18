//! Credential vault: encryption at rest for provider tokens.
//!
//! Every secret is encrypted with AES-256-GCM under a key derived from the
//! server-held master secret via PBKDF2-HMAC-SHA256 (100k iterations) and a
//! per-call random salt. The resulting record carries ciphertext, nonce,
//! authentication tag, and salt as separate base64 fields; the four travel
//! together and are only meaningful as a unit.
//!
//! Encryption is randomized (fresh salt and nonce every call, so equal
//! plaintexts never produce equal records); decryption is deterministic
//! given identical inputs. A tampered component fails tag verification and
//! surfaces as [`VaultError::Decryption`], never as corrupt plaintext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use orbit_domain::constants::{KEY_DERIVATION_ITERATIONS, MASTER_SECRET_MIN_LENGTH};
use orbit_domain::{EncryptedSecret, OrbitError};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Historical fixed salt used before per-record salts were introduced.
/// Only the deprecated legacy decryption path may reference it.
const LEGACY_FIXED_SALT: &[u8; SALT_LEN] = b"orbit-static-kdf";

/// Error type for vault operations
#[derive(Debug, Error)]
pub enum VaultError {
    /// Master secret missing or too short
    #[error("vault configuration error: {0}")]
    Config(String),

    /// Encryption failed (key derivation or cipher setup)
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Tag verification failed: tampered record or wrong key
    #[error("decryption failed: {0}")]
    Decryption(String),
}

impl From<VaultError> for OrbitError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Config(msg) => Self::Config(msg),
            VaultError::Encryption(msg) => Self::Internal(msg),
            VaultError::Decryption(msg) => Self::Decryption(msg),
        }
    }
}

/// Credential vault bound to one master secret.
///
/// The master secret is constructor-injected and validated once; the vault
/// holds no other state, so concurrent use needs no synchronization.
pub struct CredentialVault {
    master_secret: String,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").field("master_secret", &"[REDACTED]").finish()
    }
}

impl CredentialVault {
    /// Create a vault from the server-held master secret.
    ///
    /// # Errors
    /// Returns [`VaultError::Config`] when the secret is blank or shorter
    /// than the minimum length. This check runs before any cryptographic
    /// work.
    pub fn new(master_secret: impl Into<String>) -> Result<Self, VaultError> {
        let master_secret = master_secret.into();
        if master_secret.trim().is_empty() {
            return Err(VaultError::Config("master secret is not set".to_string()));
        }
        if master_secret.len() < MASTER_SECRET_MIN_LENGTH {
            return Err(VaultError::Config(format!(
                "master secret must be at least {MASTER_SECRET_MIN_LENGTH} characters"
            )));
        }
        Ok(Self { master_secret })
    }

    /// Encrypt a plaintext secret into a four-component record.
    ///
    /// A fresh salt and nonce are drawn for every call; encrypting the same
    /// plaintext twice never yields the same record.
    ///
    /// # Errors
    /// Returns [`VaultError::Encryption`] if cipher setup fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, VaultError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let cipher = self.cipher_for_salt(&salt)?;
        let sealed = cipher
            .encrypt(&Nonce::from(nonce), plaintext.as_bytes())
            .map_err(|e| VaultError::Encryption(format!("AEAD encryption failed: {e}")))?;

        // aes-gcm appends the tag; store it as its own field
        let split = sealed.len().saturating_sub(TAG_LEN);
        let (ciphertext, auth_tag) = sealed.split_at(split);

        Ok(EncryptedSecret {
            ciphertext: BASE64.encode(ciphertext),
            iv: BASE64.encode(nonce),
            auth_tag: BASE64.encode(auth_tag),
            salt: BASE64.encode(salt),
        })
    }

    /// Decrypt a record produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    /// Returns [`VaultError::Decryption`] when any component is malformed
    /// or tag verification fails (tampered record or wrong master secret).
    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<String, VaultError> {
        let salt = decode_field(&secret.salt, "salt")?;
        self.decrypt_with_salt(secret, &salt)
    }

    /// Decrypt a record written under the historical fixed salt.
    ///
    /// One-time migration support only; new writes always go through
    /// [`encrypt`](Self::encrypt).
    #[deprecated(note = "fixed-salt records only; re-encrypt via migrate_legacy")]
    pub fn decrypt_legacy(&self, secret: &EncryptedSecret) -> Result<String, VaultError> {
        self.decrypt_with_salt(secret, LEGACY_FIXED_SALT)
    }

    /// Re-encrypt a legacy fixed-salt record under a fresh per-record salt.
    ///
    /// Idempotent in the sweep sense: feeding an already-migrated record
    /// fails with [`VaultError::Decryption`] and leaves it untouched, so a
    /// migration pass can be re-run safely with per-record error handling.
    pub fn migrate_legacy(&self, secret: &EncryptedSecret) -> Result<EncryptedSecret, VaultError> {
        #[allow(deprecated)]
        let plaintext = self.decrypt_legacy(secret)?;
        self.encrypt(&plaintext)
    }

    fn decrypt_with_salt(
        &self,
        secret: &EncryptedSecret,
        salt: &[u8],
    ) -> Result<String, VaultError> {
        let ciphertext = decode_field(&secret.ciphertext, "ciphertext")?;
        let nonce = decode_field(&secret.iv, "iv")?;
        let auth_tag = decode_field(&secret.auth_tag, "auth_tag")?;

        let nonce: [u8; NONCE_LEN] = nonce
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::Decryption("nonce must be 12 bytes".to_string()))?;

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&auth_tag);

        let cipher = self.cipher_for_salt(salt)?;
        let plaintext = cipher
            .decrypt(&Nonce::from(nonce), sealed.as_ref())
            .map_err(|_| VaultError::Decryption("authentication tag mismatch".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| VaultError::Decryption("plaintext is not valid UTF-8".to_string()))
    }

    fn cipher_for_salt(&self, salt: &[u8]) -> Result<Aes256Gcm, VaultError> {
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(
            self.master_secret.as_bytes(),
            salt,
            KEY_DERIVATION_ITERATIONS,
            &mut key,
        );
        Aes256Gcm::new_from_slice(&key)
            .map_err(|e| VaultError::Encryption(format!("cipher setup failed: {e}")))
    }
}

fn decode_field(value: &str, field: &str) -> Result<Vec<u8>, VaultError> {
    BASE64.decode(value).map_err(|e| VaultError::Decryption(format!("invalid {field}: {e}")))
}
