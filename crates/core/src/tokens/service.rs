//! Token refresh service
//!
//! Ensures a valid access token is available before any adapter call that
//! requires authorization. Tokens within the safety margin of expiry are
//! refreshed, re-encrypted, and persisted; a failed refresh degrades the
//! connection to `Error` so future sync attempts skip it until the user
//! relinks.

use std::sync::Arc;

use chrono::{Duration, Utc};
use orbit_common::vault::CredentialVault;
use orbit_domain::{Connection, IntegrationConfig, OrbitError, Result};
use tracing::{debug, info, warn};

use crate::connections::ports::ConnectionRepository;
use crate::providers::ports::{AdapterRegistry, ProviderAdapter};

/// Token refresh service
pub struct TokenRefreshService {
    vault: Arc<CredentialVault>,
    connections: Arc<dyn ConnectionRepository>,
    adapters: Arc<dyn AdapterRegistry>,
    config: IntegrationConfig,
}

impl TokenRefreshService {
    pub fn new(
        vault: Arc<CredentialVault>,
        connections: Arc<dyn ConnectionRepository>,
        adapters: Arc<dyn AdapterRegistry>,
        config: IntegrationConfig,
    ) -> Self {
        Self { vault, connections, adapters, config }
    }

    /// Return a decrypted, valid access token for the connection.
    ///
    /// The stored token is reused when no expiry is recorded or expiry is
    /// more than the safety margin away; otherwise exactly one refresh
    /// attempt is made.
    ///
    /// # Errors
    /// - `AuthExpired` when no usable token exists or the refresh attempt
    ///   fails (the connection is marked `Error` first)
    /// - `Decryption` when the stored record does not decrypt
    /// - `Config` when the provider has no registered client credentials
    pub async fn ensure_access_token(&self, connection: &Connection) -> Result<String> {
        let access_enc = connection.access_token_enc.as_ref().ok_or_else(|| {
            OrbitError::AuthExpired("connection has no stored access token".to_string())
        })?;

        if !self.needs_refresh(connection) {
            return Ok(self.vault.decrypt(access_enc)?);
        }

        self.refresh(connection).await
    }

    fn needs_refresh(&self, connection: &Connection) -> bool {
        let margin = Duration::seconds(self.config.sync.token_refresh_margin_secs);
        match connection.expires_at {
            Some(expires_at) => Utc::now() + margin >= expires_at,
            // Tokens without expiry (app passwords) never refresh.
            None => false,
        }
    }

    async fn refresh(&self, connection: &Connection) -> Result<String> {
        debug!(
            connection_id = %connection.id,
            provider = %connection.provider,
            "access token at or past refresh margin"
        );

        let adapter = self.adapter_for(connection)?;
        let creds = self.config.credentials(connection.provider).ok_or_else(|| {
            OrbitError::Config(format!(
                "no client credentials registered for {}",
                connection.provider
            ))
        })?;

        let refresh_enc = match connection.refresh_token_enc.as_ref() {
            Some(enc) => enc,
            None => {
                let message = "no refresh token available".to_string();
                self.degrade(connection, &message).await;
                return Err(OrbitError::AuthExpired(message));
            }
        };
        let refresh_token = self.vault.decrypt(refresh_enc)?;

        match adapter.refresh_access_token(creds, &refresh_token).await {
            Ok(grant) => {
                let access = self.vault.encrypt(&grant.access_token).map_err(OrbitError::from)?;
                let rotated = match grant.refresh_token.as_deref() {
                    Some(token) => Some(self.vault.encrypt(token).map_err(OrbitError::from)?),
                    None => None,
                };
                let expires_at = Some(Utc::now() + Duration::seconds(grant.expires_in_secs));

                self.connections
                    .update_tokens(connection.id, access, rotated, expires_at)
                    .await?;

                info!(
                    connection_id = %connection.id,
                    provider = %connection.provider,
                    "refreshed access token"
                );
                Ok(grant.access_token)
            }
            Err(err) => {
                let message = format!("token refresh failed: {err}");
                self.degrade(connection, &message).await;
                Err(OrbitError::AuthExpired(message))
            }
        }
    }

    /// Mark the connection as errored. Storage failures here are logged
    /// and swallowed so the refresh error itself still reaches the caller.
    async fn degrade(&self, connection: &Connection, message: &str) {
        if let Err(err) = self
            .connections
            .set_status(
                connection.id,
                orbit_domain::ConnectionStatus::Error,
                Some(message.to_string()),
            )
            .await
        {
            warn!(
                connection_id = %connection.id,
                error = %err,
                "failed to persist degraded connection status"
            );
        }
    }

    fn adapter_for(&self, connection: &Connection) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters.adapter(connection.provider).ok_or_else(|| {
            OrbitError::Config(format!("no adapter registered for {}", connection.provider))
        })
    }
}
