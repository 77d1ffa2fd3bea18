//! Connection link/unlink state machine
//!
//! Drives a linking attempt through authorize, callback, token exchange,
//! profile fetch, and persistence. Callback validation requires the
//! provider-returned state to exactly match the signed ticket issued at
//! authorize time, and the authenticated caller to be the user who
//! initiated the flow; either mismatch fails the attempt even when the
//! authorization code itself is valid.

use std::sync::Arc;

use chrono::{Duration, Utc};
use orbit_common::linkstate::LinkStateCodec;
use orbit_common::vault::CredentialVault;
use orbit_domain::{
    destination_prefix, Caller, Connection, ConnectionStatus, IntegrationConfig, OrbitError,
    Provider, ProviderCredentials, ProviderKind, Result, SyncRun,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::connections::ports::{CalendarRegistry, ConnectionRepository, MirrorStore};
use crate::providers::ports::{AdapterRegistry, ProviderAdapter, TokenGrant};
use crate::sync::ports::{ObjectStore, SyncRunRepository};

/// Result of initiating a linking attempt: the URL to open in the user's
/// browser and the sealed state ticket the web layer stores in the
/// short-lived cookie pair.
#[derive(Debug, Clone)]
pub struct LinkStart {
    pub authorization_url: String,
    pub sealed_state: String,
}

/// Connection manager service
pub struct ConnectionService {
    vault: Arc<CredentialVault>,
    codec: LinkStateCodec,
    connections: Arc<dyn ConnectionRepository>,
    calendars: Arc<dyn CalendarRegistry>,
    mirror: Arc<dyn MirrorStore>,
    objects: Arc<dyn ObjectStore>,
    runs: Arc<dyn SyncRunRepository>,
    adapters: Arc<dyn AdapterRegistry>,
    config: IntegrationConfig,
}

impl ConnectionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vault: Arc<CredentialVault>,
        codec: LinkStateCodec,
        connections: Arc<dyn ConnectionRepository>,
        calendars: Arc<dyn CalendarRegistry>,
        mirror: Arc<dyn MirrorStore>,
        objects: Arc<dyn ObjectStore>,
        runs: Arc<dyn SyncRunRepository>,
        adapters: Arc<dyn AdapterRegistry>,
        config: IntegrationConfig,
    ) -> Self {
        Self { vault, codec, connections, calendars, mirror, objects, runs, adapters, config }
    }

    /// Begin a linking attempt: role check, configuration check, then the
    /// provider authorization URL plus the sealed state ticket.
    #[instrument(skip(self), fields(user_id = %caller.user_id, provider = %provider))]
    pub fn initiate_connection(&self, caller: &Caller, provider: Provider) -> Result<LinkStart> {
        self.require_privileged(caller)?;

        if !provider.uses_oauth() {
            return Err(OrbitError::InvalidInput(format!(
                "{provider} links with an app password, not an authorization flow"
            )));
        }

        let creds = self.required_credentials(provider)?;
        let adapter = self.adapter_for(provider)?;

        let (ticket, sealed_state) = self.codec.issue(&caller.user_id);
        let authorization_url = adapter.build_authorization_url(creds, &ticket.state)?;

        info!("issued authorization URL");
        Ok(LinkStart { authorization_url, sealed_state })
    }

    /// Complete a linking attempt from the provider callback.
    ///
    /// Validates the CSRF state and initiating user against the sealed
    /// ticket, exchanges the code, fetches the profile best-effort,
    /// encrypts both tokens, and upserts the connection keyed by
    /// (user, provider).
    #[instrument(skip(self, code, sealed_state), fields(user_id = %caller.user_id, provider = %provider))]
    pub async fn complete_connection(
        &self,
        caller: &Caller,
        provider: Provider,
        code: &str,
        returned_state: &str,
        sealed_state: &str,
    ) -> Result<Connection> {
        let ticket = self
            .codec
            .open(sealed_state)
            .map_err(|err| OrbitError::InvalidState(err.to_string()))?;

        if ticket.state != returned_state {
            return Err(OrbitError::InvalidState("state mismatch".to_string()));
        }
        if ticket.user_id != caller.user_id {
            return Err(OrbitError::InvalidState(
                "callback user does not match initiating user".to_string(),
            ));
        }

        let creds = self.required_credentials(provider)?;
        let adapter = self.adapter_for(provider)?;

        let grant = adapter
            .exchange_code(creds, code)
            .await
            .map_err(|err| OrbitError::ExchangeFailed(err.to_string()))?;

        // Best-effort: a missing profile email is tolerated, not fatal.
        let account_email = match adapter.fetch_account_profile(&grant.access_token).await {
            Ok(profile) => profile.email,
            Err(err) => {
                warn!(error = %err, "profile fetch failed; continuing without email");
                None
            }
        };

        let connection =
            self.persist_linked(caller, provider, &grant, account_email).await?;

        if provider.kind() == ProviderKind::Calendar {
            self.discover_calendars(&connection, adapter.as_ref(), &grant.access_token).await;
        }

        info!(connection_id = %connection.id, "connection linked");
        Ok(connection)
    }

    /// Link a CalDAV-style provider with a username and app-specific
    /// password, verified by a directory-listing probe instead of any
    /// redirect flow.
    #[instrument(skip(self, app_password), fields(user_id = %caller.user_id, provider = %provider))]
    pub async fn link_caldav(
        &self,
        caller: &Caller,
        provider: Provider,
        username: &str,
        app_password: &str,
    ) -> Result<Connection> {
        self.require_privileged(caller)?;

        if provider.uses_oauth() {
            return Err(OrbitError::InvalidInput(format!(
                "{provider} links through the authorization flow"
            )));
        }

        let adapter = self.adapter_for(provider)?;
        adapter
            .probe_credentials(username, app_password)
            .await
            .map_err(|err| OrbitError::ExchangeFailed(format!("credential probe failed: {err}")))?;

        let mut connection = self.load_or_new(caller, provider).await?;
        connection.account_email = Some(username.to_string());
        // DAV requests authenticate with HTTP Basic, so the stored secret
        // is the username:password pair.
        connection.access_token_enc =
            Some(self.vault.encrypt(&format!("{username}:{app_password}"))?);
        connection.refresh_token_enc = None;
        // App passwords do not expire; the refresh service leaves them be.
        connection.expires_at = None;
        connection.status = ConnectionStatus::Active;
        connection.last_error = None;
        connection.updated_at = Utc::now();

        let connection = self.connections.upsert(connection).await?;
        info!(connection_id = %connection.id, "caldav connection linked");
        Ok(connection)
    }

    /// Disconnect a provider: best-effort remote revocation, local
    /// revocation, and cascade deletion of mirrored data. The connection
    /// row and its run history are retained for audit.
    #[instrument(skip(self), fields(user_id = %caller.user_id, provider = %provider))]
    pub async fn disconnect(&self, caller: &Caller, provider: Provider) -> Result<()> {
        let connection = self
            .connections
            .find_by_user_provider(&caller.user_id, provider)
            .await?
            .ok_or_else(|| OrbitError::NotFound(format!("no {provider} connection")))?;

        self.try_remote_revocation(&connection).await;

        self.mirror.delete_by_connection(connection.id).await?;
        self.calendars.delete_by_connection(connection.id).await?;

        let prefix = destination_prefix(
            &connection.org_id,
            provider,
            &connection.user_id,
            self.config.sync.destination_prefix_override.as_deref(),
        );
        self.objects.delete_prefix(&prefix).await?;

        self.connections.revoke(connection.id).await?;

        info!(connection_id = %connection.id, "connection revoked");
        Ok(())
    }

    /// All connections owned by the caller, any status.
    pub async fn list_connections(&self, caller: &Caller) -> Result<Vec<Connection>> {
        self.connections.list_by_user(&caller.user_id).await
    }

    /// Run history for one of the caller's connections.
    pub async fn list_runs(&self, caller: &Caller, connection_id: Uuid) -> Result<Vec<SyncRun>> {
        let connection = self
            .connections
            .find_by_id(connection_id)
            .await?
            .filter(|conn| conn.user_id == caller.user_id)
            .ok_or_else(|| OrbitError::NotFound("connection not found".to_string()))?;

        self.runs.list_by_connection(connection.id).await
    }

    /// Flip per-calendar sync participation. The calendar must belong to a
    /// connection owned by the caller.
    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn toggle_calendar_sync(
        &self,
        caller: &Caller,
        calendar_id: Uuid,
        enabled: bool,
    ) -> Result<()> {
        let calendar = self
            .calendars
            .find(calendar_id)
            .await?
            .ok_or_else(|| OrbitError::NotFound("calendar not found".to_string()))?;

        // Ownership check; a foreign calendar looks like a missing one.
        self.connections
            .find_by_id(calendar.connection_id)
            .await?
            .filter(|conn| conn.user_id == caller.user_id)
            .ok_or_else(|| OrbitError::NotFound("calendar not found".to_string()))?;

        self.calendars.set_enabled(calendar_id, enabled).await?;
        info!(%calendar_id, enabled, "calendar sync participation updated");
        Ok(())
    }

    async fn persist_linked(
        &self,
        caller: &Caller,
        provider: Provider,
        grant: &TokenGrant,
        account_email: Option<String>,
    ) -> Result<Connection> {
        let mut connection = self.load_or_new(caller, provider).await?;
        connection.account_email = account_email;
        connection.access_token_enc = Some(self.vault.encrypt(&grant.access_token)?);
        connection.refresh_token_enc = match grant.refresh_token.as_deref() {
            Some(token) => Some(self.vault.encrypt(token)?),
            None => None,
        };
        connection.expires_at = Some(Utc::now() + Duration::seconds(grant.expires_in_secs));
        connection.status = ConnectionStatus::Active;
        connection.last_error = None;
        connection.updated_at = Utc::now();

        self.connections.upsert(connection).await
    }

    async fn load_or_new(&self, caller: &Caller, provider: Provider) -> Result<Connection> {
        Ok(self
            .connections
            .find_by_user_provider(&caller.user_id, provider)
            .await?
            .unwrap_or_else(|| {
                Connection::new(caller.org_id.clone(), caller.user_id.clone(), provider)
            }))
    }

    /// Record the provider's calendars so the user can toggle them.
    /// Discovery failures never fail the linking attempt.
    async fn discover_calendars(
        &self,
        connection: &Connection,
        adapter: &dyn ProviderAdapter,
        access_token: &str,
    ) {
        match adapter.list_calendars(access_token).await {
            Ok(found) => {
                for (provider_calendar_id, name) in found {
                    if let Err(err) = self
                        .calendars
                        .upsert_discovered(connection.id, &provider_calendar_id, &name)
                        .await
                    {
                        warn!(error = %err, provider_calendar_id, "failed to record calendar");
                    }
                }
            }
            Err(err) => warn!(error = %err, "calendar discovery failed"),
        }
    }

    /// Remote revocation is best-effort: disconnect reports success
    /// locally even when the provider call fails.
    async fn try_remote_revocation(&self, connection: &Connection) {
        let Some(creds) = self.config.credentials(connection.provider) else {
            return;
        };
        let Ok(adapter) = self.adapter_for(connection.provider) else {
            return;
        };
        let Some(access_enc) = connection.access_token_enc.as_ref() else {
            return;
        };

        let token = match self.vault.decrypt(access_enc) {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "could not decrypt token for remote revocation");
                return;
            }
        };

        if let Err(err) = adapter.revoke_token(creds, &token).await {
            warn!(error = %err, "remote token revocation failed");
        }
    }

    fn require_privileged(&self, caller: &Caller) -> Result<()> {
        if caller.role.can_manage_integrations() {
            Ok(())
        } else {
            Err(OrbitError::Forbidden(
                "linking third-party accounts requires an admin or manager role".to_string(),
            ))
        }
    }

    fn required_credentials(&self, provider: Provider) -> Result<&ProviderCredentials> {
        let creds = self.config.credentials(provider).ok_or_else(|| {
            OrbitError::Config(format!("no client credentials registered for {provider}"))
        })?;
        if creds.client_id.trim().is_empty() || creds.client_secret.trim().is_empty() {
            return Err(OrbitError::Config(format!(
                "client id/secret for {provider} are not configured"
            )));
        }
        Ok(creds)
    }

    fn adapter_for(&self, provider: Provider) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters
            .adapter(provider)
            .ok_or_else(|| OrbitError::Config(format!("no adapter registered for {provider}")))
    }
}
