//! Connection types
//!
//! A connection is the stored, encrypted link between one user and one
//! third-party provider account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::OrbitError;

/// Supported third-party providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    GoogleCalendar,
    OutlookCalendar,
    GoogleDrive,
    OneDrive,
    Dropbox,
    Nextcloud,
}

/// Broad capability class of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Calendar,
    FileStorage,
}

impl Provider {
    /// Stable string tag used in storage and destination prefixes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GoogleCalendar => "google_calendar",
            Self::OutlookCalendar => "outlook_calendar",
            Self::GoogleDrive => "google_drive",
            Self::OneDrive => "onedrive",
            Self::Dropbox => "dropbox",
            Self::Nextcloud => "nextcloud",
        }
    }

    #[must_use]
    pub const fn kind(self) -> ProviderKind {
        match self {
            Self::GoogleCalendar | Self::OutlookCalendar => ProviderKind::Calendar,
            Self::GoogleDrive | Self::OneDrive | Self::Dropbox | Self::Nextcloud => {
                ProviderKind::FileStorage
            }
        }
    }

    /// Whether linking goes through the OAuth2 authorization-code flow.
    /// Nextcloud links with a username + app password instead.
    #[must_use]
    pub const fn uses_oauth(self) -> bool {
        !matches!(self, Self::Nextcloud)
    }

    #[must_use]
    pub const fn all() -> [Self; 6] {
        [
            Self::GoogleCalendar,
            Self::OutlookCalendar,
            Self::GoogleDrive,
            Self::OneDrive,
            Self::Dropbox,
            Self::Nextcloud,
        ]
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = OrbitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_calendar" => Ok(Self::GoogleCalendar),
            "outlook_calendar" => Ok(Self::OutlookCalendar),
            "google_drive" => Ok(Self::GoogleDrive),
            "onedrive" => Ok(Self::OneDrive),
            "dropbox" => Ok(Self::Dropbox),
            "nextcloud" => Ok(Self::Nextcloud),
            other => Err(OrbitError::InvalidInput(format!("unknown provider: {other}"))),
        }
    }
}

/// Encrypted secret at rest.
///
/// The four components are produced together by one vault encryption call
/// and are only meaningful as a unit; replacing any one of them in
/// isolation makes the record undecryptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    pub salt: String,
}

/// Lifecycle status of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Error,
    Revoked,
}

/// Stored link between one user and one provider account
///
/// At most one active connection exists per (user, provider); the
/// repository upserts on that key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub org_id: String,
    pub user_id: String,
    pub provider: Provider,
    pub account_email: Option<String>,
    pub access_token_enc: Option<EncryptedSecret>,
    pub refresh_token_enc: Option<EncryptedSecret>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: ConnectionStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Fresh active connection for a newly completed link.
    #[must_use]
    pub fn new(org_id: String, user_id: String, provider: Provider) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            org_id,
            user_id,
            provider,
            account_email: None,
            access_token_enc: None,
            refresh_token_enc: None,
            expires_at: None,
            status: ConnectionStatus::Active,
            last_synced_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ConnectionStatus::Active
    }

    /// Revoke locally: token material is dropped, the row is kept for audit.
    pub fn revoke(&mut self) {
        self.status = ConnectionStatus::Revoked;
        self.access_token_enc = None;
        self.refresh_token_enc = None;
        self.expires_at = None;
        self.updated_at = Utc::now();
    }

    /// Degrade to error state after a failed refresh.
    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = ConnectionStatus::Error;
        self.last_error = Some(message.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn provider_tag_round_trips() {
        for provider in Provider::all() {
            let parsed = Provider::from_str(provider.as_str()).unwrap();
            assert_eq!(parsed, provider);
        }
    }

    #[test]
    fn unknown_provider_tag_is_rejected() {
        assert!(Provider::from_str("fax_machine").is_err());
    }

    #[test]
    fn provider_kinds() {
        assert_eq!(Provider::GoogleCalendar.kind(), ProviderKind::Calendar);
        assert_eq!(Provider::OutlookCalendar.kind(), ProviderKind::Calendar);
        assert_eq!(Provider::Dropbox.kind(), ProviderKind::FileStorage);
        assert!(!Provider::Nextcloud.uses_oauth());
        assert!(Provider::Dropbox.uses_oauth());
    }

    #[test]
    fn revoke_clears_token_material_but_keeps_identity() {
        let mut conn = Connection::new("org-1".into(), "user-1".into(), Provider::GoogleDrive);
        conn.access_token_enc = Some(EncryptedSecret {
            ciphertext: "c".into(),
            iv: "i".into(),
            auth_tag: "t".into(),
            salt: "s".into(),
        });
        conn.revoke();

        assert_eq!(conn.status, ConnectionStatus::Revoked);
        assert!(conn.access_token_enc.is_none());
        assert!(conn.refresh_token_enc.is_none());
        assert_eq!(conn.user_id, "user-1");
    }
}
