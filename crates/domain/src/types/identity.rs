//! Caller identity supplied by the surrounding identity/session layer

use serde::{Deserialize, Serialize};

/// Role of the authenticated caller within the organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Member,
}

impl Role {
    /// Fixed allow-list for issuing authorization URLs and linking accounts.
    #[must_use]
    pub const fn can_manage_integrations(self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }
}

/// Authenticated caller context passed into every exposed operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    pub org_id: String,
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    #[must_use]
    pub fn new(org_id: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self { org_id: org_id.into(), user_id: user_id.into(), role }
    }
}
