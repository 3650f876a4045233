//! Linkage between a directory user and a secondary auth account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifier of an account in the secondary auth subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct SecondaryAuthAccountId(pub Uuid);

impl std::fmt::Display for SecondaryAuthAccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for SecondaryAuthAccountId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Immutable binding written once per directory user.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LinkageRecord {
    pub directory_user_id: Uuid,
    pub auth_account_id: Uuid,
    pub linked_utc: DateTime<Utc>,
}

impl LinkageRecord {
    pub fn new(directory_user_id: Uuid, account_id: SecondaryAuthAccountId) -> Self {
        Self {
            directory_user_id,
            auth_account_id: account_id.0,
            linked_utc: Utc::now(),
        }
    }

    pub fn account_id(&self) -> SecondaryAuthAccountId {
        SecondaryAuthAccountId(self.auth_account_id)
    }
}
