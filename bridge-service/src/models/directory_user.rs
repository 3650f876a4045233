//! Directory user model - the authoritative application account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Directory role codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Designer,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Designer => "designer",
            Role::Client => "client",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "designer" => Ok(Role::Designer),
            "client" => Ok(Role::Client),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Directory user entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DirectoryUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub primary_board_id: Option<String>,
    pub is_super_admin: bool,
    pub host_user_id: Option<String>,
}

impl DirectoryUser {
    /// Create a user record with the given role and no board assignment.
    pub fn new(email: String, name: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            name,
            role,
            primary_board_id: None,
            is_super_admin: false,
            host_user_id: None,
        }
    }

    /// Create the configured main administrator.
    pub fn new_super_admin(email: String, name: String, host_user_id: Option<String>) -> Self {
        Self {
            is_super_admin: true,
            host_user_id,
            ..Self::new(email, name, Role::Admin)
        }
    }

    pub fn with_board(mut self, board_id: impl Into<String>) -> Self {
        self.primary_board_id = Some(board_id.into());
        self
    }

    pub fn with_host_user_id(mut self, host_user_id: impl Into<String>) -> Self {
        self.host_user_id = Some(host_user_id.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.is_super_admin || self.role == Role::Admin
    }
}

/// Raw `directory_users` row.
#[derive(Debug, Clone, FromRow)]
pub struct DirectoryUserRow {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role_code: String,
    pub primary_board_id: Option<String>,
    pub is_super_admin: bool,
    pub host_user_id: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl TryFrom<DirectoryUserRow> for DirectoryUser {
    type Error = String;

    fn try_from(row: DirectoryUserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.user_id,
            email: row.email,
            name: row.display_name,
            role: row.role_code.parse()?,
            primary_board_id: row.primary_board_id,
            is_super_admin: row.is_super_admin,
            host_user_id: row.host_user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_admin_is_admin_without_board() {
        let user = DirectoryUser::new_super_admin(
            "Boss@Example.com".to_string(),
            "Boss".to_string(),
            Some("h-1".to_string()),
        );
        assert_eq!(user.role, Role::Admin);
        assert!(user.is_super_admin);
        assert_eq!(user.primary_board_id, None);
        assert_eq!(user.email, "boss@example.com");
    }

    #[test]
    fn unknown_role_code_is_rejected() {
        let row = DirectoryUserRow {
            user_id: Uuid::new_v4(),
            email: "x@example.com".to_string(),
            display_name: "X".to_string(),
            role_code: "owner".to_string(),
            primary_board_id: None,
            is_super_admin: false,
            host_user_id: None,
            created_utc: Utc::now(),
        };
        assert!(DirectoryUser::try_from(row).is_err());
    }
}
