//! Session model - the per-request result of a successful bridge.

use serde::Serialize;
use utoipa::ToSchema;

use super::{DirectoryUser, SecondaryAuthAccountId};
use crate::config::RouteConfig;

/// Where the presentation layer should send the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RedirectTarget {
    Board { board_id: String },
    Admin,
    Dashboard,
}

impl RedirectTarget {
    pub fn path(&self, routes: &RouteConfig) -> String {
        match self {
            RedirectTarget::Board { board_id } => format!("{}/{}", routes.board_prefix, board_id),
            RedirectTarget::Admin => routes.admin.clone(),
            RedirectTarget::Dashboard => routes.dashboard.clone(),
        }
    }
}

/// Derived, never persisted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Session {
    pub directory_user: DirectoryUser,
    pub secondary_auth_account_id: SecondaryAuthAccountId,
    #[schema(value_type = Object)]
    pub redirect_target: RedirectTarget,
    /// `redirect_target` rendered against the configured routes.
    pub redirect_path: String,
    /// False when the linkage write failed; policy-checked queries may be
    /// rejected until a later bootstrap links the account.
    pub linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}
