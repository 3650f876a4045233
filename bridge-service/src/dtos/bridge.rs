use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::host::HostUser;
use crate::models::Session;

/// The host's current-user answer as captured by the embedded client.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct HostUserPayload {
    #[validate(length(min = 1, max = 256, message = "Host user id is required"))]
    #[schema(example = "3458764513820540928")]
    pub id: String,

    #[validate(length(max = 256))]
    #[schema(example = "Riley Chen")]
    #[serde(default)]
    pub name: String,

    #[schema(example = "riley@example.com")]
    #[serde(default)]
    pub email: Option<String>,
}

impl From<HostUserPayload> for HostUser {
    fn from(payload: HostUserPayload) -> Self {
        Self {
            id: payload.id,
            name: payload.name,
            email: payload.email,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BootstrapRequest {
    #[validate(nested)]
    pub user: HostUserPayload,

    /// Signed identity token from the host, used to recover a missing email.
    #[validate(length(max = 8192))]
    #[serde(default)]
    pub identity_token: Option<String>,

    /// Board the integration is rendered in, if any.
    #[schema(example = "uXjVKk3b2Zo=")]
    #[serde(default)]
    pub board_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BootstrapResponse {
    pub session: Session,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_board_id: Option<String>,
}
