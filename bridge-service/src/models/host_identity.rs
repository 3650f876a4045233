//! Host identity - the ephemeral identity asserted by the embedding host.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Best-effort identity extracted from the host SDK.
///
/// Rebuilt on every session bootstrap and never persisted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HostIdentity {
    /// Opaque host user id. Always present once the adapter has succeeded.
    pub host_user_id: String,
    pub display_name: String,
    pub email: Option<String>,
}

impl HostIdentity {
    pub fn new(
        host_user_id: impl Into<String>,
        display_name: impl Into<String>,
        email: Option<String>,
    ) -> Self {
        Self {
            host_user_id: host_user_id.into(),
            display_name: display_name.into(),
            email: normalize_email(email.as_deref()),
        }
    }

    /// Lowercased email, if the host supplied a non-blank one.
    pub fn normalized_email(&self) -> Option<String> {
        normalize_email(self.email.as_deref())
    }
}

/// Trim and lowercase an email; blank values become `None`.
pub fn normalize_email(email: Option<&str>) -> Option<String> {
    email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_email_is_dropped() {
        let identity = HostIdentity::new("u-1", "Ann", Some("   ".to_string()));
        assert_eq!(identity.email, None);
    }

    #[test]
    fn email_is_normalized() {
        let identity = HostIdentity::new("u-1", "Ann", Some(" Ann@Example.COM ".to_string()));
        assert_eq!(identity.normalized_email().as_deref(), Some("ann@example.com"));
    }
}
