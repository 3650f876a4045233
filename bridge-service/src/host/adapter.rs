use std::sync::Arc;
use std::time::Duration;

use super::context::BoardContextCache;
use super::sdk::{HostSdk, HostSdkError};
use super::token::email_from_identity_token;
use crate::config::HostSdkConfig;
use crate::models::{normalize_email, HostIdentity};
use crate::services::BridgeError;

/// Turns whatever the host SDK exposes into a [`HostIdentity`].
pub struct HostIdentityAdapter {
    sdk: Arc<dyn HostSdk>,
    poll_interval: Duration,
    timeout: Duration,
    board_context: BoardContextCache,
}

impl HostIdentityAdapter {
    pub fn new(sdk: Arc<dyn HostSdk>, config: &HostSdkConfig) -> Self {
        Self {
            board_context: BoardContextCache::new(sdk.clone()),
            sdk,
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
        }
    }

    /// Resolve the acting user.
    ///
    /// Fails with `HostUnavailable` if the SDK is not detected within the
    /// configured timeout. A missing email is not an error.
    pub async fn resolve(&self) -> Result<HostIdentity, BridgeError> {
        self.wait_for_sdk().await?;

        let user = self.sdk.current_user().await.map_err(|e| match e {
            HostSdkError::Unavailable => BridgeError::HostUnavailable,
            other => BridgeError::Unexpected(other.to_string()),
        })?;

        let host_user_id = user.id.trim().to_string();
        if host_user_id.is_empty() {
            tracing::warn!("Host current-user query returned no user id");
            return Err(BridgeError::HostUnavailable);
        }

        let email = match normalize_email(user.email.as_deref()) {
            Some(email) => Some(email),
            None => self.email_from_token().await,
        };

        tracing::debug!(
            host_user_id = %host_user_id,
            has_email = email.is_some(),
            "Resolved host identity"
        );

        Ok(HostIdentity::new(host_user_id, user.name, email))
    }

    /// Board the integration is currently rendered in, cached per adapter.
    pub async fn board_id(&self) -> Option<String> {
        match self.board_context.board_id().await {
            Ok(board_id) => board_id,
            Err(e) => {
                tracing::debug!(error = %e, "Host board context unavailable");
                None
            }
        }
    }

    async fn wait_for_sdk(&self) -> Result<(), BridgeError> {
        let poll = async {
            loop {
                if self.sdk.is_available().await {
                    return;
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(self.timeout, poll).await.map_err(|_| {
            tracing::warn!(
                timeout_ms = self.timeout.as_millis() as u64,
                "Host SDK not detected before timeout"
            );
            BridgeError::HostUnavailable
        })
    }

    async fn email_from_token(&self) -> Option<String> {
        let token = match self.sdk.identity_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!(error = %e, "No identity token to recover email from");
                return None;
            }
        };

        match email_from_identity_token(&token) {
            Ok(email) => email,
            Err(e) => {
                tracing::warn!(error = %e, "Could not decode host identity token");
                None
            }
        }
    }
}
