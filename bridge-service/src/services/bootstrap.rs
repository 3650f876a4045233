//! Session bootstrap pipeline: directory resolution, secondary auth bridge,
//! routing. Each stage may end the pipeline with a `BridgeError`.

use tracing::instrument;

use super::bridge::AuthBridge;
use super::directory::DirectoryResolver;
use super::error::BridgeError;
use super::routing::build_session;
use crate::config::RouteConfig;
use crate::models::{HostIdentity, Session};

#[derive(Clone)]
pub struct SessionBootstrapper {
    resolver: DirectoryResolver,
    bridge: AuthBridge,
    routes: RouteConfig,
}

impl SessionBootstrapper {
    pub fn new(resolver: DirectoryResolver, bridge: AuthBridge, routes: RouteConfig) -> Self {
        Self {
            resolver,
            bridge,
            routes,
        }
    }

    /// Turn a host identity into a directory user with a live secondary
    /// auth session and a redirect decision.
    #[instrument(skip(self, identity), fields(host_user_id = %identity.host_user_id))]
    pub async fn bootstrap_session(&self, identity: &HostIdentity) -> Result<Session, BridgeError> {
        if identity.host_user_id.trim().is_empty() {
            return Err(BridgeError::InvalidInput("host user id is required".to_string()));
        }

        let user = self.resolver.resolve(identity).await?;
        // The derived secret must stay fixed per directory row, so prefer the
        // bound host id over the one presented (main admin on a second host id).
        let credential_subject = user
            .host_user_id
            .clone()
            .unwrap_or_else(|| identity.host_user_id.clone());
        let outcome = self
            .bridge
            .establish(user.id, &user.email, &credential_subject)
            .await?;

        let mut session = build_session(user, outcome.account_id, &self.routes);
        session.linked = outcome.linked;
        session.access_token = outcome.access_token;

        tracing::info!(
            user_id = %session.directory_user.id,
            redirect = %session.redirect_path,
            "Session bootstrapped"
        );

        Ok(session)
    }

    pub async fn end_session(&self, access_token: &str) -> Result<(), BridgeError> {
        self.bridge.end_session(access_token).await
    }
}
