//! Secondary auth bridge.
//!
//! Establishes a session in the secondary subsystem for a directory user by
//! signing in with a derived secret, provisioning the account when it does
//! not exist yet, and linking the account back to the directory row.

use secrecy::Secret;
use std::sync::Arc;
use uuid::Uuid;

use super::credentials::CredentialDeriver;
use super::directory::{DirectoryStore, LinkOutcome};
use super::error::BridgeError;
use super::secondary_auth::{AuthProviderError, AuthSession, SecondaryAuth};
use crate::models::SecondaryAuthAccountId;

/// How the session was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstablishedVia {
    SignIn,
    Provision,
    /// Provisioned without a session, then signed in.
    SignInAfterProvision,
}

/// Why a sign-in attempt is a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Provisioning succeeded but returned no session.
    AfterProvision,
    /// Provisioning reported the email as taken; a concurrent bootstrap may
    /// have created the account with the same secret.
    AfterAlreadyRegistered,
}

#[derive(Debug)]
enum BridgeState {
    Start,
    AttemptSignIn { retry: Option<Retry> },
    VerifyIdentityMatch { session: AuthSession, via: EstablishedVia },
    AttemptProvision,
    LinkAccount {
        account_id: SecondaryAuthAccountId,
        access_token: Option<String>,
        via: EstablishedVia,
    },
    Established(BridgeOutcome),
    Failed(BridgeError),
}

impl BridgeState {
    fn name(&self) -> &'static str {
        match self {
            BridgeState::Start => "start",
            BridgeState::AttemptSignIn { retry: None } => "attempt_sign_in",
            BridgeState::AttemptSignIn { retry: Some(_) } => "retry_sign_in",
            BridgeState::VerifyIdentityMatch { .. } => "verify_identity_match",
            BridgeState::AttemptProvision => "attempt_provision",
            BridgeState::LinkAccount { .. } => "link_account",
            BridgeState::Established(_) => "established",
            BridgeState::Failed(_) => "failed",
        }
    }
}

/// Terminal success of `establish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOutcome {
    pub account_id: SecondaryAuthAccountId,
    pub access_token: Option<String>,
    pub via: EstablishedVia,
    /// False when the linkage write failed.
    pub linked: bool,
}

#[derive(Clone)]
pub struct AuthBridge {
    deriver: CredentialDeriver,
    auth: Arc<dyn SecondaryAuth>,
    store: Arc<dyn DirectoryStore>,
}

impl AuthBridge {
    pub fn new(
        deriver: CredentialDeriver,
        auth: Arc<dyn SecondaryAuth>,
        store: Arc<dyn DirectoryStore>,
    ) -> Self {
        Self {
            deriver,
            auth,
            store,
        }
    }

    /// Drive the bridge state machine to a terminal state.
    pub async fn establish(
        &self,
        directory_user_id: Uuid,
        email: &str,
        host_user_id: &str,
    ) -> Result<BridgeOutcome, BridgeError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(BridgeError::InvalidInput(
                "directory user has no email".to_string(),
            ));
        }

        let mut secret: Option<Secret<String>> = None;
        let mut state = BridgeState::Start;

        loop {
            tracing::debug!(
                state = state.name(),
                directory_user_id = %directory_user_id,
                "Auth bridge transition"
            );

            state = match state {
                BridgeState::Start => {
                    secret = Some(self.deriver.derive(host_user_id)?);
                    BridgeState::AttemptSignIn { retry: None }
                }

                BridgeState::AttemptSignIn { retry } => {
                    let password = derived(&secret)?;
                    match self.auth.sign_in_with_password(&email, password).await {
                        Ok(session) => BridgeState::VerifyIdentityMatch {
                            session,
                            via: match retry {
                                Some(Retry::AfterProvision) => EstablishedVia::SignInAfterProvision,
                                _ => EstablishedVia::SignIn,
                            },
                        },
                        Err(e) => Self::after_sign_in_failure(&email, retry, e),
                    }
                }

                BridgeState::VerifyIdentityMatch { session, via } => {
                    self.verify_identity_match(directory_user_id, session.account_id)
                        .await;
                    BridgeState::LinkAccount {
                        account_id: session.account_id,
                        access_token: Some(session.access_token),
                        via,
                    }
                }

                BridgeState::AttemptProvision => {
                    let password = derived(&secret)?;
                    let metadata = serde_json::json!({
                        "directory_user_id": directory_user_id,
                        "host_user_id": host_user_id,
                    });

                    match self.auth.sign_up(&email, password, metadata).await {
                        Ok(outcome) => match outcome.session {
                            Some(session) => {
                                tracing::info!(
                                    directory_user_id = %directory_user_id,
                                    account_id = %outcome.account_id,
                                    "Provisioned secondary auth account"
                                );
                                BridgeState::LinkAccount {
                                    account_id: session.account_id,
                                    access_token: Some(session.access_token),
                                    via: EstablishedVia::Provision,
                                }
                            }
                            None => BridgeState::AttemptSignIn {
                                retry: Some(Retry::AfterProvision),
                            },
                        },
                        Err(AuthProviderError::AlreadyRegistered) => {
                            tracing::info!(
                                directory_user_id = %directory_user_id,
                                "Email already registered, retrying sign-in once"
                            );
                            BridgeState::AttemptSignIn {
                                retry: Some(Retry::AfterAlreadyRegistered),
                            }
                        }
                        Err(e) => BridgeState::Failed(BridgeError::Unexpected(format!(
                            "provisioning failed: {}",
                            e
                        ))),
                    }
                }

                BridgeState::LinkAccount {
                    account_id,
                    access_token,
                    via,
                } => {
                    let linked = self.link(directory_user_id, account_id).await;
                    BridgeState::Established(BridgeOutcome {
                        account_id,
                        access_token,
                        via,
                        linked,
                    })
                }

                BridgeState::Established(outcome) => {
                    tracing::info!(
                        directory_user_id = %directory_user_id,
                        account_id = %outcome.account_id,
                        via = ?outcome.via,
                        linked = outcome.linked,
                        "Secondary auth session established"
                    );
                    return Ok(outcome);
                }

                BridgeState::Failed(err) => {
                    tracing::warn!(
                        directory_user_id = %directory_user_id,
                        code = err.code(),
                        error = %err,
                        "Auth bridge failed"
                    );
                    return Err(err);
                }
            };
        }
    }

    /// Sign out of the secondary subsystem.
    ///
    /// Tokens the subsystem does not recognise are rejected before sign-out.
    pub async fn end_session(&self, access_token: &str) -> Result<(), BridgeError> {
        if access_token.trim().is_empty() {
            return Err(BridgeError::InvalidInput("access token is required".to_string()));
        }

        let account = self
            .auth
            .current_user(access_token)
            .await
            .map_err(Self::session_error)?;

        self.auth
            .sign_out(access_token)
            .await
            .map_err(Self::session_error)?;

        tracing::info!(account_id = %account.account_id.0, "Secondary auth session ended");
        Ok(())
    }

    fn session_error(err: AuthProviderError) -> BridgeError {
        match err {
            AuthProviderError::InvalidCredentials => {
                BridgeError::AuthSignInFailed("session is not valid".to_string())
            }
            other => BridgeError::Unexpected(other.to_string()),
        }
    }

    fn after_sign_in_failure(
        email: &str,
        retry: Option<Retry>,
        err: AuthProviderError,
    ) -> BridgeState {
        let failed = BridgeState::Failed;

        match (retry, err) {
            (None, AuthProviderError::InvalidCredentials) => BridgeState::AttemptProvision,
            (Some(Retry::AfterAlreadyRegistered), AuthProviderError::InvalidCredentials) => {
                failed(BridgeError::EmailConflict {
                    email: email.to_string(),
                })
            }
            (Some(Retry::AfterProvision), e) => failed(BridgeError::AuthSignInFailed(format!(
                "account created but sign-in failed: {}",
                e
            ))),
            (_, AuthProviderError::AlreadyRegistered) => failed(BridgeError::Unexpected(
                "sign-in reported an already registered account".to_string(),
            )),
            (_, e) => failed(BridgeError::AuthSignInFailed(e.to_string())),
        }
    }

    async fn verify_identity_match(
        &self,
        directory_user_id: Uuid,
        account_id: SecondaryAuthAccountId,
    ) {
        match self.store.find_link_by_account(account_id).await {
            Ok(Some(link)) if link.directory_user_id != directory_user_id => {
                tracing::warn!(
                    directory_user_id = %directory_user_id,
                    linked_directory_user_id = %link.directory_user_id,
                    account_id = %account_id,
                    "Secondary auth account is linked to a different directory user"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, account_id = %account_id, "Could not verify account linkage");
            }
        }
    }

    async fn link(&self, directory_user_id: Uuid, account_id: SecondaryAuthAccountId) -> bool {
        match self.store.upsert_link(directory_user_id, account_id).await {
            Ok(LinkOutcome::Created) => {
                tracing::info!(
                    directory_user_id = %directory_user_id,
                    account_id = %account_id,
                    "Linked secondary auth account"
                );
                true
            }
            Ok(LinkOutcome::AlreadyLinked) => true,
            Err(e) => {
                let err = BridgeError::LinkFailed(e.to_string());
                tracing::error!(
                    directory_user_id = %directory_user_id,
                    account_id = %account_id,
                    code = err.code(),
                    error = %err,
                    "Linkage write failed; session kept"
                );
                false
            }
        }
    }
}

fn derived(secret: &Option<Secret<String>>) -> Result<&Secret<String>, BridgeError> {
    secret
        .as_ref()
        .ok_or_else(|| BridgeError::Unexpected("credential not derived".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::directory::MockDirectoryStore;
    use crate::services::secondary_auth::MockSecondaryAuth;
    use std::sync::atomic::Ordering;

    struct Harness {
        bridge: AuthBridge,
        auth: Arc<MockSecondaryAuth>,
        store: Arc<MockDirectoryStore>,
    }

    fn harness_with(auth: MockSecondaryAuth) -> Harness {
        let auth = Arc::new(auth);
        let store = Arc::new(MockDirectoryStore::new());
        let deriver = CredentialDeriver::new(Secret::new("bridge-test-secret".to_string()));
        Harness {
            bridge: AuthBridge::new(deriver, auth.clone(), store.clone()),
            auth,
            store,
        }
    }

    fn harness() -> Harness {
        harness_with(MockSecondaryAuth::new())
    }

    #[tokio::test]
    async fn first_call_provisions_and_links() {
        let h = harness();
        let dir_id = Uuid::new_v4();

        let outcome = h.bridge.establish(dir_id, "d@x.com", "h-1").await.unwrap();

        assert_eq!(outcome.via, EstablishedVia::Provision);
        assert!(outcome.linked);
        assert!(outcome.access_token.is_some());
        assert_eq!(h.auth.provision_count(), 1);
        assert_eq!(h.store.link(dir_id).unwrap().account_id(), outcome.account_id);

        let metadata = h.auth.metadata("d@x.com").unwrap();
        assert_eq!(metadata["host_user_id"], "h-1");
        assert_eq!(metadata["directory_user_id"], dir_id.to_string());
    }

    #[tokio::test]
    async fn second_call_signs_in_without_writes() {
        let h = harness();
        let dir_id = Uuid::new_v4();

        let first = h.bridge.establish(dir_id, "d@x.com", "h-1").await.unwrap();
        let second = h.bridge.establish(dir_id, "d@x.com", "h-1").await.unwrap();

        assert_eq!(second.via, EstablishedVia::SignIn);
        assert_eq!(first.account_id, second.account_id);
        assert_eq!(h.auth.provision_count(), 1);
        assert_eq!(h.store.link_writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn email_taken_under_other_secret_is_conflict() {
        let h = harness_with(MockSecondaryAuth::new().with_account("d@x.com", "someone-else"));

        let err = h
            .bridge
            .establish(Uuid::new_v4(), "d@x.com", "h-1")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BridgeError::EmailConflict {
                email: "d@x.com".to_string()
            }
        );
        assert_eq!(h.auth.provision_count(), 0);
        // Initial attempt plus the single retry.
        assert_eq!(h.auth.sign_in_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provision_without_session_signs_in_again() {
        let auth = MockSecondaryAuth::new();
        auth.withhold_sign_up_session.store(true, Ordering::SeqCst);
        let h = harness_with(auth);

        let outcome = h.bridge.establish(Uuid::new_v4(), "d@x.com", "h-1").await.unwrap();
        assert_eq!(outcome.via, EstablishedVia::SignInAfterProvision);
        assert!(outcome.linked);
    }

    #[tokio::test]
    async fn provision_then_failed_sign_in_is_terminal() {
        let auth = MockSecondaryAuth::new();
        auth.require_confirmation.store(true, Ordering::SeqCst);
        let h = harness_with(auth);

        let err = h
            .bridge
            .establish(Uuid::new_v4(), "d@x.com", "h-1")
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::AuthSignInFailed(ref m) if m.contains("created but sign-in failed")));
        assert_eq!(h.auth.sign_in_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn subsystem_outage_fails_sign_in() {
        let auth = MockSecondaryAuth::new();
        auth.unavailable.store(true, Ordering::SeqCst);
        let h = harness_with(auth);

        let err = h
            .bridge
            .establish(Uuid::new_v4(), "d@x.com", "h-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::AuthSignInFailed(_)));
        assert_eq!(h.auth.provision_count(), 0);
    }

    #[tokio::test]
    async fn link_failure_keeps_the_session() {
        let h = harness();
        h.store.fail_links.store(true, Ordering::SeqCst);

        let outcome = h.bridge.establish(Uuid::new_v4(), "d@x.com", "h-1").await.unwrap();
        assert!(!outcome.linked);
        assert!(outcome.access_token.is_some());
    }

    #[tokio::test]
    async fn account_linked_elsewhere_is_logged_not_fatal() {
        let h = harness();
        let first_owner = Uuid::new_v4();
        let outcome = h.bridge.establish(first_owner, "d@x.com", "h-1").await.unwrap();

        // Same email and host id reaching the bridge under another directory row.
        let other = h.bridge.establish(Uuid::new_v4(), "d@x.com", "h-1").await.unwrap();
        assert_eq!(other.account_id, outcome.account_id);
        assert!(!other.linked);
    }

    #[tokio::test]
    async fn blank_host_user_id_is_invalid_input() {
        let h = harness();
        let err = h.bridge.establish(Uuid::new_v4(), "d@x.com", "").await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput(_)));
        assert_eq!(h.auth.sign_in_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_first_calls_do_not_conflict() {
        let h = harness();
        let dir_id = Uuid::new_v4();

        let (a, b) = tokio::join!(
            h.bridge.establish(dir_id, "d@x.com", "h-1"),
            h.bridge.establish(dir_id, "d@x.com", "h-1"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        let mut vias = [a.via, b.via];
        vias.sort_by_key(|v| *v as u8);
        assert_eq!(vias, [EstablishedVia::SignIn, EstablishedVia::Provision]);
        assert_eq!(a.account_id, b.account_id);
        assert_eq!(h.auth.provision_count(), 1);
    }

    #[tokio::test]
    async fn end_session_signs_out() {
        let h = harness();
        let outcome = h.bridge.establish(Uuid::new_v4(), "d@x.com", "h-1").await.unwrap();
        let token = outcome.access_token.unwrap();

        h.bridge.end_session(&token).await.unwrap();
        assert_eq!(h.auth.active_sessions(), 0);
        // The same token cannot end a session twice.
        assert!(matches!(
            h.bridge.end_session(&token).await,
            Err(BridgeError::AuthSignInFailed(_))
        ));
        assert!(matches!(
            h.bridge.end_session(" ").await,
            Err(BridgeError::InvalidInput(_))
        ));
    }
}
