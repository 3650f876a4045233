//! Secondary auth subsystem boundary.
//!
//! The subsystem owns its own accounts and issues the bearer tokens that the
//! row-level data policies are checked against. `GoTrueClient` talks to a
//! GoTrue-compatible HTTP API; `MockSecondaryAuth` is an in-memory stand-in.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::observability::TracedClientExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::SecondaryAuthAccountId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthProviderError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("User already registered")]
    AlreadyRegistered,

    #[error("Secondary auth error: {0}")]
    Other(String),
}

/// An active session in the secondary subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub account_id: SecondaryAuthAccountId,
    pub access_token: String,
}

/// Result of a successful sign-up. `session` is absent when the subsystem
/// requires a separate sign-in (e.g. email confirmation is enabled).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    pub account_id: SecondaryAuthAccountId,
    pub session: Option<AuthSession>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthAccount {
    pub account_id: SecondaryAuthAccountId,
    pub email: Option<String>,
}

#[async_trait]
pub trait SecondaryAuth: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &Secret<String>,
    ) -> Result<AuthSession, AuthProviderError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &Secret<String>,
        metadata: serde_json::Value,
    ) -> Result<SignUpOutcome, AuthProviderError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthProviderError>;

    async fn current_user(&self, access_token: &str) -> Result<AuthAccount, AuthProviderError>;
}

// ==================== GoTrue HTTP client ====================

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoTrueSession {
    access_token: String,
    user: GoTrueUser,
}

/// Sign-up answers with a session when auto-confirm is on, otherwise with
/// the bare user object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GoTrueSignUp {
    Session(GoTrueSession),
    User(GoTrueUser),
}

#[derive(Debug, Default, Deserialize)]
struct GoTrueErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl GoTrueErrorBody {
    fn text(&self) -> String {
        self.msg
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_default()
    }
}

/// Map a GoTrue error response onto the provider error kinds.
fn classify_error(status: StatusCode, body: &str) -> AuthProviderError {
    let parsed: GoTrueErrorBody = serde_json::from_str(body).unwrap_or_default();
    let text = parsed.text();
    let lowered = text.to_lowercase();

    match parsed.error_code.as_deref() {
        Some("invalid_credentials") => return AuthProviderError::InvalidCredentials,
        Some("user_already_exists") | Some("email_exists") => {
            return AuthProviderError::AlreadyRegistered
        }
        _ => {}
    }

    if parsed.error.as_deref() == Some("invalid_grant")
        || lowered.contains("invalid login credentials")
    {
        AuthProviderError::InvalidCredentials
    } else if lowered.contains("already registered") || lowered.contains("already exists") {
        AuthProviderError::AlreadyRegistered
    } else if text.is_empty() {
        AuthProviderError::Other(format!("HTTP {}", status))
    } else {
        AuthProviderError::Other(format!("HTTP {}: {}", status, text))
    }
}

/// HTTP client for a GoTrue-compatible auth API.
#[derive(Clone)]
pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: Secret<String>,
}

impl GoTrueClient {
    pub fn new(
        base_url: &str,
        anon_key: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        tracing::info!(base_url = %base_url, "Secondary auth client configured");

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AuthProviderError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthProviderError::Other(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| AuthProviderError::Other(format!("Unexpected response body: {}", e)))
    }
}

fn transport_error(e: reqwest::Error) -> AuthProviderError {
    tracing::error!(error = %e, "Secondary auth request failed");
    AuthProviderError::Other(format!("Request failed: {}", e))
}

#[async_trait]
impl SecondaryAuth for GoTrueClient {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &Secret<String>,
    ) -> Result<AuthSession, AuthProviderError> {
        let response = self
            .http
            .traced_post(&self.url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", self.anon_key.expose_secret())
            .json(&serde_json::json!({
                "email": email,
                "password": password.expose_secret(),
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let session: GoTrueSession = Self::read_json(response).await?;
        Ok(AuthSession {
            account_id: SecondaryAuthAccountId(session.user.id),
            access_token: session.access_token,
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &Secret<String>,
        metadata: serde_json::Value,
    ) -> Result<SignUpOutcome, AuthProviderError> {
        let response = self
            .http
            .traced_post(&self.url("signup"))
            .header("apikey", self.anon_key.expose_secret())
            .json(&serde_json::json!({
                "email": email,
                "password": password.expose_secret(),
                "data": metadata,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        match Self::read_json::<GoTrueSignUp>(response).await? {
            GoTrueSignUp::Session(session) => {
                let account_id = SecondaryAuthAccountId(session.user.id);
                Ok(SignUpOutcome {
                    account_id,
                    session: Some(AuthSession {
                        account_id,
                        access_token: session.access_token,
                    }),
                })
            }
            GoTrueSignUp::User(user) => Ok(SignUpOutcome {
                account_id: SecondaryAuthAccountId(user.id),
                session: None,
            }),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthProviderError> {
        let response = self
            .http
            .traced_post(&self.url("logout"))
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status, &body))
    }

    async fn current_user(&self, access_token: &str) -> Result<AuthAccount, AuthProviderError> {
        let response = self
            .http
            .traced_get(&self.url("user"))
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        let user: GoTrueUser = Self::read_json(response).await?;
        Ok(AuthAccount {
            account_id: SecondaryAuthAccountId(user.id),
            email: user.email,
        })
    }
}

// ==================== In-memory implementation ====================

struct MockAccount {
    id: SecondaryAuthAccountId,
    password: String,
    metadata: serde_json::Value,
}

#[derive(Default)]
struct MockAuthState {
    accounts: HashMap<String, MockAccount>,
    sessions: HashMap<String, (SecondaryAuthAccountId, String)>,
    unconfirmed: HashSet<String>,
}

/// In-memory secondary auth subsystem.
///
/// `sign_in_with_password` decides its result before yielding, so two
/// concurrent first-time callers both observe "no account" and race into
/// provisioning.
pub struct MockSecondaryAuth {
    state: Mutex<MockAuthState>,
    pub sign_in_calls: AtomicUsize,
    pub provisions: AtomicUsize,
    /// Sign-up returns no session.
    pub withhold_sign_up_session: AtomicBool,
    /// New accounts cannot sign in.
    pub require_confirmation: AtomicBool,
    /// Every call fails with `Other`.
    pub unavailable: AtomicBool,
}

impl Default for MockSecondaryAuth {
    fn default() -> Self {
        Self {
            state: Mutex::new(MockAuthState::default()),
            sign_in_calls: AtomicUsize::new(0),
            provisions: AtomicUsize::new(0),
            withhold_sign_up_session: AtomicBool::new(false),
            require_confirmation: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
        }
    }
}

impl MockSecondaryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account that was created outside the bridge.
    pub fn with_account(self, email: &str, password: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.accounts.insert(
                email.to_lowercase(),
                MockAccount {
                    id: SecondaryAuthAccountId(Uuid::new_v4()),
                    password: password.to_string(),
                    metadata: serde_json::Value::Null,
                },
            );
        }
        self
    }

    pub fn account_id(&self, email: &str) -> Option<SecondaryAuthAccountId> {
        let state = self.state.lock().ok()?;
        state.accounts.get(&email.to_lowercase()).map(|a| a.id)
    }

    pub fn metadata(&self, email: &str) -> Option<serde_json::Value> {
        let state = self.state.lock().ok()?;
        state
            .accounts
            .get(&email.to_lowercase())
            .map(|a| a.metadata.clone())
    }

    pub fn provision_count(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    pub fn active_sessions(&self) -> usize {
        self.state.lock().map(|s| s.sessions.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockAuthState>, AuthProviderError> {
        self.state
            .lock()
            .map_err(|e| AuthProviderError::Other(format!("Mock auth mutex poisoned: {}", e)))
    }

    fn check_available(&self) -> Result<(), AuthProviderError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(AuthProviderError::Other("service unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn open_session(state: &mut MockAuthState, id: SecondaryAuthAccountId, email: &str) -> AuthSession {
        let token = format!("mock-token-{}", Uuid::new_v4());
        state.sessions.insert(token.clone(), (id, email.to_string()));
        AuthSession {
            account_id: id,
            access_token: token,
        }
    }
}

#[async_trait]
impl SecondaryAuth for MockSecondaryAuth {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &Secret<String>,
    ) -> Result<AuthSession, AuthProviderError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let key = email.to_lowercase();
        let result = {
            let mut state = self.lock()?;
            let matched = state
                .accounts
                .get(&key)
                .filter(|a| a.password == *password.expose_secret())
                .map(|a| a.id);
            match matched {
                Some(_) if state.unconfirmed.contains(&key) => {
                    Err(AuthProviderError::Other("Email not confirmed".to_string()))
                }
                Some(id) => Ok(Self::open_session(&mut state, id, &key)),
                None => Err(AuthProviderError::InvalidCredentials),
            }
        };

        tokio::task::yield_now().await;
        result
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &Secret<String>,
        metadata: serde_json::Value,
    ) -> Result<SignUpOutcome, AuthProviderError> {
        self.check_available()?;

        let key = email.to_lowercase();
        let mut state = self.lock()?;
        if state.accounts.contains_key(&key) {
            return Err(AuthProviderError::AlreadyRegistered);
        }

        let id = SecondaryAuthAccountId(Uuid::new_v4());
        state.accounts.insert(
            key.clone(),
            MockAccount {
                id,
                password: password.expose_secret().clone(),
                metadata,
            },
        );
        self.provisions.fetch_add(1, Ordering::SeqCst);

        if self.require_confirmation.load(Ordering::SeqCst) {
            state.unconfirmed.insert(key.clone());
        }

        let session = if self.withhold_sign_up_session.load(Ordering::SeqCst)
            || self.require_confirmation.load(Ordering::SeqCst)
        {
            None
        } else {
            Some(Self::open_session(&mut state, id, &key))
        };

        Ok(SignUpOutcome {
            account_id: id,
            session,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthProviderError> {
        self.check_available()?;
        self.lock()?.sessions.remove(access_token);
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<AuthAccount, AuthProviderError> {
        self.check_available()?;
        let state = self.lock()?;
        state
            .sessions
            .get(access_token)
            .map(|(id, email)| AuthAccount {
                account_id: *id,
                email: Some(email.clone()),
            })
            .ok_or(AuthProviderError::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> Secret<String> {
        Secret::new(s.to_string())
    }

    #[test]
    fn classifies_current_error_codes() {
        let body = r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#;
        assert_eq!(
            classify_error(StatusCode::BAD_REQUEST, body),
            AuthProviderError::InvalidCredentials
        );

        let body = r#"{"code":422,"error_code":"user_already_exists","msg":"User already registered"}"#;
        assert_eq!(
            classify_error(StatusCode::UNPROCESSABLE_ENTITY, body),
            AuthProviderError::AlreadyRegistered
        );
    }

    #[test]
    fn classifies_legacy_error_bodies() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert_eq!(
            classify_error(StatusCode::BAD_REQUEST, body),
            AuthProviderError::InvalidCredentials
        );

        let body = r#"{"msg":"User already registered"}"#;
        assert_eq!(
            classify_error(StatusCode::BAD_REQUEST, body),
            AuthProviderError::AlreadyRegistered
        );
    }

    #[test]
    fn unknown_errors_keep_status_and_message() {
        let err = classify_error(StatusCode::SERVICE_UNAVAILABLE, r#"{"message":"down"}"#);
        assert_eq!(err, AuthProviderError::Other("HTTP 503 Service Unavailable: down".to_string()));

        let err = classify_error(StatusCode::BAD_GATEWAY, "<html>");
        assert_eq!(err, AuthProviderError::Other("HTTP 502 Bad Gateway".to_string()));
    }

    #[test]
    fn sign_up_body_parses_with_or_without_session() {
        let with_session = r#"{"access_token":"t","token_type":"bearer","user":{"id":"7f1c6a8e-2d4b-4b7e-9a51-1f1e7c5d2a10","email":"a@b.com"}}"#;
        assert!(matches!(
            serde_json::from_str::<GoTrueSignUp>(with_session).unwrap(),
            GoTrueSignUp::Session(_)
        ));

        let bare_user = r#"{"id":"7f1c6a8e-2d4b-4b7e-9a51-1f1e7c5d2a10","email":"a@b.com","aud":"authenticated"}"#;
        assert!(matches!(
            serde_json::from_str::<GoTrueSignUp>(bare_user).unwrap(),
            GoTrueSignUp::User(_)
        ));
    }

    #[tokio::test]
    async fn mock_sign_in_requires_matching_secret() {
        let auth = MockSecondaryAuth::new().with_account("a@b.com", "right");

        assert!(auth.sign_in_with_password("A@b.com", &secret("right")).await.is_ok());
        assert_eq!(
            auth.sign_in_with_password("a@b.com", &secret("wrong")).await,
            Err(AuthProviderError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn mock_sign_up_rejects_existing_email() {
        let auth = MockSecondaryAuth::new();
        let first = auth
            .sign_up("a@b.com", &secret("s"), serde_json::json!({}))
            .await
            .unwrap();
        assert!(first.session.is_some());

        assert_eq!(
            auth.sign_up("a@b.com", &secret("s"), serde_json::json!({})).await,
            Err(AuthProviderError::AlreadyRegistered)
        );
        assert_eq!(auth.provision_count(), 1);
    }

    #[tokio::test]
    async fn mock_sign_out_ends_session() {
        let auth = MockSecondaryAuth::new().with_account("a@b.com", "s");
        let session = auth.sign_in_with_password("a@b.com", &secret("s")).await.unwrap();

        let account = auth.current_user(&session.access_token).await.unwrap();
        assert_eq!(account.account_id, session.account_id);

        auth.sign_out(&session.access_token).await.unwrap();
        assert!(auth.current_user(&session.access_token).await.is_err());
    }
}
