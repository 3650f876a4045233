use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostSdkError {
    #[error("Host SDK is not available")]
    Unavailable,

    #[error("Host SDK does not support {0}")]
    Unsupported(&'static str),

    #[error("Host SDK call failed: {0}")]
    Call(String),
}

/// The acting user as reported by the host's "current user" query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HostUser {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

/// Surface the integration is rendered in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostContext {
    pub board_id: Option<String>,
}

/// Capabilities consumed from the embedding host.
///
/// Only the *current user* is exposed. The host also knows who installed the
/// integration, but authorization must follow the acting user.
#[async_trait]
pub trait HostSdk: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn current_user(&self) -> Result<HostUser, HostSdkError>;
    async fn identity_token(&self) -> Result<String, HostSdkError>;
    async fn context(&self) -> Result<HostContext, HostSdkError>;
}

/// Host SDK whose answers were captured by the embedded client and posted to
/// the service in the bootstrap request.
#[derive(Debug, Clone)]
pub struct PayloadHostSdk {
    user: HostUser,
    identity_token: Option<String>,
    context: HostContext,
}

impl PayloadHostSdk {
    pub fn new(user: HostUser, identity_token: Option<String>, board_id: Option<String>) -> Self {
        Self {
            user,
            identity_token,
            context: HostContext { board_id },
        }
    }
}

#[async_trait]
impl HostSdk for PayloadHostSdk {
    async fn is_available(&self) -> bool {
        true
    }

    async fn current_user(&self) -> Result<HostUser, HostSdkError> {
        Ok(self.user.clone())
    }

    async fn identity_token(&self) -> Result<String, HostSdkError> {
        self.identity_token
            .clone()
            .ok_or(HostSdkError::Unsupported("identity tokens"))
    }

    async fn context(&self) -> Result<HostContext, HostSdkError> {
        Ok(self.context.clone())
    }
}

/// Scriptable host SDK for tests.
pub struct MockHostSdk {
    pub user: Result<HostUser, HostSdkError>,
    pub identity_token: Option<String>,
    pub context: HostContext,
    /// `None` means the SDK never shows up.
    pub available_after_polls: Option<usize>,
    pub availability_polls: AtomicUsize,
    pub context_calls: AtomicUsize,
}

impl MockHostSdk {
    pub fn new(user: HostUser) -> Self {
        Self {
            user: Ok(user),
            identity_token: None,
            context: HostContext::default(),
            available_after_polls: Some(0),
            availability_polls: AtomicUsize::new(0),
            context_calls: AtomicUsize::new(0),
        }
    }

    pub fn never_available() -> Self {
        Self {
            available_after_polls: None,
            ..Self::new(HostUser {
                id: String::new(),
                name: String::new(),
                email: None,
            })
        }
    }

    pub fn with_identity_token(mut self, token: impl Into<String>) -> Self {
        self.identity_token = Some(token.into());
        self
    }

    pub fn with_board(mut self, board_id: impl Into<String>) -> Self {
        self.context.board_id = Some(board_id.into());
        self
    }

    pub fn available_after(mut self, polls: usize) -> Self {
        self.available_after_polls = Some(polls);
        self
    }

    pub fn polls(&self) -> usize {
        self.availability_polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostSdk for MockHostSdk {
    async fn is_available(&self) -> bool {
        let seen = self.availability_polls.fetch_add(1, Ordering::SeqCst);
        match self.available_after_polls {
            Some(after) => seen >= after,
            None => false,
        }
    }

    async fn current_user(&self) -> Result<HostUser, HostSdkError> {
        self.user.clone()
    }

    async fn identity_token(&self) -> Result<String, HostSdkError> {
        self.identity_token
            .clone()
            .ok_or(HostSdkError::Unsupported("identity tokens"))
    }

    async fn context(&self) -> Result<HostContext, HostSdkError> {
        self.context_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.context.clone())
    }
}
