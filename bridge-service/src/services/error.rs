use service_core::error::AppError;
use thiserror::Error;

/// Failures that can leave the bootstrap pipeline.
///
/// Every downstream error is translated into one of these kinds at the stage
/// that observed it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Host SDK did not become available")]
    HostUnavailable,

    #[error("No directory user for host user {host_user_id}")]
    DirectoryNotFound { host_user_id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Secondary auth sign-in failed: {0}")]
    AuthSignInFailed(String),

    #[error("Email {email} is already registered with different credentials")]
    EmailConflict { email: String },

    /// Non-fatal: logged by the bridge, the session is still returned.
    #[error("Failed to link secondary auth account: {0}")]
    LinkFailed(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Failures at the directory store boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Directory user {0} is already linked to a different account")]
    LinkConflict(uuid::Uuid),

    #[error("Invalid directory row: {0}")]
    InvalidRow(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.constraint().unwrap_or("unknown").to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

impl From<StoreError> for BridgeError {
    fn from(err: StoreError) -> Self {
        BridgeError::Unexpected(err.to_string())
    }
}

impl BridgeError {
    /// Stable machine-readable code for logs and API clients.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::HostUnavailable => "host_unavailable",
            BridgeError::DirectoryNotFound { .. } => "directory_not_found",
            BridgeError::InvalidInput(_) => "invalid_input",
            BridgeError::AuthSignInFailed(_) => "auth_sign_in_failed",
            BridgeError::EmailConflict { .. } => "email_conflict",
            BridgeError::LinkFailed(_) => "link_failed",
            BridgeError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<BridgeError> for AppError {
    fn from(err: BridgeError) -> Self {
        let message = err.to_string();
        match err {
            BridgeError::HostUnavailable => AppError::ServiceUnavailable(message),
            BridgeError::DirectoryNotFound { .. } => AppError::NotFound(anyhow::anyhow!(message)),
            BridgeError::InvalidInput(_) => AppError::BadRequest(anyhow::anyhow!(message)),
            BridgeError::AuthSignInFailed(_) => AppError::AuthError(anyhow::anyhow!(message)),
            BridgeError::EmailConflict { .. } => AppError::Conflict(anyhow::anyhow!(message)),
            BridgeError::LinkFailed(_) | BridgeError::Unexpected(_) => {
                AppError::InternalError(anyhow::anyhow!(message))
            }
        }
    }
}
