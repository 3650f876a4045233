//! Services layer: directory, credentials, secondary auth and the bootstrap
//! pipeline that ties them together.

mod bootstrap;
mod bridge;
mod credentials;
mod database;
mod directory;
pub mod error;
mod routing;
mod secondary_auth;

pub use bootstrap::SessionBootstrapper;
pub use bridge::{AuthBridge, BridgeOutcome, EstablishedVia};
pub use credentials::{CredentialDeriver, DERIVED_SECRET_LEN};
pub use database::Database;
pub use directory::{DirectoryResolver, DirectoryStore, LinkOutcome, MockDirectoryStore};
pub use error::{BridgeError, StoreError};
pub use routing::{build_session, redirect_target};
pub use secondary_auth::{
    AuthAccount, AuthProviderError, AuthSession, GoTrueClient, MockSecondaryAuth, SecondaryAuth,
    SignUpOutcome,
};
