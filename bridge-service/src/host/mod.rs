//! Host platform integration: SDK boundary, identity extraction and the
//! board-context cache.

pub mod adapter;
pub mod context;
pub mod sdk;
pub mod token;

pub use adapter::HostIdentityAdapter;
pub use context::BoardContextCache;
pub use sdk::{HostContext, HostSdk, HostSdkError, HostUser, MockHostSdk, PayloadHostSdk};
pub use token::email_from_identity_token;
