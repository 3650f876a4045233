pub mod directory_user;
pub mod host_identity;
pub mod linkage;
pub mod session;

pub use directory_user::{DirectoryUser, DirectoryUserRow, Role};
pub use host_identity::{normalize_email, HostIdentity};
pub use linkage::{LinkageRecord, SecondaryAuthAccountId};
pub use session::{RedirectTarget, Session};
