//! Primary directory: the store boundary and the resolver that maps a host
//! identity onto a directory user.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::error::{BridgeError, StoreError};
use crate::models::{DirectoryUser, HostIdentity, LinkageRecord, Role, SecondaryAuthAccountId};

/// Result of an idempotent link write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Created,
    AlreadyLinked,
}

/// Storage operations the resolver and bridge rely on.
///
/// Implementations must enforce uniqueness of `host_user_id` and of
/// lowercased `email`, reporting collisions as `StoreError::UniqueViolation`.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_by_host_user_id(
        &self,
        host_user_id: &str,
    ) -> Result<Option<DirectoryUser>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<DirectoryUser>, StoreError>;

    async fn insert_user(&self, user: &DirectoryUser) -> Result<(), StoreError>;

    /// Set `host_user_id` on a row that has none. Returns whether a row changed.
    async fn attach_host_user_id(
        &self,
        user_id: Uuid,
        host_user_id: &str,
    ) -> Result<bool, StoreError>;

    async fn find_link(&self, directory_user_id: Uuid)
        -> Result<Option<LinkageRecord>, StoreError>;

    async fn find_link_by_account(
        &self,
        account_id: SecondaryAuthAccountId,
    ) -> Result<Option<LinkageRecord>, StoreError>;

    /// Atomic, idempotent linkage write.
    async fn upsert_link(
        &self,
        directory_user_id: Uuid,
        account_id: SecondaryAuthAccountId,
    ) -> Result<LinkOutcome, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Resolves host identities against the directory.
#[derive(Clone)]
pub struct DirectoryResolver {
    store: Arc<dyn DirectoryStore>,
    main_admin_email: Option<String>,
}

impl DirectoryResolver {
    pub fn new(store: Arc<dyn DirectoryStore>, main_admin_email: Option<String>) -> Self {
        Self {
            store,
            main_admin_email: main_admin_email
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty()),
        }
    }

    /// Find (or, for the main admin, create) the directory user for `identity`.
    ///
    /// Order: main-admin email, host user id, email. Clients are never
    /// created here; they must be provisioned out-of-band.
    pub async fn resolve(&self, identity: &HostIdentity) -> Result<DirectoryUser, BridgeError> {
        let host_user_id = identity.host_user_id.as_str();
        let email = identity.normalized_email();

        if let (Some(email), Some(admin_email)) = (email.as_deref(), self.main_admin_email.as_deref())
        {
            if email == admin_email {
                return self.ensure_main_admin(identity, email).await;
            }
        }

        if let Some(user) = self.store.find_by_host_user_id(host_user_id).await? {
            tracing::debug!(user_id = %user.id, "Directory user matched by host user id");
            return Ok(user);
        }

        if let Some(email) = email.as_deref() {
            if let Some(user) = self.store.find_by_email(email).await? {
                return match user.host_user_id.as_deref() {
                    None => self.attach(user, host_user_id).await,
                    Some(existing) => {
                        tracing::warn!(
                            user_id = %user.id,
                            existing_host_user_id = %existing,
                            host_user_id = %host_user_id,
                            "Email matches a directory user bound to another host user"
                        );
                        Err(BridgeError::DirectoryNotFound {
                            host_user_id: host_user_id.to_string(),
                        })
                    }
                };
            }
        }

        tracing::info!(host_user_id = %host_user_id, "No directory user for host identity");
        Err(BridgeError::DirectoryNotFound {
            host_user_id: host_user_id.to_string(),
        })
    }

    async fn ensure_main_admin(
        &self,
        identity: &HostIdentity,
        email: &str,
    ) -> Result<DirectoryUser, BridgeError> {
        let user = match self.store.find_by_email(email).await? {
            Some(user) => user,
            None => {
                let name = if identity.display_name.trim().is_empty() {
                    email.to_string()
                } else {
                    identity.display_name.clone()
                };
                let admin = DirectoryUser::new_super_admin(
                    email.to_string(),
                    name,
                    Some(identity.host_user_id.clone()),
                );

                match self.store.insert_user(&admin).await {
                    Ok(()) => {
                        tracing::info!(user_id = %admin.id, "Created main admin directory user");
                        admin
                    }
                    Err(StoreError::UniqueViolation(constraint)) => {
                        tracing::debug!(%constraint, "Main admin insert collided, re-reading");
                        match self.store.find_by_email(email).await? {
                            Some(existing) => existing,
                            None => {
                                // The host id is held by another row.
                                let unbound = DirectoryUser {
                                    host_user_id: None,
                                    ..admin
                                };
                                self.store.insert_user(&unbound).await?;
                                tracing::warn!(
                                    user_id = %unbound.id,
                                    "Created main admin without host user id"
                                );
                                unbound
                            }
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let mut user = user;
        if user.host_user_id.is_none() {
            match self
                .store
                .attach_host_user_id(user.id, &identity.host_user_id)
                .await
            {
                Ok(true) => user.host_user_id = Some(identity.host_user_id.clone()),
                // The host id belongs to another row; the admin row stays unbound.
                Ok(false) | Err(StoreError::UniqueViolation(_)) => {
                    tracing::warn!(
                        user_id = %user.id,
                        host_user_id = %identity.host_user_id,
                        "Could not attach host user id to main admin"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        if user.role != Role::Admin || !user.is_super_admin || user.primary_board_id.is_some() {
            tracing::warn!(
                user_id = %user.id,
                stored_role = %user.role.as_str(),
                "Main admin row is not stored as super-admin; treating it as one"
            );
        }

        Ok(DirectoryUser {
            role: Role::Admin,
            primary_board_id: None,
            is_super_admin: true,
            ..user
        })
    }

    async fn attach(
        &self,
        mut user: DirectoryUser,
        host_user_id: &str,
    ) -> Result<DirectoryUser, BridgeError> {
        match self.store.attach_host_user_id(user.id, host_user_id).await {
            Ok(true) => {
                tracing::info!(user_id = %user.id, host_user_id = %host_user_id, "Attached host user id");
            }
            Ok(false) | Err(StoreError::UniqueViolation(_)) => {
                // Lost a race: another bootstrap attached first.
                return match self.store.find_by_host_user_id(host_user_id).await? {
                    Some(current) => Ok(current),
                    None => {
                        tracing::warn!(
                            user_id = %user.id,
                            host_user_id = %host_user_id,
                            "Directory user was bound to another host user concurrently"
                        );
                        Err(BridgeError::DirectoryNotFound {
                            host_user_id: host_user_id.to_string(),
                        })
                    }
                };
            }
            Err(e) => return Err(e.into()),
        }

        user.host_user_id = Some(host_user_id.to_string());
        Ok(user)
    }
}

#[derive(Default)]
struct MockDirectoryState {
    users: HashMap<Uuid, DirectoryUser>,
    links: HashMap<Uuid, LinkageRecord>,
}

/// In-memory directory with the same uniqueness rules as the database.
#[derive(Default)]
pub struct MockDirectoryStore {
    state: Mutex<MockDirectoryState>,
    pub user_writes: AtomicUsize,
    pub link_writes: AtomicUsize,
    pub email_lookups: AtomicUsize,
    pub fail_links: AtomicBool,
    /// Yield to the scheduler before each insert so concurrent callers interleave.
    pub yield_before_insert: AtomicBool,
}

impl MockDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row without counting it as a write.
    pub fn with_user(self, user: DirectoryUser) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.users.insert(user.id, user);
        }
        self
    }

    pub fn user(&self, id: Uuid) -> Option<DirectoryUser> {
        self.state.lock().ok()?.users.get(&id).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().map(|s| s.users.len()).unwrap_or(0)
    }

    pub fn link(&self, directory_user_id: Uuid) -> Option<LinkageRecord> {
        self.state.lock().ok()?.links.get(&directory_user_id).cloned()
    }

    pub fn writes(&self) -> usize {
        self.user_writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockDirectoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Database(format!("Mock directory mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl DirectoryStore for MockDirectoryStore {
    async fn find_by_host_user_id(
        &self,
        host_user_id: &str,
    ) -> Result<Option<DirectoryUser>, StoreError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.host_user_id.as_deref() == Some(host_user_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<DirectoryUser>, StoreError> {
        self.email_lookups.fetch_add(1, Ordering::SeqCst);
        let email = email.trim().to_lowercase();
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn insert_user(&self, user: &DirectoryUser) -> Result<(), StoreError> {
        if self.yield_before_insert.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        let mut state = self.lock()?;
        let email = user.email.to_lowercase();
        if state.users.values().any(|u| u.email.to_lowercase() == email) {
            return Err(StoreError::UniqueViolation(
                "directory_users_email_lower_idx".to_string(),
            ));
        }
        if let Some(host_user_id) = user.host_user_id.as_deref() {
            if state
                .users
                .values()
                .any(|u| u.host_user_id.as_deref() == Some(host_user_id))
            {
                return Err(StoreError::UniqueViolation(
                    "directory_users_host_user_id_idx".to_string(),
                ));
            }
        }
        state.users.insert(user.id, user.clone());
        self.user_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn attach_host_user_id(
        &self,
        user_id: Uuid,
        host_user_id: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        if state
            .users
            .values()
            .any(|u| u.id != user_id && u.host_user_id.as_deref() == Some(host_user_id))
        {
            return Err(StoreError::UniqueViolation(
                "directory_users_host_user_id_idx".to_string(),
            ));
        }
        match state.users.get_mut(&user_id) {
            Some(user) if user.host_user_id.is_none() => {
                user.host_user_id = Some(host_user_id.to_string());
                self.user_writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_link(
        &self,
        directory_user_id: Uuid,
    ) -> Result<Option<LinkageRecord>, StoreError> {
        Ok(self.lock()?.links.get(&directory_user_id).cloned())
    }

    async fn find_link_by_account(
        &self,
        account_id: SecondaryAuthAccountId,
    ) -> Result<Option<LinkageRecord>, StoreError> {
        Ok(self
            .lock()?
            .links
            .values()
            .find(|l| l.auth_account_id == account_id.0)
            .cloned())
    }

    async fn upsert_link(
        &self,
        directory_user_id: Uuid,
        account_id: SecondaryAuthAccountId,
    ) -> Result<LinkOutcome, StoreError> {
        if self.fail_links.load(Ordering::SeqCst) {
            return Err(StoreError::Database("link write rejected".to_string()));
        }

        let mut state = self.lock()?;
        if let Some(existing) = state.links.get(&directory_user_id) {
            return if existing.auth_account_id == account_id.0 {
                Ok(LinkOutcome::AlreadyLinked)
            } else {
                Err(StoreError::LinkConflict(directory_user_id))
            };
        }
        if state
            .links
            .values()
            .any(|l| l.auth_account_id == account_id.0)
        {
            return Err(StoreError::UniqueViolation(
                "directory_auth_links_auth_account_id_key".to_string(),
            ));
        }
        state
            .links
            .insert(directory_user_id, LinkageRecord::new(directory_user_id, account_id));
        self.link_writes.fetch_add(1, Ordering::SeqCst);
        Ok(LinkOutcome::Created)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
