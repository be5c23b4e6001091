use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::roles::{AccountStatus, Role};

/// Durable identity record. `refresh_token_digests` holds SHA-256 digests
/// only, never plaintext tokens; membership in the set is the sole authority
/// for refresh validity.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_digest: String,
    pub role: Role,
    pub status: AccountStatus,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
    pub reset_token: Option<String>,
    pub reset_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_digests: HashSet<String>,
    pub blocked_by: Option<Uuid>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Fields supplied at registration; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_digest: String,
    pub role: Role,
    pub verification_token: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
}

/// Partial update applied by `update_fields`. Single-use tokens are cleared
/// with the explicit flags; setting a new token overwrites (and thereby
/// invalidates) any prior value of the same kind.
#[derive(Debug, Default, Clone)]
pub struct UserUpdate {
    pub password_digest: Option<String>,
    pub status: Option<AccountStatus>,
    pub email_verified: Option<bool>,
    pub verification_token: Option<(String, DateTime<Utc>)>,
    pub clear_verification_token: bool,
    pub reset_token: Option<(String, DateTime<Utc>)>,
    pub clear_reset_token: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Store collaborator contract. Every mutation reports whether a record was
/// actually changed so the engine can detect no-ops and contention.
///
/// `swap_refresh_digest` is the rotation primitive: it must remove the old
/// digest and insert the new one as a single conditional update, failing
/// (returning `false`) when the old digest is no longer present.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>>;
    async fn find_by_verification_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<User>>;
    async fn find_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<User>>;
    async fn create(&self, user: NewUser) -> AuthResult<User>;
    async fn update_fields(&self, id: Uuid, update: UserUpdate) -> AuthResult<bool>;
    async fn add_refresh_digest(&self, id: Uuid, digest: &str) -> AuthResult<bool>;
    async fn remove_refresh_digest(&self, id: Uuid, digest: &str) -> AuthResult<bool>;
    async fn swap_refresh_digest(
        &self,
        id: Uuid,
        old_digest: &str,
        new_digest: &str,
    ) -> AuthResult<bool>;
    async fn clear_refresh_digests(&self, id: Uuid) -> AuthResult<bool>;
    async fn set_blocked(
        &self,
        id: Uuid,
        blocked_by: Uuid,
        reason: Option<String>,
    ) -> AuthResult<bool>;
    async fn set_unblocked(&self, id: Uuid) -> AuthResult<bool>;
}

/// In-memory store: the unit/integration test double and the reference
/// implementation of the contract. A single write lock scopes each mutation,
/// which makes the digest swap atomic with respect to concurrent rotations.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let needle = email.to_lowercase();
        let users = self.users.read();
        Ok(users.values().find(|u| u.email == needle).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn find_by_verification_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<User>> {
        let users = self.users.read();
        Ok(users
            .values()
            .find(|u| {
                u.verification_token.as_deref() == Some(token)
                    && u.verification_expires_at.map(|exp| exp > now).unwrap_or(false)
            })
            .cloned())
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<User>> {
        let users = self.users.read();
        Ok(users
            .values()
            .find(|u| {
                u.reset_token.as_deref() == Some(token)
                    && u.reset_expires_at.map(|exp| exp > now).unwrap_or(false)
            })
            .cloned())
    }

    async fn create(&self, user: NewUser) -> AuthResult<User> {
        let email = user.email.to_lowercase();
        let mut users = self.users.write();
        if users.values().any(|u| u.email == email) {
            return Err(AuthError::EmailTaken);
        }

        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4(),
            email,
            password_digest: user.password_digest,
            role: user.role,
            status: AccountStatus::PendingVerification,
            email_verified: false,
            verification_token: user.verification_token,
            verification_expires_at: user.verification_expires_at,
            reset_token: None,
            reset_expires_at: None,
            refresh_token_digests: HashSet::new(),
            blocked_by: None,
            blocked_at: None,
            blocked_reason: None,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_fields(&self, id: Uuid, update: UserUpdate) -> AuthResult<bool> {
        let mut users = self.users.write();
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };

        if let Some(digest) = update.password_digest {
            user.password_digest = digest;
        }
        if let Some(status) = update.status {
            user.status = status;
        }
        if let Some(verified) = update.email_verified {
            user.email_verified = verified;
        }
        if let Some((token, expires_at)) = update.verification_token {
            user.verification_token = Some(token);
            user.verification_expires_at = Some(expires_at);
        }
        if update.clear_verification_token {
            user.verification_token = None;
            user.verification_expires_at = None;
        }
        if let Some((token, expires_at)) = update.reset_token {
            user.reset_token = Some(token);
            user.reset_expires_at = Some(expires_at);
        }
        if update.clear_reset_token {
            user.reset_token = None;
            user.reset_expires_at = None;
        }
        if let Some(at) = update.last_login_at {
            user.last_login_at = Some(at);
        }

        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn add_refresh_digest(&self, id: Uuid, digest: &str) -> AuthResult<bool> {
        let mut users = self.users.write();
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        let changed = user.refresh_token_digests.insert(digest.to_string());
        if changed {
            user.updated_at = Utc::now();
        }
        Ok(changed)
    }

    async fn remove_refresh_digest(&self, id: Uuid, digest: &str) -> AuthResult<bool> {
        let mut users = self.users.write();
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        let changed = user.refresh_token_digests.remove(digest);
        if changed {
            user.updated_at = Utc::now();
        }
        Ok(changed)
    }

    async fn swap_refresh_digest(
        &self,
        id: Uuid,
        old_digest: &str,
        new_digest: &str,
    ) -> AuthResult<bool> {
        let mut users = self.users.write();
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        if !user.refresh_token_digests.remove(old_digest) {
            return Ok(false);
        }
        user.refresh_token_digests.insert(new_digest.to_string());
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn clear_refresh_digests(&self, id: Uuid) -> AuthResult<bool> {
        let mut users = self.users.write();
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        let changed = !user.refresh_token_digests.is_empty();
        user.refresh_token_digests.clear();
        if changed {
            user.updated_at = Utc::now();
        }
        Ok(changed)
    }

    async fn set_blocked(
        &self,
        id: Uuid,
        blocked_by: Uuid,
        reason: Option<String>,
    ) -> AuthResult<bool> {
        let mut users = self.users.write();
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        let now = Utc::now();
        user.status = AccountStatus::Blocked;
        user.blocked_by = Some(blocked_by);
        user.blocked_at = Some(now);
        user.blocked_reason = reason;
        user.updated_at = now;
        Ok(true)
    }

    async fn set_unblocked(&self, id: Uuid) -> AuthResult<bool> {
        let mut users = self.users.write();
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        user.status = AccountStatus::Active;
        user.blocked_by = None;
        user.blocked_at = None;
        user.blocked_reason = None;
        user.updated_at = Utc::now();
        Ok(true)
    }
}
