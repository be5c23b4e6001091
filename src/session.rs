use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::credentials::{self, PasswordService};
use crate::error::{AuthError, AuthResult};
use crate::guard::AuthUser;
use crate::jwt::{TokenKind, TokenService};
use crate::notify::{NotificationKind, NotificationQueue};
use crate::roles::{AccountStatus, Role};
use crate::store::{NewUser, User, UserStore, UserUpdate};

#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Orchestrates the session lifecycle against the user store and token
/// service: registration, login, refresh rotation with reuse detection,
/// logout, and the verification/reset token flows.
pub struct SessionService {
    store: Arc<dyn UserStore>,
    passwords: PasswordService,
    tokens: Arc<TokenService>,
    queue: Arc<NotificationQueue>,
    config: Config,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn UserStore>,
        passwords: PasswordService,
        tokens: Arc<TokenService>,
        queue: Arc<NotificationQueue>,
        config: Config,
    ) -> Self {
        Self {
            store,
            passwords,
            tokens,
            queue,
            config,
        }
    }

    /// Create a pending identity and enqueue its verification notice. A
    /// failure to enqueue never fails the registration itself.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: Option<Role>,
    ) -> AuthResult<User> {
        let email = validate_email(email)?;
        validate_password(password)?;

        let password_digest = self.passwords.hash_password(password)?;
        let verification_token = credentials::generate_token(credentials::TOKEN_LEN);
        let verification_expires_at =
            Utc::now() + Duration::seconds(self.config.verification_token_ttl_secs);

        let user = self
            .store
            .create(NewUser {
                email,
                password_digest,
                role: role.unwrap_or(Role::User),
                verification_token: Some(verification_token.clone()),
                verification_expires_at: Some(verification_expires_at),
            })
            .await?;

        self.queue
            .enqueue(
                NotificationKind::Verification,
                &user.email,
                json!({ "token": verification_token }),
            )
            .await;

        log::info!("user {} registered, verification pending", user.id);
        Ok(user)
    }

    /// Authenticate credentials and mint a fresh access/refresh pair.
    /// Account status errors disclose blocked/deleted state on purpose;
    /// unknown email and wrong password are indistinguishable.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<SessionTokens> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation("email and password are required".into()));
        }

        let user = match self.store.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                log::warn!("login attempt for unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        self.check_login_status(&user)?;

        if !self.passwords.verify_password(password, &user.password_digest)? {
            log::warn!("failed login attempt for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.issue_pair(&user)?;
        self.store
            .add_refresh_digest(user.id, &credentials::hash_token(&tokens.refresh_token))
            .await?;
        self.store
            .update_fields(
                user.id,
                UserUpdate {
                    last_login_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        log::info!("user {} logged in", user.id);
        Ok(tokens)
    }

    /// Exchange a refresh token for a new pair, rotating the stored digest.
    ///
    /// Presenting a structurally valid token whose digest is no longer in
    /// the store is treated as theft: every digest for the identity is
    /// revoked, forcing re-authentication on all devices. The rotation
    /// itself is a single conditional swap, so when two calls race on the
    /// same token exactly one rotates and the loser takes the revocation
    /// path.
    pub async fn refresh(&self, presented: &str) -> AuthResult<SessionTokens> {
        let claims = self.tokens.verify(presented, TokenKind::Refresh)?;
        let user_id = claims.subject_id()?;

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let presented_digest = credentials::hash_token(presented);
        if !user.refresh_token_digests.contains(&presented_digest) {
            self.revoke_all_on_reuse(user.id).await?;
            return Err(AuthError::InvalidToken);
        }

        match user.status {
            AccountStatus::Blocked => {
                return Err(AuthError::AccountBlocked {
                    reason: user.blocked_reason.clone(),
                });
            }
            AccountStatus::Deleted => return Err(AuthError::AccountDeleted),
            _ => {}
        }

        let tokens = self.issue_pair(&user)?;
        let new_digest = credentials::hash_token(&tokens.refresh_token);
        let rotated = self
            .store
            .swap_refresh_digest(user.id, &presented_digest, &new_digest)
            .await?;
        if !rotated {
            // Someone else rotated this digest away between our membership
            // check and the swap.
            self.revoke_all_on_reuse(user.id).await?;
            return Err(AuthError::InvalidToken);
        }

        log::info!("user {} rotated refresh token", user.id);
        Ok(tokens)
    }

    /// Best-effort session teardown: absent or unparseable tokens still
    /// succeed, so logout leaks nothing and is idempotent.
    pub async fn logout(&self, presented: &str) -> AuthResult<()> {
        let Ok(claims) = self.tokens.verify(presented, TokenKind::Refresh) else {
            return Ok(());
        };
        let Ok(user_id) = claims.subject_id() else {
            return Ok(());
        };

        self.store
            .remove_refresh_digest(user_id, &credentials::hash_token(presented))
            .await?;
        log::debug!("user {user_id} logged out");
        Ok(())
    }

    /// Mint a reset token and enqueue the notice. The outcome is identical
    /// whether or not the email exists, to resist enumeration.
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.store.find_by_email(&email).await? else {
            log::debug!("password reset requested for unknown email");
            return Ok(());
        };

        let reset_token = credentials::generate_token(credentials::TOKEN_LEN);
        let expires_at = Utc::now() + Duration::seconds(self.config.reset_token_ttl_secs);
        self.store
            .update_fields(
                user.id,
                UserUpdate {
                    reset_token: Some((reset_token.clone(), expires_at)),
                    ..Default::default()
                },
            )
            .await?;

        self.queue
            .enqueue(
                NotificationKind::PasswordReset,
                &user.email,
                json!({ "token": reset_token }),
            )
            .await;

        log::info!("password reset token issued for user {}", user.id);
        Ok(())
    }

    /// Consume a reset token: replace the password digest, clear the token,
    /// and revoke every refresh digest so all existing sessions must
    /// re-authenticate.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        validate_password(new_password)?;

        let user = self
            .store
            .find_by_reset_token(token, Utc::now())
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let password_digest = self.passwords.hash_password(new_password)?;
        self.store
            .update_fields(
                user.id,
                UserUpdate {
                    password_digest: Some(password_digest),
                    clear_reset_token: true,
                    ..Default::default()
                },
            )
            .await?;
        self.store.clear_refresh_digests(user.id).await?;

        log::info!("password reset for user {}, all sessions revoked", user.id);
        Ok(())
    }

    /// Consume a verification token: mark the email verified, activate the
    /// account, and enqueue the welcome notice.
    pub async fn verify_email(&self, token: &str) -> AuthResult<()> {
        let user = self
            .store
            .find_by_verification_token(token, Utc::now())
            .await?
            .ok_or(AuthError::InvalidToken)?;

        self.store
            .update_fields(
                user.id,
                UserUpdate {
                    email_verified: Some(true),
                    status: Some(AccountStatus::Active),
                    clear_verification_token: true,
                    ..Default::default()
                },
            )
            .await?;

        self.queue
            .enqueue(NotificationKind::Welcome, &user.email, json!({}))
            .await;

        log::info!("user {} verified their email", user.id);
        Ok(())
    }

    /// Administrative block: requires the block-users capability, refuses
    /// self-blocks, and only an admin may block another admin. Clears every
    /// refresh digest so the target is logged out everywhere.
    pub async fn block_user(
        &self,
        actor: &AuthUser,
        target_id: Uuid,
        reason: Option<String>,
    ) -> AuthResult<()> {
        if !actor.role.can_block_users() {
            return Err(AuthError::InsufficientRole);
        }
        if actor.id == target_id {
            return Err(AuthError::Validation("you cannot block yourself".into()));
        }

        let target = self
            .store
            .find_by_id(target_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if target.role == Role::Admin && actor.role != Role::Admin {
            return Err(AuthError::InsufficientRole);
        }

        self.store
            .set_blocked(target_id, actor.id, reason)
            .await?;
        self.store.clear_refresh_digests(target_id).await?;

        log::warn!("user {target_id} blocked by {}", actor.id);
        Ok(())
    }

    pub async fn unblock_user(&self, actor: &AuthUser, target_id: Uuid) -> AuthResult<()> {
        if !actor.role.can_block_users() {
            return Err(AuthError::InsufficientRole);
        }

        let changed = self.store.set_unblocked(target_id).await?;
        if !changed {
            return Err(AuthError::UserNotFound);
        }

        log::info!("user {target_id} unblocked by {}", actor.id);
        Ok(())
    }

    fn check_login_status(&self, user: &User) -> AuthResult<()> {
        match user.status {
            AccountStatus::Blocked => {
                log::warn!("login attempt on blocked user {}", user.id);
                Err(AuthError::AccountBlocked {
                    reason: user.blocked_reason.clone(),
                })
            }
            AccountStatus::Deleted => {
                log::warn!("login attempt on deleted user {}", user.id);
                Err(AuthError::AccountDeleted)
            }
            AccountStatus::PendingVerification => Err(AuthError::AccountNotVerified),
            AccountStatus::Active => Ok(()),
        }
    }

    fn issue_pair(&self, user: &User) -> AuthResult<SessionTokens> {
        let access = self.tokens.issue_access(user.id, &user.email, user.role)?;
        let refresh = self.tokens.issue_refresh(user.id, &user.email, user.role)?;
        Ok(SessionTokens {
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
        })
    }

    async fn revoke_all_on_reuse(&self, user_id: Uuid) -> AuthResult<()> {
        log::warn!("refresh token reuse detected for user {user_id}, revoking all sessions");
        self.store.clear_refresh_digests(user_id).await?;
        Ok(())
    }
}

fn validate_email(email: &str) -> AuthResult<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(AuthError::Validation("invalid email address".into()));
    }
    Ok(email)
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.len() < 8 {
        return Err(AuthError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(AuthError::Validation(
            "password must contain at least one uppercase letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AuthError::Validation(
            "password must contain at least one lowercase letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::Validation(
            "password must contain at least one number".into(),
        ));
    }
    Ok(())
}
