use std::sync::Arc;

use crate::error::{AuthError, AuthResult};
use crate::jwt::{TokenKind, TokenService};
use crate::roles::{AccountStatus, Role};
use crate::store::UserStore;
use uuid::Uuid;

/// Identity established for a single protected call. Role and email come
/// from the store lookup, not the token claims, so stale claims can not
/// outlive a role change.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Guard evaluated on every protected call. Verifies the bearer token and
/// re-checks live account status against the store; nothing is cached
/// beyond the single request.
pub struct AuthGate {
    store: Arc<dyn UserStore>,
    tokens: Arc<TokenService>,
}

impl AuthGate {
    pub fn new(store: Arc<dyn UserStore>, tokens: Arc<TokenService>) -> Self {
        Self { store, tokens }
    }

    /// Authenticate an `Authorization` header value. Signature validity
    /// alone is not enough: the identity must still exist and must not be
    /// blocked or deleted.
    pub async fn authenticate(&self, authorization: Option<&str>) -> AuthResult<AuthUser> {
        let header = authorization.ok_or(AuthError::MissingCredential)?;
        let token = bearer_token(header)?;

        let claims = self.tokens.verify(token, TokenKind::Access)?;
        let user_id = claims.subject_id()?;

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        match user.status {
            AccountStatus::Blocked => {
                log::warn!("blocked user {} presented a valid access token", user.id);
                Err(AuthError::AccountBlocked {
                    reason: user.blocked_reason.clone(),
                })
            }
            AccountStatus::Deleted => {
                log::warn!("deleted user {} presented a valid access token", user.id);
                Err(AuthError::AccountDeleted)
            }
            _ => Ok(AuthUser {
                id: user.id,
                email: user.email,
                role: user.role,
            }),
        }
    }

    /// Explicit allow-list membership test. Each protected operation
    /// declares its own set; there is no role hierarchy.
    pub fn require_role(user: &AuthUser, allowed: &[Role]) -> AuthResult<()> {
        if allowed.contains(&user.role) {
            Ok(())
        } else {
            Err(AuthError::InsufficientRole)
        }
    }
}

fn bearer_token(header: &str) -> AuthResult<&str> {
    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
        Ok(token)
    } else {
        Err(AuthError::MissingCredential)
    }
}
