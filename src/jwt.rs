use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AuthError, AuthResult};
use crate::roles::Role;

/// Token kind embedded in the claims. An access token must never be accepted
/// where a refresh token is expected, and vice versa; the two kinds are also
/// signed with disjoint secrets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

impl TokenClaims {
    pub fn subject_id(&self) -> AuthResult<Uuid> {
        self.sub.parse::<Uuid>().map_err(|_| AuthError::InvalidToken)
    }
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Stateless signing and verification of the two token kinds. Pure
/// cryptographic transform: no store access, nothing cached.
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn from_config(config: &Config) -> Self {
        let access_bytes = config.access_token_secret.as_bytes();
        let refresh_bytes = config.refresh_token_secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;

        Self {
            access_encoding: EncodingKey::from_secret(access_bytes),
            access_decoding: DecodingKey::from_secret(access_bytes),
            refresh_encoding: EncodingKey::from_secret(refresh_bytes),
            refresh_decoding: DecodingKey::from_secret(refresh_bytes),
            validation,
            access_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_secs),
        }
    }

    pub fn issue_access(&self, subject: Uuid, email: &str, role: Role) -> AuthResult<SignedToken> {
        self.issue(subject, email, role, TokenKind::Access)
    }

    pub fn issue_refresh(&self, subject: Uuid, email: &str, role: Role) -> AuthResult<SignedToken> {
        self.issue(subject, email, role, TokenKind::Refresh)
    }

    /// Verify signature, expiry, and embedded kind. Every failure mode
    /// collapses to the same error so callers can not probe which check
    /// rejected the token.
    pub fn verify(&self, token: &str, expected: TokenKind) -> AuthResult<TokenClaims> {
        let decoding = match expected {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };

        let data = decode::<TokenClaims>(token, decoding, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?;

        if data.claims.kind != expected {
            return Err(AuthError::InvalidToken);
        }

        Ok(data.claims)
    }

    fn issue(
        &self,
        subject: Uuid,
        email: &str,
        role: Role,
        kind: TokenKind,
    ) -> AuthResult<SignedToken> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let expires_at = now + ttl;

        let claims = TokenClaims {
            sub: subject.to_string(),
            email: email.to_string(),
            role,
            kind,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, self.encoding_key(kind))
            .map_err(|err| AuthError::Other(format!("token signing failed: {err}")))?;

        Ok(SignedToken { token, expires_at })
    }

    fn encoding_key(&self, kind: TokenKind) -> &EncodingKey {
        match kind {
            TokenKind::Access => &self.access_encoding,
            TokenKind::Refresh => &self.refresh_encoding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_config;

    #[test]
    fn issues_and_verifies_both_kinds() {
        let service = TokenService::from_config(&test_config());
        let subject = Uuid::new_v4();

        let access = service
            .issue_access(subject, "user@example.com", Role::User)
            .expect("issue access");
        let refresh = service
            .issue_refresh(subject, "user@example.com", Role::User)
            .expect("issue refresh");

        let claims = service
            .verify(&access.token, TokenKind::Access)
            .expect("verify access");
        assert_eq!(claims.subject_id().expect("uuid sub"), subject);
        assert_eq!(claims.email, "user@example.com");
        assert_eq!(claims.role, Role::User);
        assert!(claims.exp > claims.iat);

        service
            .verify(&refresh.token, TokenKind::Refresh)
            .expect("verify refresh");
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let service = TokenService::from_config(&test_config());
        let subject = Uuid::new_v4();

        let access = service
            .issue_access(subject, "user@example.com", Role::User)
            .expect("issue access");
        let refresh = service
            .issue_refresh(subject, "user@example.com", Role::User)
            .expect("issue refresh");

        assert!(service.verify(&access.token, TokenKind::Refresh).is_err());
        assert!(service.verify(&refresh.token, TokenKind::Access).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let mut config = test_config();
        config.access_token_ttl_secs = -120;
        let service = TokenService::from_config(&config);

        let token = service
            .issue_access(Uuid::new_v4(), "user@example.com", Role::User)
            .expect("issue access");
        assert!(service.verify(&token.token, TokenKind::Access).is_err());
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let service = TokenService::from_config(&test_config());
        let token = service
            .issue_access(Uuid::new_v4(), "user@example.com", Role::User)
            .expect("issue access");

        let mut tampered = token.token.clone();
        tampered.push('x');
        assert!(service.verify(&tampered, TokenKind::Access).is_err());
        assert!(service.verify("not-a-token", TokenKind::Access).is_err());
    }
}
