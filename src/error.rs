use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Error surface for every core operation. Token and credential failures are
/// deliberately coarse: callers can not distinguish a bad signature from an
/// expired token, and a wrong password reads the same as an unknown email.
/// Account status rejections are the documented exception and do disclose
/// state.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed authorization credential")]
    MissingCredential,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is blocked{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    AccountBlocked { reason: Option<String> },
    #[error("account has been deleted")]
    AccountDeleted,
    #[error("account is pending email verification")]
    AccountNotVerified,
    #[error("insufficient permissions")]
    InsufficientRole,
    #[error("too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("user with this email already exists")]
    EmailTaken,
    #[error("user not found")]
    UserNotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("notification delivery failed: {0}")]
    Notify(String),
    #[error("password hashing error: {0}")]
    Hash(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unexpected error: {0}")]
    Other(String),
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Hash(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::Hash(err.to_string())
    }
}
