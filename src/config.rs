use crate::error::{AuthError, AuthResult};

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub verification_token_ttl_secs: i64,
    pub reset_token_ttl_secs: i64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
    pub login_rate_limit_max_requests: u32,
    pub notify_max_attempts: u32,
    pub notify_retry_base_secs: u64,
}

impl Config {
    pub fn from_env() -> AuthResult<Self> {
        let access_token_secret = std::env::var("AUTH_JWT_ACCESS_SECRET")
            .map_err(|_| AuthError::Config("AUTH_JWT_ACCESS_SECRET is required".into()))?;
        let refresh_token_secret = std::env::var("AUTH_JWT_REFRESH_SECRET")
            .map_err(|_| AuthError::Config("AUTH_JWT_REFRESH_SECRET is required".into()))?;
        if access_token_secret == refresh_token_secret {
            return Err(AuthError::Config(
                "access and refresh signing secrets must be distinct".into(),
            ));
        }

        let access_token_ttl_secs = env_i64("AUTH_ACCESS_TOKEN_TTL_SECS", 900);
        let refresh_token_ttl_secs = env_i64("AUTH_REFRESH_TOKEN_TTL_SECS", 7 * 24 * 60 * 60);
        let verification_token_ttl_secs =
            env_i64("AUTH_VERIFICATION_TOKEN_TTL_SECS", 24 * 60 * 60);
        let reset_token_ttl_secs = env_i64("AUTH_RESET_TOKEN_TTL_SECS", 60 * 60);

        let rate_limit_max_requests = env_u32("AUTH_RATE_LIMIT_MAX_REQUESTS", 10);
        let rate_limit_window_secs = env_u64("AUTH_RATE_LIMIT_WINDOW_SECS", 60);
        // The login surface gets a tighter budget than general endpoints.
        let login_rate_limit_max_requests = env_u32("AUTH_LOGIN_RATE_LIMIT_MAX_REQUESTS", 5);

        let notify_max_attempts = env_u32("AUTH_NOTIFY_MAX_ATTEMPTS", 3);
        let notify_retry_base_secs = env_u64("AUTH_NOTIFY_RETRY_BASE_SECS", 60);

        Ok(Self {
            access_token_secret,
            refresh_token_secret,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            verification_token_ttl_secs,
            reset_token_ttl_secs,
            rate_limit_max_requests,
            rate_limit_window_secs,
            login_rate_limit_max_requests,
            notify_max_attempts,
            notify_retry_base_secs,
        })
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
