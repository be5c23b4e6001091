//! Session-lifecycle and token-rotation engine for a multi-role user base:
//! token issuance and verification, refresh-token rotation with reuse
//! detection, account-status and role gating, login-surface rate limiting,
//! and best-effort outbound notifications.
//!
//! HTTP routing, persistence, and mail delivery are external collaborators;
//! the store and delivery contracts live in [`store`] and [`notify`].

use std::sync::{Arc, Once};

use env_logger::Env;

pub mod config;
pub mod credentials;
pub mod error;
pub mod guard;
pub mod jwt;
pub mod notify;
pub mod rate_limit;
pub mod roles;
pub mod session;
pub mod store;

pub use config::Config;
pub use credentials::PasswordService;
pub use error::{AuthError, AuthResult};
pub use guard::{AuthGate, AuthUser};
pub use jwt::{TokenKind, TokenService};
pub use notify::{NotificationDispatcher, NotificationQueue, Notifier};
pub use rate_limit::RateLimiter;
pub use roles::{AccountStatus, Role};
pub use session::{SessionService, SessionTokens};
pub use store::{MemoryUserStore, User, UserStore};

static LOGGER: Once = Once::new();

pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    });
}

/// Composition root: one instance per process, constructed at startup with
/// an injected store. No component keeps ambient global state, so multiple
/// instances can coexist (tests, multi-tenant embeddings).
pub struct AuthState {
    pub config: Config,
    pub sessions: Arc<SessionService>,
    pub gate: Arc<AuthGate>,
    pub limiter: Arc<RateLimiter>,
    pub login_limiter: Arc<RateLimiter>,
    pub queue: Arc<NotificationQueue>,
}

impl AuthState {
    pub fn new(config: Config, user_store: Arc<dyn UserStore>) -> AuthResult<Self> {
        let passwords = PasswordService::new()?;
        let tokens = Arc::new(TokenService::from_config(&config));
        let queue = Arc::new(NotificationQueue::new(
            config.notify_max_attempts,
            config.notify_retry_base_secs,
        ));

        let sessions = Arc::new(SessionService::new(
            user_store.clone(),
            passwords,
            tokens.clone(),
            queue.clone(),
            config.clone(),
        ));
        let gate = Arc::new(AuthGate::new(user_store, tokens));
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window_secs,
        ));
        let login_limiter = Arc::new(RateLimiter::new(
            config.login_rate_limit_max_requests,
            config.rate_limit_window_secs,
        ));

        Ok(Self {
            config,
            sessions,
            gate,
            limiter,
            login_limiter,
            queue,
        })
    }
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    //! Doubles and fixtures shared by unit and integration tests.

    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::config::Config;
    use crate::error::{AuthError, AuthResult};
    use crate::notify::{NotificationJob, Notifier};

    pub fn test_config() -> Config {
        Config {
            access_token_secret: "access-secret-for-tests".into(),
            refresh_token_secret: "refresh-secret-for-tests".into(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604800,
            verification_token_ttl_secs: 86400,
            reset_token_ttl_secs: 3600,
            rate_limit_max_requests: 10,
            rate_limit_window_secs: 60,
            login_rate_limit_max_requests: 5,
            notify_max_attempts: 3,
            notify_retry_base_secs: 60,
        }
    }

    /// Records every delivered job for assertions.
    pub struct RecordingNotifier {
        jobs: Mutex<Vec<NotificationJob>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
            }
        }

        pub async fn delivered(&self) -> Vec<NotificationJob> {
            self.jobs.lock().await.clone()
        }
    }

    impl Default for RecordingNotifier {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, job: &NotificationJob) -> AuthResult<()> {
            self.jobs.lock().await.push(job.clone());
            Ok(())
        }
    }

    /// Fails every delivery, counting attempts.
    pub struct FailingNotifier {
        attempts: AtomicU32,
    }

    impl FailingNotifier {
        pub fn new() -> Self {
            Self {
                attempts: AtomicU32::new(0),
            }
        }

        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl Default for FailingNotifier {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn deliver(&self, _job: &NotificationJob) -> AuthResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(AuthError::Notify("simulated delivery failure".into()))
        }
    }
}
