use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Fixed-window request counter keyed by caller identifier. Advisory
/// backpressure for the login surface: an occasional extra request at a
/// window boundary is acceptable, wrongly blocking is not. State lives in a
/// concurrent map whose per-entry locks serialize updates to a single
/// identifier.
pub struct RateLimiter {
    windows: DashMap<String, WindowEntry>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window: Duration::seconds(window_secs as i64),
        }
    }

    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Utc::now())
    }

    /// Check and reject in one step, surfacing the retry-after hint.
    pub fn enforce(&self, identifier: &str) -> AuthResult<RateLimitDecision> {
        let now = Utc::now();
        let decision = self.check_at(identifier, now);
        if !decision.allowed {
            log::warn!("rate limit exceeded for {identifier}");
            let retry_after_secs = (decision.reset_at - now).num_seconds().max(0) as u64;
            return Err(AuthError::RateLimited { retry_after_secs });
        }
        Ok(decision)
    }

    /// Remove windows whose reset time has passed, bounding memory. Intended
    /// to run periodically from a background task.
    pub fn sweep(&self) {
        self.sweep_at(Utc::now());
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.windows.len()
    }

    fn check_at(&self, identifier: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let mut entry = self
            .windows
            .entry(identifier.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                reset_at: now + self.window,
            });

        if entry.reset_at < now {
            entry.count = 0;
            entry.reset_at = now + self.window;
        }

        if entry.count >= self.max_requests {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: entry.reset_at,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: self.max_requests - entry.count,
            reset_at: entry.reset_at,
        }
    }

    fn sweep_at(&self, now: DateTime<Utc>) {
        self.windows.retain(|_, entry| entry.reset_at >= now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_exactly_max_requests_per_window() {
        let limiter = RateLimiter::new(3, 60);
        let now = Utc::now();

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_at("10.0.0.1", now);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.check_at("10.0.0.1", now);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
    }

    #[test]
    fn window_expiry_resets_the_counter() {
        let limiter = RateLimiter::new(2, 60);
        let now = Utc::now();

        limiter.check_at("10.0.0.1", now);
        limiter.check_at("10.0.0.1", now);
        assert!(!limiter.check_at("10.0.0.1", now).allowed);

        let later = now + Duration::seconds(61);
        let decision = limiter.check_at("10.0.0.1", later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn identifiers_are_counted_independently() {
        let limiter = RateLimiter::new(1, 60);
        let now = Utc::now();

        assert!(limiter.check_at("10.0.0.1", now).allowed);
        assert!(!limiter.check_at("10.0.0.1", now).allowed);
        assert!(limiter.check_at("10.0.0.2", now).allowed);
    }

    #[test]
    fn sweep_drops_expired_windows_only() {
        let limiter = RateLimiter::new(5, 60);
        let now = Utc::now();

        limiter.check_at("stale", now);
        limiter.check_at("fresh", now + Duration::seconds(30));
        assert_eq!(limiter.tracked_identifiers(), 2);

        limiter.sweep_at(now + Duration::seconds(61));
        assert_eq!(limiter.tracked_identifiers(), 1);
    }

    #[test]
    fn enforce_surfaces_retry_after() {
        let limiter = RateLimiter::new(1, 60);
        limiter.enforce("10.0.0.1").expect("first request admitted");
        match limiter.enforce("10.0.0.1") {
            Err(AuthError::RateLimited { retry_after_secs }) => {
                assert!(retry_after_secs <= 60);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }
}
