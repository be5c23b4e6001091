use std::sync::Arc;

use auth_service::test_support::test_config;
use auth_service::{AuthError, AuthState, MemoryUserStore, UserStore};

fn state() -> (AuthState, Arc<MemoryUserStore>) {
    let store = Arc::new(MemoryUserStore::new());
    let state = AuthState::new(test_config(), store.clone()).expect("auth state");
    (state, store)
}

/// Register, verify, and return an active user's email.
async fn active_user(state: &AuthState, store: &MemoryUserStore, email: &str) -> String {
    state
        .sessions
        .register(email, "Passw0rd", None)
        .await
        .expect("register");
    let token = store
        .find_by_email(email)
        .await
        .expect("lookup")
        .expect("user exists")
        .verification_token
        .expect("verification token issued");
    state
        .sessions
        .verify_email(&token)
        .await
        .expect("verify email");
    email.to_string()
}

#[tokio::test]
async fn register_verify_login_refresh_scenario() {
    let (state, store) = state();

    state
        .sessions
        .register("a@x.com", "Passw0rd", None)
        .await
        .expect("register");

    // Pending accounts can not log in yet.
    let denied = state.sessions.login("a@x.com", "Passw0rd").await;
    assert!(matches!(denied, Err(AuthError::AccountNotVerified)));

    let token = store
        .find_by_email("a@x.com")
        .await
        .expect("lookup")
        .expect("user exists")
        .verification_token
        .expect("verification token issued");
    state
        .sessions
        .verify_email(&token)
        .await
        .expect("verify email");

    let first = state
        .sessions
        .login("a@x.com", "Passw0rd")
        .await
        .expect("login after verification");

    let rotated = state
        .sessions
        .refresh(&first.refresh_token)
        .await
        .expect("first refresh");

    // The new token succeeds exactly once.
    state
        .sessions
        .refresh(&rotated.refresh_token)
        .await
        .expect("rotated token works");
    assert!(
        state
            .sessions
            .refresh(&rotated.refresh_token)
            .await
            .is_err()
    );

    // The original token was rotated away long ago.
    assert!(state.sessions.refresh(&first.refresh_token).await.is_err());
}

#[tokio::test]
async fn replaying_a_rotated_token_revokes_every_session() {
    let (state, store) = state();
    let email = active_user(&state, &store, "a@x.com").await;

    let first = state.sessions.login(&email, "Passw0rd").await.expect("login");
    let second = state.sessions.login(&email, "Passw0rd").await.expect("second login");

    let rotated = state
        .sessions
        .refresh(&first.refresh_token)
        .await
        .expect("refresh");

    // Replay of the consumed token is a theft signal.
    let replay = state.sessions.refresh(&first.refresh_token).await;
    assert!(matches!(replay, Err(AuthError::InvalidToken)));

    let user = store
        .find_by_email(&email)
        .await
        .expect("lookup")
        .expect("user exists");
    assert!(user.refresh_token_digests.is_empty());

    // Every other session dies with it, including the untouched second
    // login and the token minted by the successful rotation.
    assert!(state.sessions.refresh(&second.refresh_token).await.is_err());
    assert!(state.sessions.refresh(&rotated.refresh_token).await.is_err());
}

#[tokio::test]
async fn concurrent_refreshes_rotate_exactly_once() {
    let (state, store) = state();
    let email = active_user(&state, &store, "a@x.com").await;
    let tokens = state.sessions.login(&email, "Passw0rd").await.expect("login");

    let (left, right) = tokio::join!(
        state.sessions.refresh(&tokens.refresh_token),
        state.sessions.refresh(&tokens.refresh_token),
    );

    let successes = [&left, &right].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent refresh may rotate");

    // The loser observed reuse and revoked everything.
    let user = store
        .find_by_email(&email)
        .await
        .expect("lookup")
        .expect("user exists");
    assert!(user.refresh_token_digests.is_empty());
}

#[tokio::test]
async fn blocked_accounts_are_rejected_even_with_valid_tokens() {
    let (state, store) = state();
    let email = active_user(&state, &store, "a@x.com").await;
    let tokens = state.sessions.login(&email, "Passw0rd").await.expect("login");

    let user = store
        .find_by_email(&email)
        .await
        .expect("lookup")
        .expect("user exists");
    store
        .set_blocked(user.id, uuid::Uuid::new_v4(), Some("abuse".into()))
        .await
        .expect("block");

    let header = format!("Bearer {}", tokens.access_token);
    let gate_result = state.gate.authenticate(Some(&header)).await;
    assert!(matches!(
        gate_result,
        Err(AuthError::AccountBlocked { .. })
    ));

    let refresh_result = state.sessions.refresh(&tokens.refresh_token).await;
    assert!(matches!(
        refresh_result,
        Err(AuthError::AccountBlocked { .. })
    ));

    let login_result = state.sessions.login(&email, "Passw0rd").await;
    assert!(matches!(login_result, Err(AuthError::AccountBlocked { .. })));
}

#[tokio::test]
async fn password_reset_invalidates_all_refresh_tokens() {
    let (state, store) = state();
    let email = active_user(&state, &store, "a@x.com").await;
    let tokens = state.sessions.login(&email, "Passw0rd").await.expect("login");

    state
        .sessions
        .forgot_password(&email)
        .await
        .expect("forgot password");
    let reset_token = store
        .find_by_email(&email)
        .await
        .expect("lookup")
        .expect("user exists")
        .reset_token
        .expect("reset token issued");

    state
        .sessions
        .reset_password(&reset_token, "NewPassw0rd1")
        .await
        .expect("reset password");

    // Stale refresh tokens issued before the reset must fail afterward.
    assert!(state.sessions.refresh(&tokens.refresh_token).await.is_err());

    // Old password is dead, new one works.
    assert!(matches!(
        state.sessions.login(&email, "Passw0rd").await,
        Err(AuthError::InvalidCredentials)
    ));
    state
        .sessions
        .login(&email, "NewPassw0rd1")
        .await
        .expect("login with new password");

    // Reset tokens are single-use.
    assert!(matches!(
        state
            .sessions
            .reset_password(&reset_token, "AnotherPassw0rd1")
            .await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn verification_tokens_are_single_use() {
    let (state, store) = state();
    state
        .sessions
        .register("a@x.com", "Passw0rd", None)
        .await
        .expect("register");

    let token = store
        .find_by_email("a@x.com")
        .await
        .expect("lookup")
        .expect("user exists")
        .verification_token
        .expect("verification token issued");

    state.sessions.verify_email(&token).await.expect("first use");
    assert!(matches!(
        state.sessions.verify_email(&token).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn logout_is_idempotent_and_silent_on_garbage() {
    let (state, store) = state();
    let email = active_user(&state, &store, "a@x.com").await;
    let tokens = state.sessions.login(&email, "Passw0rd").await.expect("login");

    // Garbage never errors and never leaks whether a session existed.
    state.sessions.logout("not-a-token").await.expect("garbage logout");

    state
        .sessions
        .logout(&tokens.refresh_token)
        .await
        .expect("logout");
    let user = store
        .find_by_email(&email)
        .await
        .expect("lookup")
        .expect("user exists");
    assert!(user.refresh_token_digests.is_empty());

    // Logging out the same token again is a no-op success.
    state
        .sessions
        .logout(&tokens.refresh_token)
        .await
        .expect("repeat logout");
}

#[tokio::test]
async fn access_tokens_are_not_accepted_as_refresh_tokens() {
    let (state, store) = state();
    let email = active_user(&state, &store, "a@x.com").await;
    let tokens = state.sessions.login(&email, "Passw0rd").await.expect("login");

    assert!(matches!(
        state.sessions.refresh(&tokens.access_token).await,
        Err(AuthError::InvalidToken)
    ));

    // And the refresh token can not pass the access-token gate.
    let header = format!("Bearer {}", tokens.refresh_token);
    assert!(matches!(
        state.gate.authenticate(Some(&header)).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let (state, _store) = state();
    state
        .sessions
        .register("a@x.com", "Passw0rd", None)
        .await
        .expect("register");
    assert!(matches!(
        state.sessions.register("A@X.com", "Passw0rd", None).await,
        Err(AuthError::EmailTaken)
    ));
}

#[tokio::test]
async fn weak_passwords_are_rejected_before_touching_the_store() {
    let (state, store) = state();
    assert!(matches!(
        state.sessions.register("a@x.com", "weak", None).await,
        Err(AuthError::Validation(_))
    ));
    assert!(
        store
            .find_by_email("a@x.com")
            .await
            .expect("lookup")
            .is_none()
    );
}

#[tokio::test]
async fn forgot_password_is_uniform_for_unknown_emails() {
    let (state, store) = state();
    let email = active_user(&state, &store, "a@x.com").await;

    // Both outcomes are identical successes.
    state
        .sessions
        .forgot_password(&email)
        .await
        .expect("known email");
    state
        .sessions
        .forgot_password("stranger@x.com")
        .await
        .expect("unknown email");
}

#[tokio::test]
async fn login_surface_rate_limiting() {
    let (state, store) = state();
    let email = active_user(&state, &store, "a@x.com").await;

    // Strict limiter admits exactly the configured budget per window.
    for _ in 0..state.config.login_rate_limit_max_requests {
        state
            .login_limiter
            .enforce("203.0.113.9")
            .expect("within budget");
        state
            .sessions
            .login(&email, "Passw0rd")
            .await
            .expect("login");
    }

    match state.login_limiter.enforce("203.0.113.9") {
        Err(AuthError::RateLimited { retry_after_secs }) => {
            assert!(retry_after_secs <= state.config.rate_limit_window_secs);
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }

    // Other callers are unaffected.
    state
        .login_limiter
        .enforce("198.51.100.7")
        .expect("distinct identifier admitted");
}
