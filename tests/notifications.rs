use std::sync::Arc;

use auth_service::test_support::{RecordingNotifier, test_config};
use auth_service::{
    AuthState, MemoryUserStore, NotificationDispatcher, notify::NotificationKind, UserStore,
};
use chrono::Utc;

fn state() -> (AuthState, Arc<MemoryUserStore>) {
    let store = Arc::new(MemoryUserStore::new());
    let state = AuthState::new(test_config(), store.clone()).expect("auth state");
    (state, store)
}

#[tokio::test]
async fn lifecycle_events_enqueue_their_notices() {
    let (state, store) = state();
    let notifier = Arc::new(RecordingNotifier::new());
    let dispatcher = NotificationDispatcher::new(state.queue.clone(), notifier.clone());

    state
        .sessions
        .register("a@x.com", "Passw0rd", None)
        .await
        .expect("register");
    assert_eq!(state.queue.depth().await, 1);

    let verification_token = store
        .find_by_email("a@x.com")
        .await
        .expect("lookup")
        .expect("user exists")
        .verification_token
        .expect("verification token issued");

    state
        .sessions
        .verify_email(&verification_token)
        .await
        .expect("verify");
    state
        .sessions
        .forgot_password("a@x.com")
        .await
        .expect("forgot password");

    dispatcher.drain_once(Utc::now()).await;
    assert_eq!(state.queue.depth().await, 0);

    let delivered = notifier.delivered().await;
    assert_eq!(delivered.len(), 3);

    assert_eq!(delivered[0].kind, NotificationKind::Verification);
    assert_eq!(delivered[0].recipient, "a@x.com");
    // The notice carries the same token the store holds.
    assert_eq!(
        delivered[0].payload["token"].as_str(),
        Some(verification_token.as_str())
    );

    assert_eq!(delivered[1].kind, NotificationKind::Welcome);

    assert_eq!(delivered[2].kind, NotificationKind::PasswordReset);
    let reset_token = store
        .find_by_email("a@x.com")
        .await
        .expect("lookup")
        .expect("user exists")
        .reset_token
        .expect("reset token issued");
    assert_eq!(
        delivered[2].payload["token"].as_str(),
        Some(reset_token.as_str())
    );
}

#[tokio::test]
async fn delivery_problems_never_reach_the_triggering_operation() {
    let (state, _store) = state();

    // No dispatcher is running at all; registration still succeeds and the
    // job just waits in the queue.
    state
        .sessions
        .register("a@x.com", "Passw0rd", None)
        .await
        .expect("register");
    assert_eq!(state.queue.depth().await, 1);
}
