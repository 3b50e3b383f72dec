#![allow(clippy::unwrap_used)]
// Integration tests for `SessionManager` token lifecycle.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::TimeDelta;
use secrecy::{ExposeSecret, SecretString};

use common::{FakeAuthenticator, FakeClock, Harness, PASSWORD, USERNAME};
use mysa_core::{CoreError, EventBus, Session, SessionManager};

fn password(p: &str) -> SecretString {
    SecretString::from(p.to_owned())
}

fn jwt_expiring_at(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
    let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
    format!("{header}.{claims}.sig")
}

#[tokio::test]
async fn test_login_emits_none_then_session() {
    let harness = Harness::new();
    let mut changes = harness.events.session_changed();

    harness.session.login(USERNAME, &password(PASSWORD)).await.unwrap();

    assert_eq!(changes.recv().await.unwrap(), None);
    let session = changes.recv().await.unwrap().unwrap();
    assert_eq!(session.username, USERNAME);
    assert_eq!(session.id_token, "id-1");
    assert_eq!(session.access_token, "access-1");
    assert_eq!(session.refresh_token, "refresh-token");
    assert!(harness.session.is_authenticated());
    assert_eq!(harness.session.current_snapshot(), Some(session));
}

#[tokio::test]
async fn test_failed_login_leaves_session_unset() {
    let harness = Harness::logged_in().await;

    let err = harness
        .session
        .login(USERNAME, &password("wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationFailed { .. }), "got {err:?}");
    assert!(!harness.session.is_authenticated());
    assert_eq!(harness.session.current_snapshot(), None);
}

#[tokio::test]
async fn test_fresh_token_set_without_session_is_unauthenticated() {
    let harness = Harness::new();
    let err = harness.session.fresh_token_set().await.unwrap_err();
    assert!(err.is_unauthenticated(), "got {err:?}");
}

#[tokio::test]
async fn test_valid_tokens_are_returned_untouched() {
    let harness = Harness::logged_in().await;
    let mut changes = harness.events.session_changed();

    harness.clock.advance(TimeDelta::minutes(59));
    let tokens = harness.session.fresh_token_set().await.unwrap();

    assert_eq!(tokens.id_token.expose_secret(), "id-1");
    assert_eq!(harness.auth.refreshes.load(Ordering::SeqCst), 0);
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_expired_tokens_are_refreshed_and_announced() {
    let harness = Harness::logged_in().await;
    let mut changes = harness.events.session_changed();

    harness.clock.advance(TimeDelta::hours(1));
    let tokens = harness.session.fresh_token_set().await.unwrap();

    assert_eq!(tokens.id_token.expose_secret(), "id-2");
    assert_eq!(tokens.refresh_token.expose_secret(), "refresh-token");
    assert_eq!(harness.auth.refreshes.load(Ordering::SeqCst), 1);

    let announced = changes.recv().await.unwrap().unwrap();
    assert_eq!(announced.id_token, "id-2");
    assert_eq!(announced.username, USERNAME);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let harness = Harness::logged_in().await;
    harness.clock.advance(TimeDelta::hours(2));

    let session = &harness.session;
    let results = futures_util::future::join_all((0..8).map(|_| session.fresh_token_set())).await;

    assert_eq!(harness.auth.refreshes.load(Ordering::SeqCst), 1);
    for tokens in results {
        assert_eq!(tokens.unwrap().id_token.expose_secret(), "id-2");
    }
}

#[tokio::test]
async fn test_failed_refresh_keeps_state() {
    let harness = Harness::logged_in().await;
    harness.auth.fail_refresh.store(true, Ordering::SeqCst);
    harness.clock.advance(TimeDelta::hours(2));

    let err = harness.session.fresh_token_set().await.unwrap_err();

    assert!(err.is_unauthenticated(), "got {err:?}");
    assert!(harness.session.is_authenticated());
    assert_eq!(harness.session.username().as_deref(), Some(USERNAME));
}

#[tokio::test]
async fn test_clear_during_refresh_is_not_undone() {
    let harness = Harness::logged_in().await;
    let mut changes = harness.events.session_changed();
    harness.clock.advance(TimeDelta::hours(2));

    let clear = async {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        harness.session.clear();
    };
    let (result, ()) = tokio::join!(harness.session.fresh_token_set(), clear);

    assert!(result.unwrap_err().is_unauthenticated());
    assert_eq!(harness.auth.refreshes.load(Ordering::SeqCst), 1);
    assert!(!harness.session.is_authenticated());
    assert_eq!(changes.recv().await.unwrap(), None);
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_restore_during_refresh_wins() {
    let harness = Harness::logged_in().await;
    harness.clock.advance(TimeDelta::hours(2));
    let exp = clock_now_secs(&harness.clock) + 600;

    let restore = async {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        harness.session.restore(Session {
            username: "other@example.com".into(),
            id_token: jwt_expiring_at(exp),
            access_token: jwt_expiring_at(exp),
            refresh_token: "restored-refresh".into(),
        });
    };
    let (result, ()) = tokio::join!(harness.session.fresh_token_set(), restore);

    assert!(result.is_err());
    let current = harness.session.current_snapshot().unwrap();
    assert_eq!(current.username, "other@example.com");
    assert_eq!(current.refresh_token, "restored-refresh");
}

#[tokio::test]
async fn test_restored_session_uses_jwt_expiry() {
    let clock = FakeClock::new();
    let auth = FakeAuthenticator::new(Arc::clone(&clock));
    let session = SessionManager::new(auth.clone(), EventBus::default(), clock.clone());

    let exp = clock_now_secs(&clock) + 600;
    session.restore(Session {
        username: USERNAME.into(),
        id_token: jwt_expiring_at(exp),
        access_token: jwt_expiring_at(exp),
        refresh_token: "persisted-refresh".into(),
    });

    session.fresh_token_set().await.unwrap();
    assert_eq!(auth.refreshes.load(Ordering::SeqCst), 0);

    clock.advance(TimeDelta::minutes(11));
    let tokens = session.fresh_token_set().await.unwrap();
    assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(tokens.refresh_token.expose_secret(), "persisted-refresh");
}

#[tokio::test]
async fn test_restored_opaque_tokens_refresh_on_first_use() {
    let harness = Harness::new();
    harness.session.restore(Session {
        username: USERNAME.into(),
        id_token: "not-a-jwt".into(),
        access_token: "not-a-jwt".into(),
        refresh_token: "r".into(),
    });

    harness.session.fresh_token_set().await.unwrap();
    assert_eq!(harness.auth.refreshes.load(Ordering::SeqCst), 1);
}

fn clock_now_secs(clock: &FakeClock) -> i64 {
    use mysa_core::Clock;
    clock.now().timestamp()
}
