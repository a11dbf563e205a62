use std::time::Duration;

use tokio::time::advance;

use super::*;
use crate::NodeId;
use crate::SessionConfig;
use crate::SessionError;
use crate::StatusCode;

fn manager() -> SessionManager {
    SessionManager::new(SessionConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_create_session_grants_clamped_timeout() {
    let manager = manager();

    let created = manager.create_session(1, "client", 60_000.0).unwrap();
    assert_eq!(created.timeout_ms, 60_000);
    assert_eq!(created.session_id.namespace, SESSION_NAMESPACE);
    assert_ne!(created.session_id, created.auth_token);

    assert_eq!(manager.create_session(1, "short", 5.0).unwrap().timeout_ms, 10_000);
    assert_eq!(manager.create_session(1, "long", 1e9).unwrap().timeout_ms, 3_600_000);
    assert_eq!(manager.create_session(1, "default", 0.0).unwrap().timeout_ms, 60_000);
}

#[tokio::test(start_paused = true)]
async fn test_session_limit() {
    let manager = SessionManager::new(SessionConfig {
        max_sessions: 1,
        ..SessionConfig::default()
    });
    manager.create_session(1, "a", 0.0).unwrap();
    let err = manager.create_session(1, "b", 0.0).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BadTooManySessions);
}

#[tokio::test(start_paused = true)]
async fn test_validate_requires_activation_when_asked() {
    let manager = manager();
    let created = manager.create_session(7, "client", 0.0).unwrap();

    assert!(manager.validate(&created.auth_token, 7, SessionRequirement::Bound).is_ok());
    let err = manager
        .validate(&created.auth_token, 7, SessionRequirement::Activated)
        .unwrap_err();
    assert_eq!(err, SessionError::NotActivated(created.session_id.clone()));

    manager.activate_session(&created.auth_token, 7).unwrap();
    let ctx = manager
        .validate(&created.auth_token, 7, SessionRequirement::Activated)
        .unwrap();
    assert_eq!(ctx.session_id, created.session_id);
    assert_eq!(ctx.channel_id, 7);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_token_is_not_found() {
    let manager = manager();
    let err = manager
        .validate(&NodeId::new_guid(1), 1, SessionRequirement::Bound)
        .unwrap_err();
    assert_eq!(err, SessionError::NotFound);
    assert_eq!(err.status_code(), StatusCode::BadSessionIdInvalid);

    assert_eq!(
        manager.activate_session(&NodeId::new_guid(1), 1).unwrap_err(),
        SessionError::NotFound
    );
}

#[tokio::test(start_paused = true)]
async fn test_activate_rebinds_channel_without_duplicating() {
    let manager = manager();
    let created = manager.create_session(1, "client", 0.0).unwrap();
    manager.activate_session(&created.auth_token, 1).unwrap();

    // other channel is rejected until the session is re-activated there
    let err = manager
        .validate(&created.auth_token, 2, SessionRequirement::Activated)
        .unwrap_err();
    assert!(matches!(err, SessionError::ChannelMismatch { .. }));

    manager.activate_session(&created.auth_token, 2).unwrap();
    assert!(manager.validate(&created.auth_token, 2, SessionRequirement::Activated).is_ok());
    assert!(manager.validate(&created.auth_token, 1, SessionRequirement::Activated).is_err());

    assert!(manager.sessions_on_channel(1).is_empty());
    assert_eq!(manager.sessions_on_channel(2), vec![created.session_id.clone()]);
    assert_eq!(manager.info(&created.session_id).unwrap().channel_id, Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_detached_session_needs_reactivation() {
    let manager = manager();
    let created = manager.create_session(1, "client", 0.0).unwrap();
    manager.activate_session(&created.auth_token, 1).unwrap();

    manager.detach_channel(&created.session_id);
    let err = manager
        .validate(&created.auth_token, 1, SessionRequirement::Bound)
        .unwrap_err();
    assert_eq!(err, SessionError::NoChannelBinding(created.session_id.clone()));

    manager.activate_session(&created.auth_token, 3).unwrap();
    assert!(manager.validate(&created.auth_token, 3, SessionRequirement::Activated).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_close_session_is_idempotent_and_cancels() {
    let manager = manager();
    let created = manager.create_session(1, "client", 0.0).unwrap();
    manager.attach_subscription(&created.session_id, 10).unwrap();
    manager.attach_subscription(&created.session_id, 11).unwrap();
    let cancel = manager.cancellation_token(&created.session_id).unwrap();

    let closed = manager.close_session(&created.session_id).unwrap();
    assert_eq!(closed.subscription_ids, vec![10, 11]);
    assert!(cancel.is_cancelled());
    assert!(manager.close_session(&created.session_id).is_none());

    let err = manager
        .validate(&created.auth_token, 1, SessionRequirement::Bound)
        .unwrap_err();
    assert_eq!(err, SessionError::NotFound);
    assert!(manager.attach_subscription(&created.session_id, 12).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_inactivity_expiry_and_touch() {
    let manager = manager();
    let idle = manager.create_session(1, "idle", 60_000.0).unwrap();
    let busy = manager.create_session(1, "busy", 60_000.0).unwrap();

    advance(Duration::from_millis(50_000)).await;
    manager.touch(&busy.session_id);
    advance(Duration::from_millis(11_000)).await;

    assert_eq!(manager.expired_sessions(), vec![idle.session_id.clone()]);

    advance(Duration::from_millis(50_000)).await;
    let mut expired = manager.expired_sessions();
    expired.sort();
    let mut expected = vec![idle.session_id, busy.session_id];
    expected.sort();
    assert_eq!(expired, expected);
}

#[tokio::test(start_paused = true)]
async fn test_validate_counts_as_activity() {
    let manager = manager();
    let created = manager.create_session(1, "client", 10_000.0).unwrap();

    for _ in 0..5 {
        advance(Duration::from_millis(9_000)).await;
        manager
            .validate(&created.auth_token, 1, SessionRequirement::Bound)
            .unwrap();
    }
    assert!(manager.expired_sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_subscription_bookkeeping() {
    let manager = manager();
    let created = manager.create_session(1, "client", 0.0).unwrap();

    manager.attach_subscription(&created.session_id, 3).unwrap();
    manager.attach_subscription(&created.session_id, 1).unwrap();
    assert_eq!(manager.subscription_ids(&created.session_id), vec![1, 3]);

    manager.detach_subscription(&created.session_id, 3);
    assert_eq!(manager.subscription_ids(&created.session_id), vec![1]);
}
