use std::time::Duration;

use tokio::time::advance;

use super::*;
use crate::ChannelConfig;
use crate::ChannelError;
use crate::ErrorKind;
use crate::MessageSecurityMode;
use crate::StatusCode;
use crate::SECURITY_POLICY_NONE_URI;

fn manager() -> SecureChannelManager {
    SecureChannelManager::new(ChannelConfig::default())
}

fn open(
    manager: &SecureChannelManager,
    lifetime_ms: u32,
) -> crate::ChannelSecurityToken {
    manager
        .open_channel(SECURITY_POLICY_NONE_URI, MessageSecurityMode::None, lifetime_ms)
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_open_channel_issues_clamped_token() {
    let manager = manager();
    let token = open(&manager, 1);

    assert_eq!(token.revised_lifetime, 10_000);
    assert!(manager.validate(token.channel_id, token.token_id).is_ok());

    let other = open(&manager, 0);
    assert_ne!(other.channel_id, token.channel_id);
    assert_eq!(other.revised_lifetime, 600_000);
    assert_eq!(manager.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_policy_is_rejected() {
    let manager = manager();
    let err = manager
        .open_channel(
            "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            MessageSecurityMode::SignAndEncrypt,
            0,
        )
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BadSecurityPolicyRejected);

    let err = manager
        .open_channel(SECURITY_POLICY_NONE_URI, MessageSecurityMode::Sign, 0)
        .unwrap_err();
    assert!(matches!(err, ChannelError::SecurityPolicyRejected(_)));
    assert!(manager.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_validate_unknown_channel_and_token() {
    let manager = manager();
    let token = open(&manager, 0);

    let err = manager.validate(token.channel_id + 100, token.token_id).unwrap_err();
    assert_eq!(err, ChannelError::Invalid(token.channel_id + 100));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = manager.validate(token.channel_id, token.token_id + 100).unwrap_err();
    assert!(matches!(err, ChannelError::TokenUnknown { .. }));
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[tokio::test(start_paused = true)]
async fn test_expired_token_fails_closed_and_closes_channel() {
    let manager = manager();
    let token = open(&manager, 10_000);
    let cancel = manager.cancellation_token(token.channel_id).unwrap();

    advance(Duration::from_millis(9_999)).await;
    assert!(manager.validate(token.channel_id, token.token_id).is_ok());

    advance(Duration::from_millis(1)).await;
    let err = manager.validate(token.channel_id, token.token_id).unwrap_err();
    assert!(matches!(err, ChannelError::Expired { .. }));
    assert!(!manager.is_open(token.channel_id));
    assert!(cancel.is_cancelled());

    // closed channel is now simply unknown
    let err = manager.validate(token.channel_id, token.token_id).unwrap_err();
    assert_eq!(err, ChannelError::Invalid(token.channel_id));
}

#[tokio::test(start_paused = true)]
async fn test_renew_keeps_previous_token_until_its_expiry() {
    let manager = manager();
    let first = open(&manager, 10_000);

    advance(Duration::from_millis(8_000)).await;
    let second = manager.renew_token(first.channel_id, first.token_id, 30_000).unwrap();
    assert_eq!(second.channel_id, first.channel_id);
    assert_ne!(second.token_id, first.token_id);
    assert_eq!(second.revised_lifetime, 30_000);

    assert!(manager.validate(first.channel_id, first.token_id).is_ok());
    assert!(manager.validate(first.channel_id, second.token_id).is_ok());

    advance(Duration::from_millis(2_000)).await;
    // old token expired, channel stays open on the new one
    let err = manager.validate(first.channel_id, first.token_id).unwrap_err();
    assert!(matches!(err, ChannelError::Expired { .. }));
    assert!(manager.is_open(first.channel_id));
    assert!(manager.validate(first.channel_id, second.token_id).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_renew_with_stale_token_is_rejected() {
    let manager = manager();
    let first = open(&manager, 0);
    let second = manager.renew_token(first.channel_id, first.token_id, 0).unwrap();

    let err = manager.renew_token(first.channel_id, first.token_id, 0).unwrap_err();
    assert!(matches!(err, ChannelError::TokenUnknown { .. }));
    assert!(manager.renew_token(first.channel_id, second.token_id, 0).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_renew_after_expiry_fails_and_closes() {
    let manager = manager();
    let token = open(&manager, 10_000);

    advance(Duration::from_millis(10_001)).await;
    let err = manager.renew_token(token.channel_id, token.token_id, 0).unwrap_err();
    assert!(matches!(err, ChannelError::Expired { .. }));
    assert!(!manager.is_open(token.channel_id));
}

#[tokio::test(start_paused = true)]
async fn test_close_channel_is_idempotent() {
    let manager = manager();
    let token = open(&manager, 0);
    let cancel = manager.cancellation_token(token.channel_id).unwrap();

    assert!(manager.close_channel(token.channel_id));
    assert!(cancel.is_cancelled());
    assert!(!manager.close_channel(token.channel_id));
    assert!(manager.cancellation_token(token.channel_id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_expired_channels_lists_only_expired() {
    let manager = manager();
    let short = open(&manager, 10_000);
    let long = open(&manager, 60_000);

    advance(Duration::from_millis(20_000)).await;
    assert_eq!(manager.expired_channels(), vec![short.channel_id]);
    assert!(manager.is_open(long.channel_id));
}

#[test]
fn test_security_policy_from_uri() {
    assert_eq!(SecurityPolicy::from_uri(SECURITY_POLICY_NONE_URI).unwrap(), SecurityPolicy::None);
    assert_eq!(SecurityPolicy::from_uri("").unwrap(), SecurityPolicy::None);
    assert!(SecurityPolicy::from_uri("urn:unknown").is_err());
    assert_eq!(SecurityPolicy::None.uri(), SECURITY_POLICY_NONE_URI);
}
