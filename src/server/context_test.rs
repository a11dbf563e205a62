use std::sync::Arc;
use std::time::Duration;

use tokio::time::advance;

use super::*;
use crate::well_known;
use crate::AccessLevel;
use crate::AddressSpace;
use crate::MessageSecurityMode;
use crate::MonitoredItemCreateRequest;
use crate::NodeId;
use crate::ReadValueId;
use crate::RequestedParameters;
use crate::ServerConfig;
use crate::StatusCode;
use crate::VariantType;
use crate::SECURITY_POLICY_NONE_URI;

fn context(config: ServerConfig) -> ServerContext {
    ServerContext::new(config, Arc::new(AddressSpace::with_standard_folders()))
}

fn open_channel(
    ctx: &ServerContext,
    lifetime_ms: u32,
) -> u32 {
    ctx.channels
        .open_channel(SECURITY_POLICY_NONE_URI, MessageSecurityMode::None, lifetime_ms)
        .unwrap()
        .channel_id
}

/// Active session on `channel_id` owning one subscription.
fn session_with_subscription(
    ctx: &ServerContext,
    channel_id: u32,
    timeout_ms: f64,
) -> (NodeId, NodeId, u32) {
    let created = ctx.sessions.create_session(channel_id, "test", timeout_ms).unwrap();
    ctx.sessions.activate_session(&created.auth_token, channel_id).unwrap();
    let (subscription_id, _) = ctx
        .subscriptions
        .create_subscription(
            &created.session_id,
            RequestedParameters {
                publishing_interval_ms: 1000.0,
                lifetime_count: 3000,
                max_keep_alive_count: 1000,
                max_notifications_per_publish: 0,
            },
            true,
            0,
        )
        .unwrap();
    ctx.sessions
        .attach_subscription(&created.session_id, subscription_id)
        .unwrap();
    (created.session_id, created.auth_token, subscription_id)
}

#[tokio::test(start_paused = true)]
async fn test_channel_close_cascades_to_sessions_and_subscriptions() {
    let ctx = context(ServerConfig::default());
    let channel_id = open_channel(&ctx, 0);
    let (session_id, _, subscription_id) = session_with_subscription(&ctx, channel_id, 0.0);

    assert!(ctx.close_channel(channel_id));
    assert!(!ctx.channels.is_open(channel_id));
    assert!(ctx.sessions.info(&session_id).is_none());
    assert!(ctx.subscriptions.session_of(subscription_id).is_none());
    assert!(ctx.subscriptions.is_empty());

    // idempotent
    assert!(!ctx.close_channel(channel_id));
}

#[tokio::test(start_paused = true)]
async fn test_channel_close_can_detach_sessions() {
    let mut config = ServerConfig::default();
    config.channel.close_sessions_on_channel_close = false;
    let ctx = context(config);

    let first = open_channel(&ctx, 0);
    let (session_id, auth_token, subscription_id) = session_with_subscription(&ctx, first, 0.0);
    let cancel = ctx.channels.cancellation_token(first).unwrap();

    ctx.close_channel(first);
    assert!(cancel.is_cancelled());
    let info = ctx.sessions.info(&session_id).unwrap();
    assert_eq!(info.channel_id, None);
    assert_eq!(ctx.subscriptions.session_of(subscription_id), Some(session_id.clone()));

    // the client reconnects and re-binds the session
    let second = open_channel(&ctx, 0);
    ctx.sessions.activate_session(&auth_token, second).unwrap();
    assert_eq!(ctx.sessions.info(&session_id).unwrap().channel_id, Some(second));
}

#[tokio::test(start_paused = true)]
async fn test_close_session_deletes_its_subscriptions() {
    let ctx = context(ServerConfig::default());
    let channel_id = open_channel(&ctx, 0);
    let (session_id, _, subscription_id) = session_with_subscription(&ctx, channel_id, 0.0);
    let (other_session, _, other_subscription) = session_with_subscription(&ctx, channel_id, 0.0);

    assert!(ctx.close_session(&session_id));
    assert!(!ctx.close_session(&session_id));
    assert!(ctx.subscriptions.session_of(subscription_id).is_none());

    // siblings on the same channel are untouched
    assert!(ctx.channels.is_open(channel_id));
    assert_eq!(ctx.subscriptions.session_of(other_subscription), Some(other_session));
}

#[tokio::test(start_paused = true)]
async fn test_delete_subscription_checks_ownership() {
    let ctx = context(ServerConfig::default());
    let channel_id = open_channel(&ctx, 0);
    let (owner, _, subscription_id) = session_with_subscription(&ctx, channel_id, 0.0);
    let (intruder, _, _) = session_with_subscription(&ctx, channel_id, 0.0);

    assert_eq!(
        ctx.delete_subscription(&intruder, subscription_id),
        StatusCode::BadSubscriptionIdInvalid
    );
    assert_eq!(ctx.delete_subscription(&owner, subscription_id), StatusCode::Good);
    assert!(ctx.sessions.subscription_ids(&owner).is_empty());
    assert_eq!(
        ctx.delete_subscription(&owner, subscription_id),
        StatusCode::BadSubscriptionIdInvalid
    );
}

#[tokio::test(start_paused = true)]
async fn test_session_sweep_closes_idle_sessions() {
    let ctx = context(ServerConfig::default());
    let channel_id = open_channel(&ctx, 3_600_000);
    let (idle, _, subscription_id) = session_with_subscription(&ctx, channel_id, 10_000.0);
    let (busy, _, _) = session_with_subscription(&ctx, channel_id, 10_000.0);

    advance(Duration::from_millis(6_000)).await;
    ctx.sessions.touch(&busy);
    assert_eq!(ctx.sweep_sessions(), 0);

    advance(Duration::from_millis(5_000)).await;
    assert_eq!(ctx.sweep_sessions(), 1);
    assert!(ctx.sessions.info(&idle).is_none());
    assert!(ctx.subscriptions.session_of(subscription_id).is_none());
    assert!(ctx.sessions.info(&busy).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_sixty_second_session_closes_after_sixty_one_idle_seconds() {
    let space = Arc::new(AddressSpace::with_standard_folders());
    let level = NodeId::numeric(2, 1000);
    space
        .add_variable(
            &well_known::objects_folder(),
            level.clone(),
            "Level",
            VariantType::Double,
            AccessLevel::read_write(),
        )
        .unwrap();
    let ctx = ServerContext::new(ServerConfig::default(), space);
    let channel_id = open_channel(&ctx, 3_600_000);
    let (session_id, _, subscription_id) = session_with_subscription(&ctx, channel_id, 60_000.0);
    assert_eq!(ctx.sessions.info(&session_id).unwrap().timeout_ms, 60_000);
    let items = ctx
        .subscriptions
        .create_monitored_items(
            &session_id,
            subscription_id,
            &[MonitoredItemCreateRequest {
                item_to_monitor: ReadValueId::value_of(level),
                client_handle: 1,
                sampling_interval: 500.0,
                queue_size: 1,
            }],
        )
        .unwrap();
    assert_eq!(items[0].status_code, StatusCode::Good);
    assert_eq!(ctx.subscriptions.sampling_intervals(), vec![500]);

    advance(Duration::from_millis(59_000)).await;
    assert_eq!(ctx.sweep_sessions(), 0);

    advance(Duration::from_millis(2_000)).await;
    assert_eq!(ctx.sweep_sessions(), 1);
    assert!(ctx.sessions.info(&session_id).is_none());
    assert!(ctx.subscriptions.session_of(subscription_id).is_none());
    assert!(ctx.subscriptions.sampling_intervals().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_channel_sweep_closes_expired_channels() {
    let ctx = context(ServerConfig::default());
    let short = open_channel(&ctx, 10_000);
    let long = open_channel(&ctx, 60_000);
    let (session_id, _, _) = session_with_subscription(&ctx, short, 0.0);

    advance(Duration::from_millis(10_001)).await;
    assert_eq!(ctx.sweep_channels(), 1);
    assert!(!ctx.channels.is_open(short));
    assert!(ctx.channels.is_open(long));
    assert!(ctx.sessions.info(&session_id).is_none());
    assert_eq!(ctx.sweep_channels(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_endpoints_advertise_anonymous_none_security() {
    let ctx = context(ServerConfig::default());
    let endpoints = ctx.endpoints();
    assert_eq!(endpoints.len(), 1);

    let endpoint = &endpoints[0];
    assert_eq!(endpoint.endpoint_url, "opc.tcp://0.0.0.0:4840");
    assert_eq!(endpoint.security_mode, MessageSecurityMode::None);
    assert_eq!(endpoint.security_policy_uri, SECURITY_POLICY_NONE_URI);
    assert_eq!(endpoint.user_identity_tokens[0].policy_id, ANONYMOUS_POLICY_ID);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_everything() {
    let ctx = context(ServerConfig::default());
    let channel_id = open_channel(&ctx, 0);
    session_with_subscription(&ctx, channel_id, 0.0);
    session_with_subscription(&ctx, channel_id, 0.0);

    ctx.shutdown();
    assert!(ctx.channels.is_empty());
    assert!(ctx.sessions.is_empty());
    assert!(ctx.subscriptions.is_empty());
}
