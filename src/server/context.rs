use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::metrics::SESSIONS_TIMED_OUT_TOTAL;
use crate::AddressSpace;
use crate::ApplicationDescription;
use crate::ApplicationType;
use crate::EndpointDescription;
use crate::LocalizedText;
use crate::MessageSecurityMode;
use crate::NodeId;
use crate::PublishScheduler;
use crate::SecureChannelManager;
use crate::ServerConfig;
use crate::SessionManager;
use crate::StatusCode;
use crate::SubscriptionEngine;
use crate::UserTokenPolicy;
use crate::UserTokenType;
use crate::SECURITY_POLICY_NONE_URI;
use crate::TRANSPORT_PROFILE_URI;

/// Policy id of the only user token policy offered.
pub const ANONYMOUS_POLICY_ID: &str = "anonymous";

/// Shared component graph of a running server.
///
/// Components only know each other by id; the cascading teardown across them
/// (channel -> sessions -> subscriptions -> parked publishes) lives here.
#[derive(Debug)]
pub struct ServerContext {
    pub config: Arc<ServerConfig>,
    pub address_space: Arc<AddressSpace>,
    pub channels: Arc<SecureChannelManager>,
    pub sessions: Arc<SessionManager>,
    pub subscriptions: Arc<SubscriptionEngine>,
    pub publisher: Arc<PublishScheduler>,
}

impl ServerContext {
    pub fn new(
        config: ServerConfig,
        address_space: Arc<AddressSpace>,
    ) -> Self {
        let channels = Arc::new(SecureChannelManager::new(config.channel.clone()));
        let sessions = Arc::new(SessionManager::new(config.session.clone()));
        let subscriptions = Arc::new(SubscriptionEngine::new(
            config.subscription.clone(),
            address_space.clone(),
        ));
        let publisher = Arc::new(PublishScheduler::new(
            config.publish.clone(),
            subscriptions.clone(),
            sessions.clone(),
        ));

        Self {
            config: Arc::new(config),
            address_space,
            channels,
            sessions,
            subscriptions,
            publisher,
        }
    }

    /// The single endpoint this server offers: no security, anonymous identity.
    pub fn endpoints(&self) -> Vec<EndpointDescription> {
        let endpoint = &self.config.endpoint;
        vec![EndpointDescription {
            endpoint_url: endpoint.endpoint_url(),
            server: ApplicationDescription {
                application_uri: endpoint.application_uri.clone(),
                product_uri: endpoint.product_uri.clone(),
                application_name: LocalizedText::new(&endpoint.application_name),
                application_type: ApplicationType::Server,
            },
            security_mode: MessageSecurityMode::None,
            security_policy_uri: SECURITY_POLICY_NONE_URI.to_string(),
            user_identity_tokens: vec![UserTokenPolicy {
                policy_id: ANONYMOUS_POLICY_ID.to_string(),
                token_type: UserTokenType::Anonymous,
            }],
            transport_profile_uri: TRANSPORT_PROFILE_URI.to_string(),
        }]
    }

    /// Closes a channel and cascades to the sessions bound to it. Idempotent.
    ///
    /// Bound sessions are closed, or only detached when
    /// `channel.close_sessions_on_channel_close` is off. Either way the channel's
    /// cancellation releases publishes parked on it.
    pub fn close_channel(
        &self,
        channel_id: u32,
    ) -> bool {
        let closed = self.channels.close_channel(channel_id);

        for session_id in self.sessions.sessions_on_channel(channel_id) {
            if self.config.channel.close_sessions_on_channel_close {
                self.close_session(&session_id);
            } else {
                self.sessions.detach_channel(&session_id);
            }
        }
        closed
    }

    /// Closes a session and deletes every subscription it owns. Idempotent.
    pub fn close_session(
        &self,
        session_id: &NodeId,
    ) -> bool {
        let Some(closed) = self.sessions.close_session(session_id) else {
            return false;
        };

        // the engine is authoritative; the session's own list may lag an expiry
        let mut subscription_ids = closed.subscription_ids;
        subscription_ids.extend(self.subscriptions.subscriptions_for_session(session_id));
        subscription_ids.sort_unstable();
        subscription_ids.dedup();

        for subscription_id in subscription_ids {
            self.subscriptions.delete_subscription(subscription_id);
            self.publisher.forget_subscription(session_id, subscription_id);
        }
        self.publisher.close_session(session_id);
        true
    }

    /// Deletes one subscription of a session; unknown or foreign ids are reported as invalid.
    pub fn delete_subscription(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
    ) -> StatusCode {
        if self.subscriptions.session_of(subscription_id).as_ref() != Some(session_id) {
            return StatusCode::BadSubscriptionIdInvalid;
        }
        self.subscriptions.delete_subscription(subscription_id);
        self.sessions.detach_subscription(session_id, subscription_id);
        self.publisher.forget_subscription(session_id, subscription_id);
        StatusCode::Good
    }

    /// Closes every channel whose current token has expired. Returns how many were closed.
    pub fn sweep_channels(&self) -> usize {
        let expired = self.channels.expired_channels();
        for channel_id in &expired {
            warn!(channel_id, "secure channel token lifetime elapsed");
            self.close_channel(*channel_id);
        }
        expired.len()
    }

    /// Closes every session idle past its timeout. Returns how many were closed.
    pub fn sweep_sessions(&self) -> usize {
        let mut count = 0;
        for session_id in self.sessions.expired_sessions() {
            if self.close_session(&session_id) {
                warn!(%session_id, "session timed out");
                SESSIONS_TIMED_OUT_TOTAL.inc();
                count += 1;
            }
        }
        count
    }

    /// Closes all channels (and with them all sessions) and stops sampling.
    pub fn shutdown(&self) {
        let channel_ids = self.channels.channel_ids();
        debug!(channels = channel_ids.len(), "closing channels for shutdown");
        for channel_id in channel_ids {
            self.close_channel(channel_id);
        }
        for session_id in self.sessions.session_ids() {
            self.close_session(&session_id);
        }
        self.subscriptions.shutdown();
        info!("server context shut down");
    }
}
