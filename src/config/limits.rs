//! Lifetimes, timeouts and capacity limits of channels, sessions and subscriptions.
//!
//! Each section also owns the revision rule for the client-requested value it bounds,
//! so the managers never clamp on their own.

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::validate_range;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChannelConfig {
    #[serde(default = "default_min_token_lifetime_ms")]
    pub min_token_lifetime_ms: u64,

    #[serde(default = "default_max_token_lifetime_ms")]
    pub max_token_lifetime_ms: u64,

    /// Granted when the client requests a lifetime of 0
    #[serde(default = "default_token_lifetime_ms")]
    pub default_token_lifetime_ms: u64,

    /// Period of the expired-channel sweep
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Close bound sessions when their channel closes; detach them otherwise
    #[serde(default = "default_true")]
    pub close_sessions_on_channel_close: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            min_token_lifetime_ms: default_min_token_lifetime_ms(),
            max_token_lifetime_ms: default_max_token_lifetime_ms(),
            default_token_lifetime_ms: default_token_lifetime_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            close_sessions_on_channel_close: default_true(),
        }
    }
}

impl ChannelConfig {
    pub fn revise_token_lifetime(
        &self,
        requested_ms: u64,
    ) -> u64 {
        revise(
            requested_ms,
            self.default_token_lifetime_ms,
            self.min_token_lifetime_ms,
            self.max_token_lifetime_ms,
        )
    }

    pub fn validate(&self) -> Result<()> {
        validate_range(
            "channel",
            "token_lifetime_ms",
            self.min_token_lifetime_ms,
            self.default_token_lifetime_ms,
            self.max_token_lifetime_ms,
        )?;
        non_zero("channel.sweep_interval_ms", self.sweep_interval_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_min_session_timeout_ms")]
    pub min_session_timeout_ms: u64,

    #[serde(default = "default_max_session_timeout_ms")]
    pub max_session_timeout_ms: u64,

    #[serde(default = "default_session_timeout_ms")]
    pub default_session_timeout_ms: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Period of the inactivity sweep
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_session_timeout_ms: default_min_session_timeout_ms(),
            max_session_timeout_ms: default_max_session_timeout_ms(),
            default_session_timeout_ms: default_session_timeout_ms(),
            max_sessions: default_max_sessions(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl SessionConfig {
    /// `clamp(requested or default, min, max)`
    pub fn revise_session_timeout(
        &self,
        requested_ms: f64,
    ) -> u64 {
        revise(
            ms_from_f64(requested_ms),
            self.default_session_timeout_ms,
            self.min_session_timeout_ms,
            self.max_session_timeout_ms,
        )
    }

    pub fn validate(&self) -> Result<()> {
        validate_range(
            "session",
            "session_timeout_ms",
            self.min_session_timeout_ms,
            self.default_session_timeout_ms,
            self.max_session_timeout_ms,
        )?;
        non_zero("session.max_sessions", self.max_sessions as u64)?;
        non_zero("session.sweep_interval_ms", self.sweep_interval_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubscriptionConfig {
    #[serde(default = "default_min_publishing_interval_ms")]
    pub min_publishing_interval_ms: u64,

    #[serde(default = "default_max_publishing_interval_ms")]
    pub max_publishing_interval_ms: u64,

    #[serde(default = "default_max_keep_alive_count")]
    pub max_keep_alive_count: u32,

    #[serde(default = "default_max_lifetime_count")]
    pub max_lifetime_count: u32,

    #[serde(default = "default_max_subscriptions_per_session")]
    pub max_subscriptions_per_session: usize,

    #[serde(default = "default_max_monitored_items_per_subscription")]
    pub max_monitored_items_per_subscription: usize,

    /// Bound of a subscription's pending notification queue
    #[serde(default = "default_max_queued_notifications")]
    pub max_queued_notifications: usize,

    /// Cap on notifications per publish response, 0 = unlimited
    #[serde(default)]
    pub max_notifications_per_publish: u32,

    #[serde(default = "default_min_sampling_interval_ms")]
    pub min_sampling_interval_ms: u64,

    #[serde(default = "default_max_item_queue_size")]
    pub max_item_queue_size: u32,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            min_publishing_interval_ms: default_min_publishing_interval_ms(),
            max_publishing_interval_ms: default_max_publishing_interval_ms(),
            max_keep_alive_count: default_max_keep_alive_count(),
            max_lifetime_count: default_max_lifetime_count(),
            max_subscriptions_per_session: default_max_subscriptions_per_session(),
            max_monitored_items_per_subscription: default_max_monitored_items_per_subscription(),
            max_queued_notifications: default_max_queued_notifications(),
            max_notifications_per_publish: 0,
            min_sampling_interval_ms: default_min_sampling_interval_ms(),
            max_item_queue_size: default_max_item_queue_size(),
        }
    }
}

impl SubscriptionConfig {
    pub fn revise_publishing_interval(
        &self,
        requested_ms: f64,
    ) -> u64 {
        ms_from_f64(requested_ms).clamp(self.min_publishing_interval_ms, self.max_publishing_interval_ms)
    }

    pub fn revise_keep_alive_count(
        &self,
        requested: u32,
    ) -> u32 {
        requested.clamp(1, self.max_keep_alive_count)
    }

    pub fn revise_lifetime_count(
        &self,
        requested: u32,
    ) -> u32 {
        requested.clamp(1, self.max_lifetime_count)
    }

    /// Requested 0 or negative falls back to the publishing interval.
    pub fn revise_sampling_interval(
        &self,
        requested_ms: f64,
        publishing_interval_ms: u64,
    ) -> u64 {
        let requested = if requested_ms > 0.0 {
            ms_from_f64(requested_ms)
        } else {
            publishing_interval_ms
        };
        requested.clamp(self.min_sampling_interval_ms, self.max_publishing_interval_ms)
    }

    pub fn revise_queue_size(
        &self,
        requested: u32,
    ) -> u32 {
        requested.clamp(1, self.max_item_queue_size)
    }

    /// The smaller non-zero of the client's and the server's cap, 0 when both are unlimited.
    pub fn revise_notifications_per_publish(
        &self,
        requested: u32,
    ) -> u32 {
        match (requested, self.max_notifications_per_publish) {
            (0, server) => server,
            (client, 0) => client,
            (client, server) => client.min(server),
        }
    }

    pub fn validate(&self) -> Result<()> {
        non_zero("subscription.min_publishing_interval_ms", self.min_publishing_interval_ms)?;
        if self.min_publishing_interval_ms > self.max_publishing_interval_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "subscription.min_publishing_interval_ms ({}) exceeds subscription.max_publishing_interval_ms ({})",
                self.min_publishing_interval_ms, self.max_publishing_interval_ms
            ))));
        }
        non_zero("subscription.min_sampling_interval_ms", self.min_sampling_interval_ms)?;
        non_zero("subscription.max_keep_alive_count", self.max_keep_alive_count as u64)?;
        non_zero("subscription.max_lifetime_count", self.max_lifetime_count as u64)?;
        non_zero(
            "subscription.max_subscriptions_per_session",
            self.max_subscriptions_per_session as u64,
        )?;
        non_zero(
            "subscription.max_monitored_items_per_subscription",
            self.max_monitored_items_per_subscription as u64,
        )?;
        non_zero("subscription.max_queued_notifications", self.max_queued_notifications as u64)?;
        non_zero("subscription.max_item_queue_size", self.max_item_queue_size as u64)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PublishConfig {
    /// Pending publish requests per session; the oldest is answered when exceeded
    #[serde(default = "default_max_pending_publish_requests")]
    pub max_pending_publish_requests: usize,

    /// Used when the request carries no timeout hint
    #[serde(default = "default_publish_timeout_ms")]
    pub default_publish_timeout_ms: u64,

    /// Unacknowledged messages kept per session for Republish
    #[serde(default = "default_max_retransmission_queue")]
    pub max_retransmission_queue: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_pending_publish_requests: default_max_pending_publish_requests(),
            default_publish_timeout_ms: default_publish_timeout_ms(),
            max_retransmission_queue: default_max_retransmission_queue(),
        }
    }
}

impl PublishConfig {
    pub fn validate(&self) -> Result<()> {
        non_zero(
            "publish.max_pending_publish_requests",
            self.max_pending_publish_requests as u64,
        )?;
        non_zero("publish.default_publish_timeout_ms", self.default_publish_timeout_ms)?;
        non_zero("publish.max_retransmission_queue", self.max_retransmission_queue as u64)
    }
}

fn revise(
    requested: u64,
    default: u64,
    min: u64,
    max: u64,
) -> u64 {
    let requested = if requested == 0 { default } else { requested };
    requested.clamp(min, max)
}

fn ms_from_f64(ms: f64) -> u64 {
    if ms.is_finite() && ms > 0.0 {
        ms.round() as u64
    } else {
        0
    }
}

fn non_zero(
    field: &str,
    value: u64,
) -> Result<()> {
    if value == 0 {
        return Err(Error::Config(ConfigError::Message(format!("{field} must be greater than 0"))));
    }
    Ok(())
}

fn default_true() -> bool {
    true
}
fn default_sweep_interval_ms() -> u64 {
    1000
}
fn default_min_token_lifetime_ms() -> u64 {
    10_000
}
fn default_max_token_lifetime_ms() -> u64 {
    3_600_000
}
fn default_token_lifetime_ms() -> u64 {
    600_000
}
fn default_min_session_timeout_ms() -> u64 {
    10_000
}
fn default_max_session_timeout_ms() -> u64 {
    3_600_000
}
fn default_session_timeout_ms() -> u64 {
    60_000
}
fn default_max_sessions() -> usize {
    100
}
fn default_min_publishing_interval_ms() -> u64 {
    50
}
fn default_max_publishing_interval_ms() -> u64 {
    3_600_000
}
fn default_max_keep_alive_count() -> u32 {
    30_000
}
fn default_max_lifetime_count() -> u32 {
    300_000
}
fn default_max_subscriptions_per_session() -> usize {
    32
}
fn default_max_monitored_items_per_subscription() -> usize {
    1000
}
fn default_max_queued_notifications() -> usize {
    1000
}
fn default_min_sampling_interval_ms() -> u64 {
    50
}
fn default_max_item_queue_size() -> u32 {
    100
}
fn default_max_pending_publish_requests() -> usize {
    16
}
fn default_publish_timeout_ms() -> u64 {
    30_000
}
fn default_max_retransmission_queue() -> usize {
    64
}
