use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::SecurityPolicy;
use crate::metrics::ACTIVE_CHANNELS;
use crate::utils::time::timestamp_millis;
use crate::ChannelConfig;
use crate::ChannelError;
use crate::ChannelSecurityToken;
use crate::MessageSecurityMode;

#[derive(Debug, Clone)]
struct Token {
    token_id: u32,
    issued: Instant,
    issued_at_ms: u64,
    lifetime: Duration,
}

impl Token {
    fn is_expired(
        &self,
        now: Instant,
    ) -> bool {
        now >= self.issued + self.lifetime
    }

    fn to_security_token(
        &self,
        channel_id: u32,
    ) -> ChannelSecurityToken {
        ChannelSecurityToken {
            channel_id,
            token_id: self.token_id,
            created_at: self.issued_at_ms,
            revised_lifetime: self.lifetime.as_millis().min(u32::MAX as u128) as u32,
        }
    }
}

#[derive(Debug)]
struct SecureChannel {
    policy: SecurityPolicy,
    mode: MessageSecurityMode,
    current: Token,
    /// Superseded token, still accepted until its own expiry.
    previous: Option<Token>,
    cancel: CancellationToken,
}

/// Channel snapshot for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub channel_id: u32,
    pub policy: SecurityPolicy,
    pub mode: MessageSecurityMode,
    pub token_id: u32,
}

/// Tracks open secure channels and their security tokens.
#[derive(Debug)]
pub struct SecureChannelManager {
    config: ChannelConfig,
    channels: DashMap<u32, SecureChannel>,
    next_channel_id: AtomicU32,
    next_token_id: AtomicU32,
}

impl SecureChannelManager {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            channels: DashMap::new(),
            next_channel_id: AtomicU32::new(1),
            next_token_id: AtomicU32::new(1),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn is_open(
        &self,
        channel_id: u32,
    ) -> bool {
        self.channels.contains_key(&channel_id)
    }

    fn issue_token(
        &self,
        requested_lifetime_ms: u32,
    ) -> Token {
        let lifetime_ms = self.config.revise_token_lifetime(requested_lifetime_ms as u64);
        Token {
            token_id: self.next_token_id.fetch_add(1, Ordering::Relaxed),
            issued: Instant::now(),
            issued_at_ms: timestamp_millis(),
            lifetime: Duration::from_millis(lifetime_ms),
        }
    }

    /// Opens a channel and issues its first token.
    pub fn open_channel(
        &self,
        security_policy_uri: &str,
        mode: MessageSecurityMode,
        requested_lifetime_ms: u32,
    ) -> Result<ChannelSecurityToken, ChannelError> {
        let policy = SecurityPolicy::from_uri(security_policy_uri)?;
        if !policy.supports_mode(mode) {
            return Err(ChannelError::SecurityPolicyRejected(format!(
                "{} with mode {:?}",
                policy.uri(),
                mode
            )));
        }

        let channel_id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let token = self.issue_token(requested_lifetime_ms);
        let security_token = token.to_security_token(channel_id);

        self.channels.insert(
            channel_id,
            SecureChannel {
                policy,
                mode,
                current: token,
                previous: None,
                cancel: CancellationToken::new(),
            },
        );
        ACTIVE_CHANNELS.inc();
        info!(
            channel_id,
            token_id = security_token.token_id,
            lifetime_ms = security_token.revised_lifetime,
            "secure channel opened"
        );
        Ok(security_token)
    }

    /// Issues a new token; the one being renewed stays valid until it expires.
    pub fn renew_token(
        &self,
        channel_id: u32,
        old_token_id: u32,
        requested_lifetime_ms: u32,
    ) -> Result<ChannelSecurityToken, ChannelError> {
        let now = Instant::now();
        {
            let mut channel = self
                .channels
                .get_mut(&channel_id)
                .ok_or(ChannelError::Invalid(channel_id))?;

            if channel.current.token_id != old_token_id {
                return Err(ChannelError::TokenUnknown {
                    channel_id,
                    token_id: old_token_id,
                });
            }

            if !channel.current.is_expired(now) {
                let token = self.issue_token(requested_lifetime_ms);
                let security_token = token.to_security_token(channel_id);
                let previous = std::mem::replace(&mut channel.current, token);
                channel.previous = Some(previous);
                debug!(channel_id, token_id = security_token.token_id, "secure channel token renewed");
                return Ok(security_token);
            }
        }

        // map guard released above; closing takes the shard lock again
        self.close_channel(channel_id);
        Err(ChannelError::Expired {
            channel_id,
            token_id: old_token_id,
        })
    }

    /// Authenticates a message against its channel. An expired current token closes the channel.
    pub fn validate(
        &self,
        channel_id: u32,
        token_id: u32,
    ) -> Result<(), ChannelError> {
        let now = Instant::now();
        let outcome = {
            let channel = self.channels.get(&channel_id).ok_or(ChannelError::Invalid(channel_id))?;

            if channel.current.token_id == token_id {
                if channel.current.is_expired(now) {
                    Err(ChannelError::Expired { channel_id, token_id })
                } else {
                    Ok(())
                }
            } else {
                match &channel.previous {
                    Some(previous) if previous.token_id == token_id && !previous.is_expired(now) => Ok(()),
                    Some(previous) if previous.token_id == token_id => {
                        Err(ChannelError::Expired { channel_id, token_id })
                    }
                    _ => Err(ChannelError::TokenUnknown { channel_id, token_id }),
                }
            }
        };

        if let Err(ChannelError::Expired { .. }) = &outcome {
            if self.current_token_expired(channel_id, now) {
                warn!(channel_id, "secure channel token expired, closing channel");
                self.close_channel(channel_id);
            }
        }
        outcome
    }

    fn current_token_expired(
        &self,
        channel_id: u32,
        now: Instant,
    ) -> bool {
        self.channels
            .get(&channel_id)
            .map(|c| c.current.is_expired(now))
            .unwrap_or(false)
    }

    /// Cancelled when the channel closes; pending publishes wait on it.
    pub fn cancellation_token(
        &self,
        channel_id: u32,
    ) -> Option<CancellationToken> {
        self.channels.get(&channel_id).map(|c| c.cancel.clone())
    }

    pub fn info(
        &self,
        channel_id: u32,
    ) -> Option<ChannelInfo> {
        self.channels.get(&channel_id).map(|c| ChannelInfo {
            channel_id,
            policy: c.policy,
            mode: c.mode,
            token_id: c.current.token_id,
        })
    }

    /// Removes the channel and cancels its token. Returns `false` if it was already gone.
    pub fn close_channel(
        &self,
        channel_id: u32,
    ) -> bool {
        match self.channels.remove(&channel_id) {
            Some((_, channel)) => {
                channel.cancel.cancel();
                ACTIVE_CHANNELS.dec();
                info!(channel_id, "secure channel closed");
                true
            }
            None => false,
        }
    }

    /// Channels whose current token has run out.
    pub fn expired_channels(&self) -> Vec<u32> {
        let now = Instant::now();
        self.channels
            .iter()
            .filter(|entry| entry.current.is_expired(now))
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn channel_ids(&self) -> Vec<u32> {
        self.channels.iter().map(|entry| *entry.key()).collect()
    }
}
