use std::collections::BTreeSet;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::metrics::ACTIVE_SESSIONS;
use crate::NodeId;
use crate::SessionConfig;
use crate::SessionError;

/// Namespace of server-generated session ids and authentication tokens.
pub const SESSION_NAMESPACE: u16 = 1;

#[derive(Debug)]
struct Session {
    auth_token: NodeId,
    name: String,
    channel_id: Option<u32>,
    activated: bool,
    last_activity: Instant,
    timeout: Duration,
    subscription_ids: BTreeSet<u32>,
    cancel: CancellationToken,
}

/// Result of CreateSession.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: NodeId,
    pub auth_token: NodeId,
    pub timeout_ms: u64,
}

/// Session resolved from a request's authentication token.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: NodeId,
    pub channel_id: u32,
    pub cancel: CancellationToken,
}

/// Session snapshot for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: NodeId,
    pub name: String,
    pub channel_id: Option<u32>,
    pub activated: bool,
    pub timeout_ms: u64,
    pub subscription_ids: Vec<u32>,
}

/// Removed session, with the subscriptions the caller must tear down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedSession {
    pub session_id: NodeId,
    pub subscription_ids: Vec<u32>,
}

/// Service checks a request must pass before it reaches a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRequirement {
    /// Session must exist and be bound to the request's channel
    Bound,
    /// Bound, and ActivateSession has succeeded
    Activated,
}

/// Session lifecycle: create, activate, touch, close and the inactivity sweep.
///
/// Sessions are keyed by id; a second index maps authentication tokens to ids.
/// Subscriptions are referenced by id only.
#[derive(Debug)]
pub struct SessionManager {
    config: SessionConfig,
    sessions: DashMap<NodeId, Session>,
    by_token: DashMap<NodeId, NodeId>,
    next_id: AtomicU32,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
            by_token: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn create_session(
        &self,
        channel_id: u32,
        name: &str,
        requested_timeout_ms: f64,
    ) -> Result<CreatedSession, SessionError> {
        if self.sessions.len() >= self.config.max_sessions {
            return Err(SessionError::TooManySessions(self.config.max_sessions));
        }

        let timeout_ms = self.config.revise_session_timeout(requested_timeout_ms);
        let session_id = NodeId::numeric(SESSION_NAMESPACE, self.next_id.fetch_add(1, Ordering::Relaxed));
        let auth_token = NodeId::new_guid(SESSION_NAMESPACE);

        self.by_token.insert(auth_token.clone(), session_id.clone());
        self.sessions.insert(
            session_id.clone(),
            Session {
                auth_token: auth_token.clone(),
                name: name.to_string(),
                channel_id: Some(channel_id),
                activated: false,
                last_activity: Instant::now(),
                timeout: Duration::from_millis(timeout_ms),
                subscription_ids: BTreeSet::new(),
                cancel: CancellationToken::new(),
            },
        );
        ACTIVE_SESSIONS.inc();
        info!(%session_id, channel_id, timeout_ms, "session created");

        Ok(CreatedSession {
            session_id,
            auth_token,
            timeout_ms,
        })
    }

    fn resolve(
        &self,
        auth_token: &NodeId,
    ) -> Result<NodeId, SessionError> {
        self.by_token
            .get(auth_token)
            .map(|id| id.value().clone())
            .ok_or(SessionError::NotFound)
    }

    /// Activates the session and binds it to `channel_id`, replacing any earlier binding.
    pub fn activate_session(
        &self,
        auth_token: &NodeId,
        channel_id: u32,
    ) -> Result<NodeId, SessionError> {
        let session_id = self.resolve(auth_token)?;
        let mut session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| SessionError::Closed(session_id.clone()))?;

        if session.channel_id != Some(channel_id) {
            debug!(%session_id, from = ?session.channel_id, to = channel_id, "session rebound to channel");
        }
        session.channel_id = Some(channel_id);
        session.activated = true;
        session.last_activity = Instant::now();
        info!(%session_id, channel_id, "session activated");
        Ok(session_id)
    }

    /// Resolves and checks the session of a request, then resets its inactivity clock.
    pub fn validate(
        &self,
        auth_token: &NodeId,
        channel_id: u32,
        requirement: SessionRequirement,
    ) -> Result<SessionContext, SessionError> {
        let session_id = self.resolve(auth_token)?;
        let mut session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| SessionError::Closed(session_id.clone()))?;

        match session.channel_id {
            Some(bound) if bound == channel_id => {}
            Some(_) => return Err(SessionError::ChannelMismatch { session_id }),
            None => return Err(SessionError::NoChannelBinding(session_id)),
        }
        if requirement == SessionRequirement::Activated && !session.activated {
            return Err(SessionError::NotActivated(session_id));
        }

        session.last_activity = Instant::now();
        Ok(SessionContext {
            session_id,
            channel_id,
            cancel: session.cancel.clone(),
        })
    }

    /// Resets the inactivity clock.
    pub fn touch(
        &self,
        session_id: &NodeId,
    ) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.last_activity = Instant::now();
        }
    }

    /// Removes the session and cancels everything waiting on it. Idempotent.
    pub fn close_session(
        &self,
        session_id: &NodeId,
    ) -> Option<ClosedSession> {
        let (_, session) = self.sessions.remove(session_id)?;
        self.by_token.remove(&session.auth_token);
        session.cancel.cancel();
        ACTIVE_SESSIONS.dec();
        info!(%session_id, "session closed");

        Some(ClosedSession {
            session_id: session_id.clone(),
            subscription_ids: session.subscription_ids.into_iter().collect(),
        })
    }

    /// Clears the channel binding; the session survives until it times out or is re-activated.
    pub fn detach_channel(
        &self,
        session_id: &NodeId,
    ) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.channel_id = None;
            debug!(%session_id, "session detached from channel");
        }
    }

    pub fn sessions_on_channel(
        &self,
        channel_id: u32,
    ) -> Vec<NodeId> {
        self.sessions
            .iter()
            .filter(|entry| entry.channel_id == Some(channel_id))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Sessions idle for longer than their granted timeout.
    pub fn expired_sessions(&self) -> Vec<NodeId> {
        let now = Instant::now();
        self.sessions
            .iter()
            .filter(|entry| now.duration_since(entry.last_activity) > entry.timeout)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Records a subscription as owned by the session.
    pub fn attach_subscription(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
    ) -> Result<(), SessionError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::Closed(session_id.clone()))?;
        session.subscription_ids.insert(subscription_id);
        Ok(())
    }

    pub fn detach_subscription(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
    ) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.subscription_ids.remove(&subscription_id);
        }
    }

    pub fn subscription_ids(
        &self,
        session_id: &NodeId,
    ) -> Vec<u32> {
        self.sessions
            .get(session_id)
            .map(|s| s.subscription_ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn cancellation_token(
        &self,
        session_id: &NodeId,
    ) -> Option<CancellationToken> {
        self.sessions.get(session_id).map(|s| s.cancel.clone())
    }

    pub fn info(
        &self,
        session_id: &NodeId,
    ) -> Option<SessionInfo> {
        self.sessions.get(session_id).map(|s| SessionInfo {
            session_id: session_id.clone(),
            name: s.name.clone(),
            channel_id: s.channel_id,
            activated: s.activated,
            timeout_ms: s.timeout.as_millis() as u64,
            subscription_ids: s.subscription_ids.iter().copied().collect(),
        })
    }

    pub fn session_ids(&self) -> Vec<NodeId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }
}
