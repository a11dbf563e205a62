use std::cmp::Reverse;
use std::collections::VecDeque;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::metrics::PUBLISH_KIND_DATA;
use crate::metrics::PUBLISH_KIND_KEEP_ALIVE;
use crate::metrics::PUBLISH_KIND_STATUS_CHANGE;
use crate::metrics::PUBLISH_RESPONSES_TOTAL;
use crate::metrics::QUEUE_OVERFLOW_TOTAL;
use crate::metrics::QUEUE_RETRANSMISSION;
use crate::NodeId;
use crate::NotificationData;
use crate::NotificationMessage;
use crate::PublishConfig;
use crate::PublishError;
use crate::PublishRequest;
use crate::PublishResponse;
use crate::RequestHeader;
use crate::ResponseHeader;
use crate::ScheduleEntry;
use crate::SessionContext;
use crate::SessionManager;
use crate::StatusCode;
use crate::SubscriptionAcknowledgement;
use crate::SubscriptionEngine;
use crate::TickOutcome;

/// Idle wait of the scheduler loop when no subscription exists.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

type PublishOutcome = std::result::Result<PublishResponse, PublishError>;

/// A publish request parked until a subscription has something to send.
#[derive(Debug)]
struct PendingPublish {
    header: RequestHeader,
    ack_results: Vec<StatusCode>,
    responder: oneshot::Sender<PublishOutcome>,
}

/// A data message kept until the client acknowledges it.
#[derive(Debug)]
struct Unacknowledged {
    subscription_id: u32,
    message: NotificationMessage,
    /// Owed to the next publish request that does not acknowledge it
    resend: bool,
}

#[derive(Debug, Default)]
struct SessionQueue {
    waiting: VecDeque<PendingPublish>,
    retransmission: VecDeque<Unacknowledged>,
    /// Expiry notices not yet delivered to the client
    expired: VecDeque<(u32, NotificationMessage)>,
}

impl SessionQueue {
    fn drop_abandoned(&mut self) {
        self.waiting.retain(|p| !p.responder.is_closed());
    }

    fn available_sequence_numbers(
        &self,
        subscription_id: u32,
    ) -> Vec<u32> {
        self.retransmission
            .iter()
            .filter(|u| u.subscription_id == subscription_id)
            .map(|u| u.message.sequence_number)
            .collect()
    }

    /// Oldest message still owed a resend; it stays available for Republish.
    fn take_resend(&mut self) -> Option<(u32, NotificationMessage)> {
        let unacknowledged = self.retransmission.iter_mut().find(|u| u.resend)?;
        unacknowledged.resend = false;
        Some((unacknowledged.subscription_id, unacknowledged.message.clone()))
    }
}

/// Matches queued publish requests with subscriptions whose publishing interval elapsed.
///
/// Publish requests are parked per session. The scheduler loop wakes at the
/// earliest subscription deadline, ticks every due subscription (earliest
/// first, ties broken by least recently served) and hands the resulting
/// message to the session's oldest waiting request.
///
/// Lock order: subscription state before session queue. No lock is held across an await.
#[derive(Debug)]
pub struct PublishScheduler {
    config: PublishConfig,
    engine: Arc<SubscriptionEngine>,
    sessions: Arc<SessionManager>,
    queues: DashMap<NodeId, Mutex<SessionQueue>>,
    last_served: DashMap<u32, u64>,
    serve_clock: AtomicU64,
}

impl PublishScheduler {
    pub fn new(
        config: PublishConfig,
        engine: Arc<SubscriptionEngine>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            config,
            engine,
            sessions,
            queues: DashMap::new(),
            last_served: DashMap::new(),
            serve_clock: AtomicU64::new(0),
        }
    }

    /// Handles one Publish request.
    ///
    /// Acknowledgements are processed first. The request is then answered right
    /// away with, in this order, a pending expiry notice, the oldest message the
    /// client has not acknowledged, or the message of a late subscription.
    /// Otherwise it is parked until the scheduler serves it, the timeout hint
    /// elapses, or the session or its channel closes.
    pub async fn publish(
        &self,
        ctx: &SessionContext,
        channel_cancel: &CancellationToken,
        request: PublishRequest,
    ) -> PublishOutcome {
        let session_id = &ctx.session_id;
        self.open_queue(ctx)?;
        let header = request.request_header;
        let ack_results = self.acknowledge(session_id, &request.subscription_acknowledgements);

        if let Some((subscription_id, message)) = self.take_expiry_notice(session_id) {
            return Ok(self.respond_now(session_id, &header, subscription_id, message, false, ack_results));
        }

        let subscription_ids = self.engine.subscriptions_for_session(session_id);
        if subscription_ids.is_empty() {
            return Err(PublishError::NoSubscription);
        }

        if let Some((subscription_id, message)) = self.take_resend(session_id) {
            debug!(
                %session_id,
                subscription_id,
                sequence_number = message.sequence_number,
                "retransmitting unacknowledged message"
            );
            return Ok(self.respond_resend(session_id, &header, subscription_id, message, ack_results));
        }

        if let Some((subscription_id, message, more)) = self.take_late(&subscription_ids) {
            return Ok(self.respond_now(session_id, &header, subscription_id, message, more, ack_results));
        }

        let (tx, mut rx) = oneshot::channel();
        self.park(
            session_id,
            PendingPublish {
                header: header.clone(),
                ack_results,
                responder: tx,
            },
        )?;

        let timeout = match header.timeout_hint {
            0 => Duration::from_millis(self.config.default_publish_timeout_ms),
            hint => Duration::from_millis(hint as u64),
        };

        let failure = tokio::select! {
            biased;
            outcome = &mut rx => return outcome.unwrap_or(Err(PublishError::Shutdown)),
            _ = ctx.cancel.cancelled() => PublishError::SessionClosed,
            _ = channel_cancel.cancelled() => PublishError::ChannelClosed,
            _ = sleep(timeout) => PublishError::Timeout,
        };

        // a response handed over while giving up still reaches the client
        rx.close();
        if let Ok(outcome) = rx.try_recv() {
            return outcome;
        }
        if failure == PublishError::Timeout {
            debug!(%session_id, "publish request timed out");
        }
        Err(failure)
    }

    /// Looks up an unacknowledged message for Republish.
    pub fn republish(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
        sequence_number: u32,
    ) -> std::result::Result<NotificationMessage, PublishError> {
        if self.engine.session_of(subscription_id).as_ref() != Some(session_id) {
            return Err(PublishError::SubscriptionNotFound(subscription_id));
        }
        self.queues
            .get(session_id)
            .and_then(|queue| {
                queue
                    .lock()
                    .retransmission
                    .iter()
                    .find(|u| u.subscription_id == subscription_id && u.message.sequence_number == sequence_number)
                    .map(|u| u.message.clone())
            })
            .ok_or(PublishError::MessageNotAvailable {
                subscription_id,
                sequence_number,
            })
    }

    /// Unacknowledged sequence numbers of a subscription, oldest first.
    pub fn available_sequence_numbers(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
    ) -> Vec<u32> {
        self.queues
            .get(session_id)
            .map(|queue| queue.lock().available_sequence_numbers(subscription_id))
            .unwrap_or_default()
    }

    /// Number of publish requests parked for a session.
    pub fn pending_requests(
        &self,
        session_id: &NodeId,
    ) -> usize {
        self.queues
            .get(session_id)
            .map(|queue| {
                let mut queue = queue.lock();
                queue.drop_abandoned();
                queue.waiting.len()
            })
            .unwrap_or(0)
    }

    /// Drops retransmission state of a deleted subscription.
    pub fn forget_subscription(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
    ) {
        self.last_served.remove(&subscription_id);
        if let Some(queue) = self.queues.get(session_id) {
            queue.lock().retransmission.retain(|u| u.subscription_id != subscription_id);
        }
    }

    /// Fails every parked request of a closed session and drops its queue.
    pub fn close_session(
        &self,
        session_id: &NodeId,
    ) {
        if let Some((_, queue)) = self.queues.remove(session_id) {
            let queue = queue.into_inner();
            for pending in queue.waiting {
                let _ = pending.responder.send(Err(PublishError::SessionClosed));
            }
        }
    }

    /// Number of sessions holding publish state.
    pub fn tracked_sessions(&self) -> usize {
        self.queues.len()
    }

    /// Scheduler loop; returns on shutdown after failing all parked requests.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<()>,
    ) {
        info!("publish scheduler started");
        loop {
            let now = Instant::now();
            let schedule = self.engine.schedule();
            let next_due = schedule.iter().map(|e| e.next_due).min();
            let due: Vec<ScheduleEntry> = schedule.into_iter().filter(|e| e.next_due <= now).collect();

            if !due.is_empty() {
                self.process_due(due);
                continue;
            }

            let wake_at = next_due.unwrap_or(now + IDLE_WAIT);
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.engine.schedule_changed().notified() => {}
                _ = sleep_until(wake_at) => {}
            }
        }
        self.fail_all(PublishError::Shutdown);
        info!("publish scheduler stopped");
    }

    /// Ticks every due subscription once.
    pub(crate) fn process_due(
        &self,
        mut due: Vec<ScheduleEntry>,
    ) {
        due.sort_by_key(|e| {
            (
                e.next_due,
                self.last_served.get(&e.subscription_id).map(|v| *v).unwrap_or(0),
                Reverse(e.priority),
            )
        });

        for entry in due {
            let publish_available = self.has_waiter(&entry.session_id);
            match self.engine.on_publishing_interval(entry.subscription_id, publish_available) {
                Some(TickOutcome::Publish(message)) => {
                    let more = self.engine.has_more(entry.subscription_id);
                    let keep_alive = message.is_keep_alive();
                    // data stays queued for the next request; a keep-alive is owed through the late flag
                    if !self.deliver(&entry.session_id, entry.subscription_id, message, more) && keep_alive {
                        self.engine.mark_late(entry.subscription_id);
                    }
                }
                Some(TickOutcome::Expired(message)) => {
                    self.on_expired(&entry.session_id, entry.subscription_id, message);
                }
                Some(TickOutcome::Missed) => {
                    trace!(subscription_id = entry.subscription_id, "no publish request available");
                }
                Some(TickOutcome::Idle) | None => {}
            }
        }
    }

    fn acknowledge(
        &self,
        session_id: &NodeId,
        acks: &[SubscriptionAcknowledgement],
    ) -> Vec<StatusCode> {
        acks.iter()
            .map(|ack| {
                if self.engine.session_of(ack.subscription_id).as_ref() != Some(session_id) {
                    return StatusCode::BadSubscriptionIdInvalid;
                }
                let removed = self.queues.get(session_id).and_then(|queue| {
                    let mut queue = queue.lock();
                    let pos = queue.retransmission.iter().position(|u| {
                        u.subscription_id == ack.subscription_id && u.message.sequence_number == ack.sequence_number
                    })?;
                    queue.retransmission.remove(pos)
                });
                match removed {
                    Some(_) => StatusCode::Good,
                    None => PublishError::SequenceNumberUnknown {
                        subscription_id: ack.subscription_id,
                        sequence_number: ack.sequence_number,
                    }
                    .status_code(),
                }
            })
            .collect()
    }

    /// Creates the session's queue unless the session is already closed.
    fn open_queue(
        &self,
        ctx: &SessionContext,
    ) -> std::result::Result<(), PublishError> {
        if ctx.cancel.is_cancelled() {
            return Err(PublishError::SessionClosed);
        }
        self.queues.entry(ctx.session_id.clone()).or_default();
        // close_session may have removed the queue between the check and the insert
        if ctx.cancel.is_cancelled() {
            self.close_session(&ctx.session_id);
            return Err(PublishError::SessionClosed);
        }
        Ok(())
    }

    fn take_resend(
        &self,
        session_id: &NodeId,
    ) -> Option<(u32, NotificationMessage)> {
        self.queues.get(session_id)?.lock().take_resend()
    }

    fn take_expiry_notice(
        &self,
        session_id: &NodeId,
    ) -> Option<(u32, NotificationMessage)> {
        self.queues.get(session_id)?.lock().expired.pop_front()
    }

    /// Serves the least recently served late subscription, if any.
    fn take_late(
        &self,
        subscription_ids: &[u32],
    ) -> Option<(u32, NotificationMessage, bool)> {
        let mut candidates: Vec<u32> = subscription_ids
            .iter()
            .copied()
            .filter(|id| self.engine.is_late(*id))
            .collect();
        candidates.sort_by_key(|id| self.last_served.get(id).map(|v| *v).unwrap_or(0));

        candidates.into_iter().find_map(|id| {
            self.engine
                .take_late_message(id)
                .map(|(message, more)| (id, message, more))
        })
    }

    fn park(
        &self,
        session_id: &NodeId,
        pending: PendingPublish,
    ) -> std::result::Result<(), PublishError> {
        let overflow = {
            let queue = self.queues.get(session_id).ok_or(PublishError::SessionClosed)?;
            let mut queue = queue.lock();
            queue.drop_abandoned();
            queue.waiting.push_back(pending);
            if queue.waiting.len() > self.config.max_pending_publish_requests {
                queue.waiting.pop_front()
            } else {
                None
            }
        };
        if let Some(oldest) = overflow {
            debug!(%session_id, "too many publish requests, answering the oldest");
            let _ = oldest.responder.send(Err(PublishError::TooManyPublishRequests));
        }
        // a parked request may make a missed subscription servable
        self.engine.schedule_changed().notify_one();
        Ok(())
    }

    fn has_waiter(
        &self,
        session_id: &NodeId,
    ) -> bool {
        self.queues
            .get(session_id)
            .map(|queue| {
                let mut queue = queue.lock();
                queue.drop_abandoned();
                !queue.waiting.is_empty()
            })
            .unwrap_or(false)
    }

    /// Answers a request synchronously, outside the parked queue.
    fn respond_now(
        &self,
        session_id: &NodeId,
        header: &RequestHeader,
        subscription_id: u32,
        message: NotificationMessage,
        more: bool,
        ack_results: Vec<StatusCode>,
    ) -> PublishResponse {
        self.mark_served(subscription_id);
        let available = self.retain_for_retransmission(session_id, subscription_id, &message);
        count_response(&message);
        build_response(header, subscription_id, message, more, ack_results, available)
    }

    /// Answers a request with a message it already received under the same sequence number.
    fn respond_resend(
        &self,
        session_id: &NodeId,
        header: &RequestHeader,
        subscription_id: u32,
        message: NotificationMessage,
        ack_results: Vec<StatusCode>,
    ) -> PublishResponse {
        self.mark_served(subscription_id);
        let available = self.available_sequence_numbers(session_id, subscription_id);
        let more = self.engine.has_more(subscription_id);
        count_response(&message);
        build_response(header, subscription_id, message, more, ack_results, available)
    }

    /// Hands a message to the oldest live parked request of the session.
    ///
    /// Returns `false` when no request took it; a data message then stays owed
    /// to the next publish request.
    fn deliver(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
        message: NotificationMessage,
        more: bool,
    ) -> bool {
        self.mark_served(subscription_id);
        let available = self.retain_for_retransmission(session_id, subscription_id, &message);

        loop {
            let pending = match self.queues.get(session_id) {
                Some(queue) => queue.lock().waiting.pop_front(),
                None => None,
            };
            let Some(pending) = pending else {
                debug!(%session_id, subscription_id, "no live publish request to deliver to");
                return false;
            };

            let response = build_response(
                &pending.header,
                subscription_id,
                message.clone(),
                more,
                pending.ack_results,
                available.clone(),
            );
            // a timed-out receiver hands the response back; try the next request
            if pending.responder.send(Ok(response)).is_ok() {
                count_response(&message);
                trace!(%session_id, subscription_id, sequence_number = message.sequence_number, "publish response sent");
                return true;
            }
        }
    }

    fn on_expired(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
        message: NotificationMessage,
    ) {
        self.sessions.detach_subscription(session_id, subscription_id);
        self.forget_subscription(session_id, subscription_id);

        if !self.deliver(session_id, subscription_id, message.clone(), false) && self.sessions.info(session_id).is_some() {
            self.queues
                .entry(session_id.clone())
                .or_default()
                .lock()
                .expired
                .push_back((subscription_id, message));
        }

        if self.engine.subscriptions_for_session(session_id).is_empty() {
            if let Some(queue) = self.queues.get(session_id) {
                let drained: Vec<PendingPublish> = queue.lock().waiting.drain(..).collect();
                for pending in drained {
                    let _ = pending.responder.send(Err(PublishError::NoSubscription));
                }
            }
        }
    }

    /// Keeps data messages until acknowledged; returns the available sequence numbers.
    fn retain_for_retransmission(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
        message: &NotificationMessage,
    ) -> Vec<u32> {
        let Some(queue) = self.queues.get(session_id) else {
            return Vec::new();
        };
        let mut queue = queue.lock();
        let is_data = message
            .notification_data
            .iter()
            .any(|d| matches!(d, NotificationData::DataChange(_)));
        if is_data {
            queue.retransmission.push_back(Unacknowledged {
                subscription_id,
                message: message.clone(),
                resend: true,
            });
            if queue.retransmission.len() > self.config.max_retransmission_queue {
                queue.retransmission.pop_front();
                QUEUE_OVERFLOW_TOTAL.with_label_values(&[QUEUE_RETRANSMISSION]).inc();
            }
        }
        queue.available_sequence_numbers(subscription_id)
    }

    fn mark_served(
        &self,
        subscription_id: u32,
    ) {
        let tick = self.serve_clock.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_served.insert(subscription_id, tick);
    }

    fn fail_all(
        &self,
        error: PublishError,
    ) {
        let sessions: Vec<NodeId> = self.queues.iter().map(|e| e.key().clone()).collect();
        for session_id in sessions {
            if let Some(queue) = self.queues.get(&session_id) {
                let drained: Vec<PendingPublish> = queue.lock().waiting.drain(..).collect();
                for pending in drained {
                    let _ = pending.responder.send(Err(error.clone()));
                }
            }
        }
    }
}

fn build_response(
    header: &RequestHeader,
    subscription_id: u32,
    notification_message: NotificationMessage,
    more_notifications: bool,
    results: Vec<StatusCode>,
    available_sequence_numbers: Vec<u32>,
) -> PublishResponse {
    PublishResponse {
        response_header: ResponseHeader::good(header),
        subscription_id,
        available_sequence_numbers,
        more_notifications,
        notification_message,
        results,
    }
}

fn count_response(message: &NotificationMessage) {
    let kind = if message.is_keep_alive() {
        PUBLISH_KIND_KEEP_ALIVE
    } else if message
        .notification_data
        .iter()
        .any(|d| matches!(d, NotificationData::StatusChange(_)))
    {
        PUBLISH_KIND_STATUS_CHANGE
    } else {
        PUBLISH_KIND_DATA
    };
    PUBLISH_RESPONSES_TOTAL.with_label_values(&[kind]).inc();
}
