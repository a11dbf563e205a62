use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use super::MonitoredItem;
use super::PendingNotification;
use crate::metrics::QUEUE_MONITORED_ITEM;
use crate::metrics::QUEUE_OVERFLOW_TOTAL;
use crate::metrics::QUEUE_SUBSCRIPTION;
use crate::utils::time::timestamp_millis;
use crate::DataValue;
use crate::MonitoredItemNotification;
use crate::NodeId;
use crate::NotificationData;
use crate::NotificationMessage;
use crate::StatusCode;

/// What one publishing-interval tick produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing to send this interval
    Idle,
    /// A message is ready and a publish request was available to carry it
    Publish(NotificationMessage),
    /// Something was due but no publish request was waiting; the subscription is now late
    Missed,
    /// The lifetime counter ran out; the message reports the expiry to the client
    Expired(NotificationMessage),
}

/// Revised subscription parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionParameters {
    pub publishing_interval_ms: u64,
    pub lifetime_count: u32,
    pub max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
}

/// Publish-cycle state of one subscription.
///
/// Counters follow the protocol state machine: the keep-alive counter counts
/// intervals with nothing to send, the lifetime counter counts consecutive
/// publish opportunities missed for lack of a publish request.
#[derive(Debug)]
pub struct Subscription {
    pub(crate) id: u32,
    pub(crate) session_id: NodeId,
    pub(crate) params: SubscriptionParameters,
    pub(crate) publishing_enabled: bool,
    pub(crate) priority: u8,
    pub(crate) items: BTreeMap<u32, MonitoredItem>,
    pub(crate) pending: VecDeque<PendingNotification>,
    pub(crate) max_queued: usize,
    pub(crate) next_sequence_number: u32,
    pub(crate) keep_alive_counter: u32,
    pub(crate) lifetime_counter: u32,
    /// Owes the client a message and answers the next publish immediately.
    pub(crate) late: bool,
    pub(crate) next_due: Instant,
    pub(crate) closed: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: u32,
        session_id: NodeId,
        params: SubscriptionParameters,
        publishing_enabled: bool,
        priority: u8,
        max_queued: usize,
    ) -> Self {
        Self {
            id,
            session_id,
            params,
            publishing_enabled,
            priority,
            items: BTreeMap::new(),
            pending: VecDeque::new(),
            max_queued,
            next_sequence_number: 1,
            keep_alive_counter: 0,
            lifetime_counter: 0,
            late: false,
            next_due: Instant::now() + Duration::from_millis(params.publishing_interval_ms),
            closed: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn session_id(&self) -> &NodeId {
        &self.session_id
    }

    pub fn params(&self) -> SubscriptionParameters {
        self.params
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn is_late(&self) -> bool {
        self.late
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn next_sequence_number(&self) -> u32 {
        self.next_sequence_number
    }

    pub(crate) fn interval(&self) -> Duration {
        Duration::from_millis(self.params.publishing_interval_ms)
    }

    pub(crate) fn update_params(
        &mut self,
        params: SubscriptionParameters,
    ) {
        self.params = params;
        self.next_due = Instant::now() + self.interval();
        self.keep_alive_counter = 0;
        self.lifetime_counter = 0;
    }

    /// Feeds one sample of `item_id` into the queue.
    pub(crate) fn sample(
        &mut self,
        item_id: u32,
        value: DataValue,
    ) {
        let (client_handle, queue_size) = match self.items.get_mut(&item_id) {
            Some(item) => {
                if !item.observe(&value) {
                    return;
                }
                (item.client_handle, item.queue_size as usize)
            }
            None => return,
        };
        self.enqueue(item_id, client_handle, queue_size, value);
    }

    fn enqueue(
        &mut self,
        item_id: u32,
        client_handle: u32,
        queue_size: usize,
        value: DataValue,
    ) {
        let queued = self.items.get(&item_id).map(|i| i.queued).unwrap_or(0);
        if queued >= queue_size {
            if let Some(pos) = self.pending.iter().position(|p| p.item_id == item_id) {
                self.pending.remove(pos);
                self.adjust_queued(item_id, -1);
                QUEUE_OVERFLOW_TOTAL.with_label_values(&[QUEUE_MONITORED_ITEM]).inc();
                trace!(subscription_id = self.id, item_id, "item queue full, dropped oldest");
            }
        }

        self.pending.push_back(PendingNotification {
            item_id,
            client_handle,
            value,
        });
        self.adjust_queued(item_id, 1);

        if self.pending.len() > self.max_queued {
            if let Some(dropped) = self.pending.pop_front() {
                self.adjust_queued(dropped.item_id, -1);
                QUEUE_OVERFLOW_TOTAL.with_label_values(&[QUEUE_SUBSCRIPTION]).inc();
                trace!(subscription_id = self.id, "subscription queue full, dropped oldest");
            }
        }
    }

    fn adjust_queued(
        &mut self,
        item_id: u32,
        delta: isize,
    ) {
        if let Some(item) = self.items.get_mut(&item_id) {
            item.queued = item.queued.saturating_add_signed(delta);
        }
    }

    /// Removes an item and every notification it still has queued.
    pub(crate) fn remove_item(
        &mut self,
        item_id: u32,
    ) -> Option<MonitoredItem> {
        let item = self.items.remove(&item_id)?;
        self.pending.retain(|p| p.item_id != item_id);
        Some(item)
    }

    fn has_data(&self) -> bool {
        self.publishing_enabled && !self.pending.is_empty()
    }

    /// Runs one publishing-interval tick.
    pub(crate) fn tick(
        &mut self,
        publish_available: bool,
    ) -> TickOutcome {
        self.next_due += self.interval();

        let keep_alive_due = if self.has_data() || self.late {
            false
        } else {
            self.keep_alive_counter += 1;
            if self.keep_alive_counter < self.params.max_keep_alive_count {
                return TickOutcome::Idle;
            }
            true
        };

        if publish_available {
            let message = if keep_alive_due {
                self.keep_alive_message()
            } else {
                self.take_message()
            };
            return TickOutcome::Publish(message);
        }

        self.late = true;
        self.lifetime_counter += 1;
        trace!(
            subscription_id = self.id,
            lifetime_counter = self.lifetime_counter,
            "publish opportunity missed"
        );
        if self.lifetime_counter >= self.params.lifetime_count {
            return TickOutcome::Expired(self.expiry_message());
        }
        TickOutcome::Missed
    }

    /// Message owed by a late subscription, or by a subscription the caller serves early.
    ///
    /// Data when anything is queued, a keep-alive otherwise.
    pub(crate) fn take_message(&mut self) -> NotificationMessage {
        if !self.has_data() {
            return self.keep_alive_message();
        }

        let limit = match self.params.max_notifications_per_publish {
            0 => usize::MAX,
            n => n as usize,
        };
        let count = self.pending.len().min(limit);
        let drained: Vec<PendingNotification> = self.pending.drain(..count).collect();
        let mut notifications = Vec::with_capacity(count);
        for pending in drained {
            self.adjust_queued(pending.item_id, -1);
            notifications.push(MonitoredItemNotification {
                client_handle: pending.client_handle,
                value: pending.value,
            });
        }

        let message = NotificationMessage {
            sequence_number: self.consume_sequence_number(),
            publish_time: timestamp_millis(),
            notification_data: vec![NotificationData::DataChange(notifications)],
        };
        self.reset_after_publish();
        // leftovers go out on the next publish request without waiting a tick
        self.late = self.has_data();
        message
    }

    /// Keep-alive carries the next sequence number without consuming it.
    fn keep_alive_message(&mut self) -> NotificationMessage {
        self.reset_after_publish();
        NotificationMessage {
            sequence_number: self.next_sequence_number,
            publish_time: timestamp_millis(),
            notification_data: Vec::new(),
        }
    }

    fn expiry_message(&mut self) -> NotificationMessage {
        self.closed = true;
        NotificationMessage {
            sequence_number: self.consume_sequence_number(),
            publish_time: timestamp_millis(),
            notification_data: vec![NotificationData::StatusChange(StatusCode::BadTimeout)],
        }
    }

    fn reset_after_publish(&mut self) {
        self.keep_alive_counter = 0;
        self.lifetime_counter = 0;
        self.late = false;
    }

    fn consume_sequence_number(&mut self) -> u32 {
        let sequence_number = self.next_sequence_number;
        // 0 is reserved
        self.next_sequence_number = self.next_sequence_number.checked_add(1).unwrap_or(1);
        sequence_number
    }

    /// More data remains queued after the last message.
    pub fn has_more(&self) -> bool {
        self.has_data()
    }
}
