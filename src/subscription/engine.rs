use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::sampling::sample_members;
use super::sampling::SamplingGroup;
use super::sampling::SubscriptionMap;
use super::MonitoredItem;
use super::Subscription;
use super::SubscriptionParameters;
use super::TickOutcome;
use crate::metrics::ACTIVE_SUBSCRIPTIONS;
use crate::metrics::SUBSCRIPTIONS_EXPIRED_TOTAL;
use crate::AddressSpace;
use crate::MonitoredItemCreateRequest;
use crate::MonitoredItemCreateResult;
use crate::NodeId;
use crate::NotificationMessage;
use crate::StatusCode;
use crate::SubscriptionConfig;
use crate::SubscriptionError;

/// Client-requested subscription parameters, before revision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestedParameters {
    pub publishing_interval_ms: f64,
    pub lifetime_count: u32,
    pub max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
}

/// A subscription and its owning session.
///
/// The mutex guards the whole publish-cycle state; sampling, publishing and
/// deletion all go through it.
#[derive(Debug)]
pub struct SubscriptionEntry {
    pub(crate) session_id: NodeId,
    pub(crate) state: Mutex<Subscription>,
}

/// Scheduling view of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub subscription_id: u32,
    pub session_id: NodeId,
    pub next_due: Instant,
    pub priority: u8,
}

/// Owns every subscription and its monitored items, and the sampling timers.
#[derive(Debug)]
pub struct SubscriptionEngine {
    config: SubscriptionConfig,
    address_space: Arc<AddressSpace>,
    subscriptions: SubscriptionMap,
    groups: Mutex<HashMap<u64, SamplingGroup>>,
    next_subscription_id: AtomicU32,
    next_item_id: AtomicU32,
    schedule_changed: Notify,
    shutdown: CancellationToken,
}

impl SubscriptionEngine {
    pub fn new(
        config: SubscriptionConfig,
        address_space: Arc<AddressSpace>,
    ) -> Self {
        Self {
            config,
            address_space,
            subscriptions: Arc::new(DashMap::new()),
            groups: Mutex::new(HashMap::new()),
            next_subscription_id: AtomicU32::new(1),
            next_item_id: AtomicU32::new(1),
            schedule_changed: Notify::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Wakes when a subscription was created, modified or deleted.
    pub fn schedule_changed(&self) -> &Notify {
        &self.schedule_changed
    }

    pub fn revise_parameters(
        &self,
        requested: RequestedParameters,
    ) -> SubscriptionParameters {
        SubscriptionParameters {
            publishing_interval_ms: self.config.revise_publishing_interval(requested.publishing_interval_ms),
            lifetime_count: self.config.revise_lifetime_count(requested.lifetime_count),
            max_keep_alive_count: self.config.revise_keep_alive_count(requested.max_keep_alive_count),
            max_notifications_per_publish: self
                .config
                .revise_notifications_per_publish(requested.max_notifications_per_publish),
        }
    }

    pub fn create_subscription(
        &self,
        session_id: &NodeId,
        requested: RequestedParameters,
        publishing_enabled: bool,
        priority: u8,
    ) -> Result<(u32, SubscriptionParameters), SubscriptionError> {
        let owned = self.subscriptions_for_session(session_id).len();
        if owned >= self.config.max_subscriptions_per_session {
            return Err(SubscriptionError::TooManySubscriptions(
                self.config.max_subscriptions_per_session,
            ));
        }

        let params = self.revise_parameters(requested);
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let subscription = Subscription::new(
            id,
            session_id.clone(),
            params,
            publishing_enabled,
            priority,
            self.config.max_queued_notifications,
        );
        self.subscriptions.insert(
            id,
            Arc::new(SubscriptionEntry {
                session_id: session_id.clone(),
                state: Mutex::new(subscription),
            }),
        );
        ACTIVE_SUBSCRIPTIONS.inc();
        self.schedule_changed.notify_one();

        info!(
            subscription_id = id,
            %session_id,
            publishing_interval_ms = params.publishing_interval_ms,
            lifetime_count = params.lifetime_count,
            max_keep_alive_count = params.max_keep_alive_count,
            "subscription created"
        );
        Ok((id, params))
    }

    pub fn modify_subscription(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
        requested: RequestedParameters,
        priority: u8,
    ) -> Result<SubscriptionParameters, SubscriptionError> {
        let entry = self.entry_for(session_id, subscription_id)?;
        let params = self.revise_parameters(requested);
        {
            let mut subscription = entry.state.lock();
            subscription.update_params(params);
            subscription.priority = priority;
        }
        self.schedule_changed.notify_one();
        debug!(subscription_id, "subscription modified");
        Ok(params)
    }

    pub fn set_publishing_mode(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
        publishing_enabled: bool,
    ) -> Result<(), SubscriptionError> {
        let entry = self.entry_for(session_id, subscription_id)?;
        entry.state.lock().publishing_enabled = publishing_enabled;
        Ok(())
    }

    /// Removes a subscription with all its items and queued notifications.
    ///
    /// Idempotent; returns the owning session the first time.
    pub fn delete_subscription(
        &self,
        subscription_id: u32,
    ) -> Option<NodeId> {
        let (_, entry) = self.subscriptions.remove(&subscription_id)?;

        let removed: Vec<MonitoredItem> = {
            let mut subscription = entry.state.lock();
            subscription.closed = true;
            subscription.pending.clear();
            std::mem::take(&mut subscription.items).into_values().collect()
        };
        for item in &removed {
            self.leave_group(item.sampling_interval_ms, subscription_id, item.id);
        }

        ACTIVE_SUBSCRIPTIONS.dec();
        self.schedule_changed.notify_one();
        info!(subscription_id, items = removed.len(), "subscription deleted");
        Some(entry.session_id.clone())
    }

    /// Creates monitored items; each request gets its own result.
    pub fn create_monitored_items(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
        requests: &[MonitoredItemCreateRequest],
    ) -> Result<Vec<MonitoredItemCreateResult>, SubscriptionError> {
        let entry = self.entry_for(session_id, subscription_id)?;

        // groups are joined under the subscription lock, which deletion also takes
        let mut subscription = entry.state.lock();
        if subscription.closed {
            return Err(SubscriptionError::NotFound(subscription_id));
        }
        let publishing_interval_ms = subscription.params.publishing_interval_ms;

        let results = requests
            .iter()
            .map(|request| {
                if subscription.items.len() >= self.config.max_monitored_items_per_subscription {
                    return failed_item(StatusCode::BadTooManyMonitoredItems);
                }
                let target = &request.item_to_monitor;
                if let Err(e) = self.address_space.get_attribute(&target.node_id, target.attribute_id) {
                    debug!(node_id = %target.node_id, error = %e, "monitored item rejected");
                    return failed_item(e.status_code());
                }

                let sampling_interval_ms = self
                    .config
                    .revise_sampling_interval(request.sampling_interval, publishing_interval_ms);
                let queue_size = self.config.revise_queue_size(request.queue_size);
                let item_id = self.next_item_id.fetch_add(1, Ordering::Relaxed);

                subscription.items.insert(
                    item_id,
                    MonitoredItem::new(
                        item_id,
                        target.node_id.clone(),
                        target.attribute_id,
                        request.client_handle,
                        sampling_interval_ms,
                        queue_size,
                    ),
                );
                self.join_group(sampling_interval_ms, subscription_id, item_id);

                MonitoredItemCreateResult {
                    status_code: StatusCode::Good,
                    monitored_item_id: item_id,
                    revised_sampling_interval: sampling_interval_ms as f64,
                    revised_queue_size: queue_size,
                }
            })
            .collect();
        Ok(results)
    }

    pub fn delete_monitored_items(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
        item_ids: &[u32],
    ) -> Result<Vec<StatusCode>, SubscriptionError> {
        let entry = self.entry_for(session_id, subscription_id)?;
        let mut left = Vec::new();

        let results = {
            let mut subscription = entry.state.lock();
            item_ids
                .iter()
                .map(|item_id| match subscription.remove_item(*item_id) {
                    Some(item) => {
                        left.push((item.sampling_interval_ms, item.id));
                        StatusCode::Good
                    }
                    None => SubscriptionError::MonitoredItemNotFound(*item_id).status_code(),
                })
                .collect()
        };

        for (interval_ms, item_id) in left {
            self.leave_group(interval_ms, subscription_id, item_id);
        }
        Ok(results)
    }

    /// Runs one publishing-interval tick of a subscription.
    ///
    /// An expired subscription is deleted here; the returned outcome still
    /// carries the status-change message for the client.
    pub fn on_publishing_interval(
        &self,
        subscription_id: u32,
        publish_available: bool,
    ) -> Option<TickOutcome> {
        let entry = self.entry(subscription_id)?;
        let outcome = {
            let mut subscription = entry.state.lock();
            if subscription.closed {
                return None;
            }
            subscription.tick(publish_available)
        };

        if let TickOutcome::Expired(_) = outcome {
            warn!(subscription_id, session_id = %entry.session_id, "subscription lifetime expired");
            SUBSCRIPTIONS_EXPIRED_TOTAL.inc();
            self.delete_subscription(subscription_id);
        }
        Some(outcome)
    }

    /// Owes the next publish request a message; used when a delivery found no live request.
    pub fn mark_late(
        &self,
        subscription_id: u32,
    ) {
        if let Some(entry) = self.entry(subscription_id) {
            let mut subscription = entry.state.lock();
            if !subscription.closed {
                subscription.late = true;
            }
        }
    }

    /// Message owed by a late subscription, with the more-notifications flag.
    pub fn take_late_message(
        &self,
        subscription_id: u32,
    ) -> Option<(NotificationMessage, bool)> {
        let entry = self.entry(subscription_id)?;
        let mut subscription = entry.state.lock();
        if subscription.closed || !subscription.late {
            return None;
        }
        let message = subscription.take_message();
        Some((message, subscription.has_more()))
    }

    pub fn is_late(
        &self,
        subscription_id: u32,
    ) -> bool {
        self.entry(subscription_id)
            .map(|entry| entry.state.lock().late)
            .unwrap_or(false)
    }

    pub fn has_more(
        &self,
        subscription_id: u32,
    ) -> bool {
        self.entry(subscription_id)
            .map(|entry| entry.state.lock().has_more())
            .unwrap_or(false)
    }

    /// Next due time of every live subscription.
    pub fn schedule(&self) -> Vec<ScheduleEntry> {
        let entries: Vec<Arc<SubscriptionEntry>> = self.subscriptions.iter().map(|e| e.value().clone()).collect();
        entries
            .iter()
            .filter_map(|entry| {
                let subscription = entry.state.lock();
                (!subscription.closed).then(|| ScheduleEntry {
                    subscription_id: subscription.id,
                    session_id: entry.session_id.clone(),
                    next_due: subscription.next_due,
                    priority: subscription.priority,
                })
            })
            .collect()
    }

    pub fn session_of(
        &self,
        subscription_id: u32,
    ) -> Option<NodeId> {
        self.subscriptions
            .get(&subscription_id)
            .map(|entry| entry.session_id.clone())
    }

    pub fn subscriptions_for_session(
        &self,
        session_id: &NodeId,
    ) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .subscriptions
            .iter()
            .filter(|entry| &entry.session_id == session_id)
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Read-only view of a subscription's state.
    pub fn with_subscription<R>(
        &self,
        subscription_id: u32,
        f: impl FnOnce(&Subscription) -> R,
    ) -> Option<R> {
        let entry = self.entry(subscription_id)?;
        let subscription = entry.state.lock();
        Some(f(&subscription))
    }

    /// Samples every item of one interval immediately, outside its timer.
    pub fn sample_interval(
        &self,
        interval_ms: u64,
    ) {
        let members = self.groups.lock().get(&interval_ms).map(|g| g.members.clone());
        if let Some(members) = members {
            sample_members(&members, &self.subscriptions, &self.address_space);
        }
    }

    /// Distinct sampling intervals with a running timer.
    pub fn sampling_intervals(&self) -> Vec<u64> {
        let mut intervals: Vec<u64> = self.groups.lock().keys().copied().collect();
        intervals.sort_unstable();
        intervals
    }

    /// Stops every sampling timer. Subscriptions stay in place.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.groups.lock().clear();
        self.schedule_changed.notify_waiters();
    }

    fn entry(
        &self,
        subscription_id: u32,
    ) -> Option<Arc<SubscriptionEntry>> {
        self.subscriptions.get(&subscription_id).map(|e| e.value().clone())
    }

    /// Subscription owned by `session_id`; someone else's id is reported as unknown.
    fn entry_for(
        &self,
        session_id: &NodeId,
        subscription_id: u32,
    ) -> Result<Arc<SubscriptionEntry>, SubscriptionError> {
        match self.entry(subscription_id) {
            Some(entry) if &entry.session_id == session_id => Ok(entry),
            _ => Err(SubscriptionError::NotFound(subscription_id)),
        }
    }

    fn join_group(
        &self,
        interval_ms: u64,
        subscription_id: u32,
        item_id: u32,
    ) {
        let mut groups = self.groups.lock();
        let group = groups.entry(interval_ms).or_insert_with(|| {
            SamplingGroup::spawn(
                interval_ms,
                self.subscriptions.clone(),
                self.address_space.clone(),
                self.shutdown.child_token(),
            )
        });
        group.add(subscription_id, item_id);
    }

    fn leave_group(
        &self,
        interval_ms: u64,
        subscription_id: u32,
        item_id: u32,
    ) {
        let mut groups = self.groups.lock();
        let now_empty = match groups.get(&interval_ms) {
            Some(group) => group.remove(subscription_id, item_id),
            None => return,
        };
        if now_empty {
            if let Some(group) = groups.remove(&interval_ms) {
                group.stop();
                debug!(interval_ms, "sampling group released");
            }
        }
    }
}

fn failed_item(status_code: StatusCode) -> MonitoredItemCreateResult {
    MonitoredItemCreateResult {
        status_code,
        monitored_item_id: 0,
        revised_sampling_interval: 0.0,
        revised_queue_size: 0,
    }
}
