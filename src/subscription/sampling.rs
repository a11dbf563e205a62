use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::SubscriptionEntry;
use crate::utils::time::timestamp_millis;
use crate::AddressSpace;
use crate::DataValue;

/// subscription id -> monitored item ids sampled by one group
pub(crate) type GroupMembers = Arc<Mutex<BTreeMap<u32, BTreeSet<u32>>>>;

pub(crate) type SubscriptionMap = Arc<DashMap<u32, Arc<SubscriptionEntry>>>;

/// One timer per distinct sampling interval, fanned out to every item using it.
#[derive(Debug)]
pub(crate) struct SamplingGroup {
    pub(crate) members: GroupMembers,
    cancel: CancellationToken,
}

impl SamplingGroup {
    /// Starts the group's timer; the first tick fires one interval from now.
    pub(crate) fn spawn(
        interval_ms: u64,
        subscriptions: SubscriptionMap,
        address_space: Arc<AddressSpace>,
        cancel: CancellationToken,
    ) -> Self {
        let members: GroupMembers = Arc::new(Mutex::new(BTreeMap::new()));
        let period = Duration::from_millis(interval_ms);

        let task_members = members.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(interval_ms, "sampling group started");
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => sample_members(&task_members, &subscriptions, &address_space),
                }
            }
            debug!(interval_ms, "sampling group stopped");
        });

        Self { members, cancel }
    }

    pub(crate) fn add(
        &self,
        subscription_id: u32,
        item_id: u32,
    ) {
        self.members.lock().entry(subscription_id).or_default().insert(item_id);
    }

    /// Returns `true` when the group has no members left.
    pub(crate) fn remove(
        &self,
        subscription_id: u32,
        item_id: u32,
    ) -> bool {
        let mut members = self.members.lock();
        if let Some(items) = members.get_mut(&subscription_id) {
            items.remove(&item_id);
            if items.is_empty() {
                members.remove(&subscription_id);
            }
        }
        members.is_empty()
    }

    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Samples every member item once.
///
/// Items are looked up again under their subscription's lock, the same lock
/// deletion takes, so a deleted item is never sampled.
pub(crate) fn sample_members(
    members: &GroupMembers,
    subscriptions: &DashMap<u32, Arc<SubscriptionEntry>>,
    address_space: &AddressSpace,
) {
    let snapshot: Vec<(u32, Vec<u32>)> = members
        .lock()
        .iter()
        .map(|(sub, items)| (*sub, items.iter().copied().collect()))
        .collect();

    for (subscription_id, item_ids) in snapshot {
        let entry = match subscriptions.get(&subscription_id) {
            Some(entry) => entry.value().clone(),
            None => continue,
        };
        let mut subscription = entry.state.lock();
        if subscription.closed {
            continue;
        }
        for item_id in item_ids {
            let target = match subscription.items.get(&item_id) {
                Some(item) => (item.node_id.clone(), item.attribute_id),
                None => continue,
            };
            let value = address_space
                .get_attribute(&target.0, target.1)
                .unwrap_or_else(|e| DataValue::from_status(e.status_code(), timestamp_millis()));
            subscription.sample(item_id, value);
        }
    }
}
