use crate::DataValue;
use crate::NodeId;

/// One sampled node attribute inside a subscription.
#[derive(Debug, Clone)]
pub struct MonitoredItem {
    pub(crate) id: u32,
    pub(crate) node_id: NodeId,
    pub(crate) attribute_id: u32,
    pub(crate) client_handle: u32,
    pub(crate) sampling_interval_ms: u64,
    pub(crate) queue_size: u32,
    pub(crate) last_sampled: Option<DataValue>,
    /// Last value put on the queue; change detection compares against it.
    pub(crate) last_reported: Option<DataValue>,
    /// Entries of this item currently in the subscription's pending queue.
    pub(crate) queued: usize,
}

impl MonitoredItem {
    pub(crate) fn new(
        id: u32,
        node_id: NodeId,
        attribute_id: u32,
        client_handle: u32,
        sampling_interval_ms: u64,
        queue_size: u32,
    ) -> Self {
        Self {
            id,
            node_id,
            attribute_id,
            client_handle,
            sampling_interval_ms,
            queue_size,
            last_sampled: None,
            last_reported: None,
            queued: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn client_handle(&self) -> u32 {
        self.client_handle
    }

    pub fn sampling_interval_ms(&self) -> u64 {
        self.sampling_interval_ms
    }

    pub fn queue_size(&self) -> u32 {
        self.queue_size
    }

    /// Records a sample; returns `true` when it must be reported.
    ///
    /// The first sample is always reported. Later samples are reported only when
    /// value or status changed; timestamps alone never count.
    pub(crate) fn observe(
        &mut self,
        sample: &DataValue,
    ) -> bool {
        self.last_sampled = Some(sample.clone());
        let changed = match &self.last_reported {
            None => true,
            Some(previous) => sample.is_changed_from(previous),
        };
        if changed {
            self.last_reported = Some(sample.clone());
        }
        changed
    }
}

/// Queued data change awaiting a publish response.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingNotification {
    pub(crate) item_id: u32,
    pub(crate) client_handle: u32,
    pub(crate) value: DataValue,
}
