use serde::Deserialize;
use serde::Serialize;

use super::StatusCode;
use super::Variant;

/// A value together with its quality and timestamps (milliseconds since the Unix epoch).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    pub value: Variant,
    pub status: StatusCode,
    pub source_timestamp: Option<u64>,
    pub server_timestamp: u64,
}

impl DataValue {
    pub fn new(
        value: Variant,
        server_timestamp: u64,
    ) -> Self {
        Self {
            value,
            status: StatusCode::Good,
            source_timestamp: Some(server_timestamp),
            server_timestamp,
        }
    }

    /// Value-less result carrying only a status, used for failed reads.
    pub fn from_status(
        status: StatusCode,
        server_timestamp: u64,
    ) -> Self {
        Self {
            value: Variant::Empty,
            status,
            source_timestamp: None,
            server_timestamp,
        }
    }

    /// Change detection compares value and status only; timestamps never count as a change.
    pub fn is_changed_from(
        &self,
        other: &DataValue,
    ) -> bool {
        self.status != other.status || self.value != other.value
    }
}
