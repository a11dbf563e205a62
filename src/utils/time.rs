use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Wall-clock time since the Unix epoch; zero if the clock is set before 1970.
pub fn get_duration_since_epoch() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// Milliseconds since the Unix epoch, the unit of every protocol timestamp.
pub fn timestamp_millis() -> u64 {
    get_duration_since_epoch().as_millis() as u64
}

/// Timestamp for a new value that never goes below `previous`, so a node's
/// server timestamp stays monotonic under wall-clock adjustments.
pub fn monotonic_after(previous: u64) -> u64 {
    timestamp_millis().max(previous)
}
