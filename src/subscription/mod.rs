//! Subscriptions, monitored items and their sampling timers.
//!
//! A [`Subscription`] carries the publish-cycle state machine (keep-alive and
//! lifetime counters, sequence numbers, the pending notification queue). The
//! [`SubscriptionEngine`] owns all of them and runs one sampling task per
//! distinct sampling interval.
mod engine;
mod monitored_item;
mod sampling;
mod state;

pub use engine::*;
pub use monitored_item::*;
pub use state::*;
