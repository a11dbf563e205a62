//! Publish request queueing, the publish scheduler loop, acknowledgements and republish.
mod scheduler;

pub use scheduler::*;
