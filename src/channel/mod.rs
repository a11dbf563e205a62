//! Secure Channel Manager.
mod manager;
mod security_policy;

pub use manager::*;
pub use security_policy::*;

#[cfg(test)]
mod channel_test;
