//! Session Manager.
mod manager;

pub use manager::*;

#[cfg(test)]
mod session_test;
