//! Address Space Store: node metadata and live values.
mod node;
mod store;

pub use node::*;
pub use store::*;

#[cfg(test)]
mod address_space_test;
