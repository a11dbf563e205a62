//! Simulated plant sensors feeding the address space.
mod driver;
mod model;

pub use driver::*;
pub use model::*;
