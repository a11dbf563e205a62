//! Server assembly: the shared component graph, its builder, and the running
//! server with its background tasks.
mod builder;
mod context;
mod server;

pub use builder::*;
pub use context::*;
pub use server::*;

#[cfg(test)]
mod context_test;
#[cfg(test)]
mod server_test;
