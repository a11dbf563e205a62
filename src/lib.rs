//! Session and subscription engine of an OPC UA simulation server.
//!
//! A client connects over TCP, opens a secure channel, creates and activates a
//! session, then reads, writes and browses the address space or subscribes to
//! value changes. Subscriptions sample their monitored items, queue
//! notifications and answer the client's parked Publish requests on every
//! publishing interval.
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let server = ServerBuilder::new(None, shutdown_rx)?.build()?.ready()?;
//! server.run().await?;
//! ```

mod address_space;
mod channel;
mod config;
mod dispatcher;
mod errors;
mod metrics;
mod network;
mod publish;
mod server;
mod session;
mod simulation;
mod subscription;
mod types;
pub mod utils;

pub use address_space::*;
pub use channel::*;
pub use config::*;
pub use dispatcher::*;
pub use errors::*;
pub use metrics::*;
pub use network::*;
pub use publish::*;
pub use server::*;
pub use session::*;
pub use simulation::*;
pub use subscription::*;
pub use types::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
