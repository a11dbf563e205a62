//! Transport layer: framing, endpoint addressing and the per-connection
//! state machine that feeds the request dispatcher.
//!
//! Every connection starts with a HEL/ACK exchange, opens one secure channel
//! with OPN and then carries service requests in MSG frames until CLO or EOF.
mod codec;
mod connection;
mod endpoint_url;
mod listener;

pub use codec::*;
pub use connection::*;
pub use endpoint_url::*;
pub use listener::*;
