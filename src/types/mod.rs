mod attribute;
mod channel_messages;
mod data_value;
mod node_id;
mod services;
mod status_code;
mod variant;

pub use attribute::*;
pub use channel_messages::*;
pub use data_value::*;
pub use node_id::*;
pub use services::*;
pub use status_code::*;
pub use variant::*;

#[cfg(test)]
mod node_id_test;
#[cfg(test)]
mod types_test;
