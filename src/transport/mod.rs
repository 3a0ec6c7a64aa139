pub mod mqtt;
#[cfg(test)]
pub mod mock;
pub mod traits;

pub use mqtt::MqttTransport;
pub use traits::{CommandTransport, TransportEvent};
