//! Transport trait abstraction for the command bus

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Events a transport feeds into the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connected (or reconnected) to the broker
    Connected,
    /// A message arrived on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// Connection lost or closed
    Closed { reason: String },
}

/// A publish/subscribe client delivering command payloads
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Subscribe to a topic
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Close the connection, completing once it is closed
    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
