//! Transport interface and the events flowing into the bridge service.
//!
//! A transport delivers [`TransportEvent`]s over an mpsc channel and
//! accepts fire-and-forget publishes. The host side delivers
//! [`HostRequest`]s over a second channel.

use async_trait::async_trait;
use thiserror::Error;

use crate::mdl::DeviceHandle;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Link is down; the request was dropped
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// Client rejected the request
    #[error("Client error: {0}")]
    Client(String),
}

/// Event emitted by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection (re-)established
    Connected,
    /// Connection lost
    Disconnected,
    /// Broker acknowledged a subscription
    Subscribed,
    /// Inbound publish
    Message { topic: String, payload: Vec<u8> },
}

/// Request raised by the host registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    /// Operator command for a device
    Command {
        handle: DeviceHandle,
        command: String,
        level: u8,
        /// Serialized color object, only meaningful for "Set Color"
        color: Option<String>,
    },
    /// A record was edited (renamed, re-configured)
    DeviceModified(DeviceHandle),
    /// A record was deleted
    DeviceRemoved(DeviceHandle),
}

/// Publish/subscribe link to the hub's broker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload. Returns once the request is queued.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> TransportResult<()>;

    /// Subscribe to a set of topic filters at QoS 0.
    async fn subscribe(&self, filters: &[String]) -> TransportResult<()>;

    fn is_connected(&self) -> bool;

    /// Ask the transport to re-establish the link now.
    async fn reconnect(&self) -> TransportResult<()>;
}
