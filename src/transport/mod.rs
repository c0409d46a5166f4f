//! Broker transport seam.
//!
//! A [`Connector`] dials the broker and yields the two halves of one
//! ordered, message-oriented connection. The bridge owns both halves: the
//! [`BrokerStream`] in its read loop, the [`BrokerSink`] inside its
//! connection state.

pub mod channel;
pub mod ws;

use async_trait::async_trait;

use crate::error::TransportError;

pub use channel::{BrokerPeer, ChannelConnector};
pub use ws::WsConnector;

/// Write half of a broker connection.
#[async_trait]
pub trait BrokerSink: Send {
    /// Writes one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Write`] if the connection is stale or closed.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
}

/// Read half of a broker connection.
#[async_trait]
pub trait BrokerStream: Send {
    /// Waits for the next inbound frame.
    ///
    /// Returns `None` at end-of-stream.
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, TransportError>>;
}

/// Both halves of a freshly established connection.
pub type BrokerConnection = (Box<dyn BrokerSink>, Box<dyn BrokerStream>);

/// Establishes broker connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to `url` and waits for the handshake to complete.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] or
    /// [`TransportError::ConnectTimeout`] when no connection could be made.
    async fn connect(&self, url: &str) -> Result<BrokerConnection, TransportError>;
}
