//! WebSocket broker transport built on `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{BrokerConnection, BrokerSink, BrokerStream, Connector};
use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials `ws://` / `wss://` broker URLs.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// Creates a connector that gives up on a handshake after `connect_timeout`.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<BrokerConnection, TransportError> {
        let timeout_ms = u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX);
        let (socket, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| TransportError::ConnectTimeout(timeout_ms))?
                .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (ws_tx, ws_rx) = socket.split();
        Ok((Box::new(WsSink(ws_tx)), Box::new(WsReader(ws_rx))))
    }
}

struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl BrokerSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.0
            .send(Message::text(text))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}

struct WsReader(SplitStream<WsStream>);

#[async_trait]
impl BrokerStream for WsReader {
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().as_bytes().to_vec())),
                Ok(Message::Binary(bytes)) => return Some(Ok(bytes.to_vec())),
                Ok(Message::Close(_)) => return None,
                // Ping/pong are answered by tungstenite itself.
                Ok(_) => {}
                Err(e) => return Some(Err(TransportError::Read(e.to_string()))),
            }
        }
    }
}
