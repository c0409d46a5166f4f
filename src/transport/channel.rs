//! In-memory broker transport.
//!
//! [`ChannelConnector`] hands out pre-opened sessions backed by
//! [`tokio::sync::mpsc`] channels. The test side of each session is a
//! [`BrokerPeer`], which plays the broker: it scripts inbound frames,
//! observes what the bridge writes, and ends the stream by closing.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};

use super::{BrokerConnection, BrokerSink, BrokerStream, Connector};
use crate::error::TransportError;

struct Session {
    sink: ChannelSink,
    stream: ChannelStream,
    gate: Option<oneshot::Receiver<()>>,
}

/// Connector serving queued in-memory sessions, one per `connect` call.
///
/// With no session queued, `connect` fails with [`TransportError::Connect`].
#[derive(Default)]
pub struct ChannelConnector {
    sessions: Mutex<VecDeque<Session>>,
}

impl std::fmt::Debug for ChannelConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConnector").finish_non_exhaustive()
    }
}

impl ChannelConnector {
    /// Creates a connector with no sessions queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a session that connects immediately.
    pub async fn open_session(&self) -> BrokerPeer {
        let (peer, session) = pair(None);
        self.sessions.lock().await.push_back(session);
        peer
    }

    /// Queues a session whose handshake completes only once the returned
    /// [`ConnectGate`] is released.
    pub async fn open_gated_session(&self) -> (BrokerPeer, ConnectGate) {
        let (gate_tx, gate_rx) = oneshot::channel();
        let (peer, session) = pair(Some(gate_rx));
        self.sessions.lock().await.push_back(session);
        (peer, ConnectGate(gate_tx))
    }
}

fn pair(gate: Option<oneshot::Receiver<()>>) -> (BrokerPeer, Session) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let peer = BrokerPeer {
        inbound: Some(inbound_tx),
        outbound: outbound_rx,
    };
    let session = Session {
        sink: ChannelSink(outbound_tx),
        stream: ChannelStream(inbound_rx),
        gate,
    };
    (peer, session)
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, url: &str) -> Result<BrokerConnection, TransportError> {
        let session = self
            .sessions
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| TransportError::Connect(format!("no session queued for {url}")))?;

        if let Some(gate) = session.gate {
            gate.await
                .map_err(|_| TransportError::Connect("handshake abandoned".to_string()))?;
        }
        Ok((Box::new(session.sink), Box::new(session.stream)))
    }
}

/// Completes a gated handshake when released; dropping it fails the handshake.
#[derive(Debug)]
pub struct ConnectGate(oneshot::Sender<()>);

impl ConnectGate {
    /// Lets the pending `connect` call finish.
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

/// Broker side of an in-memory session.
#[derive(Debug)]
pub struct BrokerPeer {
    inbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl BrokerPeer {
    /// Sends a text frame to the bridge. Returns `false` once closed.
    pub fn send(&self, text: &str) -> bool {
        self.send_bytes(text.as_bytes().to_vec())
    }

    /// Sends a raw frame to the bridge. Returns `false` once closed.
    pub fn send_bytes(&self, bytes: Vec<u8>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(bytes).is_ok())
    }

    /// Ends the inbound stream; the bridge observes end-of-stream after
    /// draining frames already sent.
    pub fn close(&mut self) {
        self.inbound = None;
    }

    /// Makes every later bridge write fail, as a dead socket would.
    pub fn reject_writes(&mut self) {
        self.outbound.close();
    }

    /// Waits for the next frame written by the bridge.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Drains every frame the bridge has written so far.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

struct ChannelSink(mpsc::UnboundedSender<String>);

#[async_trait]
impl BrokerSink for ChannelSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.0
            .send(text)
            .map_err(|_| TransportError::Write("peer closed".to_string()))
    }
}

struct ChannelStream(mpsc::UnboundedReceiver<Vec<u8>>);

#[async_trait]
impl BrokerStream for ChannelStream {
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        self.0.recv().await.map(Ok)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn connect_without_session_fails() {
        let connector = ChannelConnector::new();
        let result = connector.connect("mem://broker").await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let connector = ChannelConnector::new();
        let mut peer = connector.open_session().await;
        let Ok((mut sink, mut stream)) = connector.connect("mem://broker").await else {
            panic!("connect failed");
        };

        assert!(peer.send(r#"{"type":"new"}"#));
        let Some(Ok(frame)) = stream.next_frame().await else {
            panic!("no inbound frame");
        };
        assert_eq!(frame, br#"{"type":"new"}"#.to_vec());

        assert_ok!(sink.send_text("hello".to_string()).await);
        assert_eq!(peer.recv().await.as_deref(), Some("hello"));

        peer.close();
        assert!(stream.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn rejected_writes_fail() {
        let connector = ChannelConnector::new();
        let mut peer = connector.open_session().await;
        let Ok((mut sink, _stream)) = connector.connect("mem://broker").await else {
            panic!("connect failed");
        };
        peer.reject_writes();
        assert_err!(sink.send_text("lost".to_string()).await);
    }

    #[tokio::test]
    async fn gated_session_waits_for_release() {
        let connector = std::sync::Arc::new(ChannelConnector::new());
        let (_peer, gate) = connector.open_gated_session().await;

        let dialer = std::sync::Arc::clone(&connector);
        let pending = tokio::spawn(async move { dialer.connect("mem://broker").await.is_ok() });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        gate.release();
        assert!(matches!(pending.await, Ok(true)));
    }

    #[tokio::test]
    async fn sessions_are_served_in_order() {
        let connector = ChannelConnector::new();
        let mut first = connector.open_session().await;
        let mut second = connector.open_session().await;

        let Ok((mut a, _)) = connector.connect("mem://broker").await else {
            panic!("first connect failed");
        };
        let Ok((mut b, _)) = connector.connect("mem://broker").await else {
            panic!("second connect failed");
        };
        assert_ok!(a.send_text("a".to_string()).await);
        assert_ok!(b.send_text("b".to_string()).await);
        assert_eq!(first.drain(), vec!["a".to_string()]);
        assert_eq!(second.drain(), vec!["b".to_string()]);
    }
}
