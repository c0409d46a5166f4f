//! Broker bridge: connection lifecycle, inbound dispatch, outbound forwarding.
//!
//! A [`Bridge`] is driven by a single task. That task owns the read half of
//! the broker connection, the write half (inside [`ConnectionStatus::Connected`]),
//! and the receiving end of the [`Outbox`]. Inbound frames are handled
//! strictly in arrival order, and nothing else ever writes to the broker.
//!
//! ```text
//! broker ──frame──▶ read_loop ──decode──▶ dispatch ──▶ DeviceController
//!                       ▲                     │
//!                       │                     └──"new" per node──▶ broker
//! DeviceController ──Outbox──▶ forward ─────────────────────────▶ broker
//! ```

pub mod outbox;
pub mod reconnect;

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, Span};

use crate::controller::DeviceController;
use crate::error::BridgeError;
use crate::protocol::{InboundMessage, OutboundNotification, decode_inbound, encode_outbound};
use crate::scheduler::{LivenessHandle, LivenessScheduler};
use crate::transport::{BrokerSink, BrokerStream, Connector};

pub use outbox::{Outbox, OutboxReceiver};
pub use reconnect::ReconnectPolicy;

/// Tunables for a [`Bridge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Tag placed in the `origin` field of outbound notifications.
    pub origin: String,
    /// Period of the dead-node sweep.
    pub sweep_interval: Duration,
    /// What to do after a session ends or a connect fails.
    pub reconnect: ReconnectPolicy,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            origin: "coap".to_string(),
            sweep_interval: Duration::from_secs(1),
            reconnect: ReconnectPolicy::Never,
        }
    }
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No broker connection; forwarded messages are dropped.
    Disconnected,
    /// Handshake in progress; forwarded messages are dropped.
    Connecting,
    /// Broker connection established.
    Connected,
}

enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(Box<dyn BrokerSink>),
}

impl ConnectionState {
    const fn status(&self) -> ConnectionStatus {
        match self {
            Self::Disconnected => ConnectionStatus::Disconnected,
            Self::Connecting => ConnectionStatus::Connecting,
            Self::Connected(_) => ConnectionStatus::Connected,
        }
    }
}

/// Counters kept by the bridge over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Frames received from the broker.
    pub inbound: u64,
    /// Frames that could not be decoded.
    pub decode_errors: u64,
    /// Well-formed frames with an unsupported `type`.
    pub protocol_violations: u64,
    /// `new` notifications written in reply to broker `new` commands.
    pub notifications_written: u64,
    /// Controller messages written to the broker.
    pub forwarded: u64,
    /// Controller messages dropped for lack of a connection.
    pub dropped: u64,
}

/// Mediates all traffic between the broker and a [`DeviceController`].
pub struct Bridge {
    controller: Arc<dyn DeviceController>,
    connector: Arc<dyn Connector>,
    outbox: OutboxReceiver,
    origin: String,
    reconnect: ReconnectPolicy,
    state: ConnectionState,
    stats: BridgeStats,
    liveness: LivenessHandle,
    span: Span,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("origin", &self.origin)
            .field("status", &self.status())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Creates a disconnected bridge and starts the dead-node sweep.
    ///
    /// `outbox` is the receiving end of the [`Outbox`] handed to the
    /// controller. Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        controller: Arc<dyn DeviceController>,
        connector: Arc<dyn Connector>,
        outbox: OutboxReceiver,
        settings: BridgeSettings,
    ) -> Self {
        let span = tracing::info_span!(
            "bridge",
            origin = %settings.origin,
            session = tracing::field::Empty
        );
        let liveness = LivenessScheduler::new(Arc::clone(&controller), settings.sweep_interval)
            .with_span(tracing::info_span!(parent: &span, "liveness"))
            .start();

        Self {
            controller,
            connector,
            outbox,
            origin: settings.origin,
            reconnect: settings.reconnect,
            state: ConnectionState::Disconnected,
            stats: BridgeStats::default(),
            liveness,
            span,
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Handle of the dead-node sweep started at construction.
    #[must_use]
    pub const fn liveness(&self) -> &LivenessHandle {
        &self.liveness
    }

    /// Runs sessions against `url` under the configured [`ReconnectPolicy`].
    ///
    /// With [`ReconnectPolicy::Never`] this is a single [`Bridge::connect`].
    ///
    /// # Errors
    ///
    /// Returns the last [`BridgeError::Connect`] once the policy gives up
    /// after a failed connect.
    pub async fn run(mut self, url: &str) -> Result<(), BridgeError> {
        let mut failures: u32 = 0;
        loop {
            let outcome = self.connect(url).await;
            failures = match outcome {
                Ok(()) => 0,
                Err(_) => failures.saturating_add(1),
            };

            let Some(delay) = self.reconnect.next_delay(failures) else {
                return outcome;
            };
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            tracing::info!(parent: &self.span, delay_ms, "reconnecting to broker");
            self.idle(delay).await;
        }
    }

    /// Connects to the broker and runs the read loop until end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Connect`] if the handshake fails.
    pub async fn connect(&mut self, url: &str) -> Result<(), BridgeError> {
        self.span
            .record("session", tracing::field::display(uuid::Uuid::new_v4()));
        let span = self.span.clone();
        self.session(url).instrument(span).await
    }

    async fn session(&mut self, url: &str) -> Result<(), BridgeError> {
        let stream = self.establish(url).await?;
        self.read_loop(stream).await;
        Ok(())
    }

    async fn establish(&mut self, url: &str) -> Result<Box<dyn BrokerStream>, BridgeError> {
        self.state = ConnectionState::Connecting;
        self.discard_queued();
        tracing::info!(url, "connecting to broker");

        let connector = Arc::clone(&self.connector);
        let handshake = connector.connect(url);
        tokio::pin!(handshake);

        let result = loop {
            tokio::select! {
                result = &mut handshake => break result,
                Some(message) = self.outbox.recv() => {
                    self.forward(message).await;
                }
            }
        };

        self.discard_queued();
        match result {
            Ok((sink, stream)) => {
                self.state = ConnectionState::Connected(sink);
                tracing::info!("connected to broker");
                Ok(stream)
            }
            Err(source) => {
                self.state = ConnectionState::Disconnected;
                tracing::error!(error = %source, "cannot connect to broker");
                Err(BridgeError::Connect {
                    url: url.to_string(),
                    source,
                })
            }
        }
    }

    async fn read_loop(&mut self, mut stream: Box<dyn BrokerStream>) {
        loop {
            tokio::select! {
                frame = stream.next_frame() => match frame {
                    Some(Ok(bytes)) => self.handle_frame(&bytes).await,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "broker read failed, ending session");
                        break;
                    }
                    None => {
                        tracing::info!("connection with broker lost");
                        break;
                    }
                },
                Some(message) = self.outbox.recv() => {
                    self.forward(message).await;
                }
            }
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Drops whatever the controller queued while there was no connection.
    fn discard_queued(&mut self) {
        while let Ok(message) = self.outbox.try_recv() {
            self.stats.dropped += 1;
            tracing::debug!(%message, "no broker connection, message dropped");
        }
    }

    /// Drops outbox traffic while waiting between sessions.
    async fn idle(&mut self, delay: Duration) {
        let pause = tokio::time::sleep(delay);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                () = &mut pause => return,
                Some(message) = self.outbox.recv() => {
                    self.forward(message).await;
                }
            }
        }
    }

    /// Decodes one inbound frame and dispatches it.
    ///
    /// Undecodable frames and unknown message types are logged and dropped.
    pub async fn handle_frame(&mut self, bytes: &[u8]) {
        self.stats.inbound += 1;
        tracing::debug!(message = %String::from_utf8_lossy(bytes), "handling message from broker");

        match decode_inbound(bytes) {
            Ok(message) => self.dispatch(message).await,
            Err(e) if e.is_violation() => {
                self.stats.protocol_violations += 1;
                tracing::warn!(error = %e, "protocol violation from broker, message dropped");
            }
            Err(e) => {
                self.stats.decode_errors += 1;
                tracing::warn!(error = %e, "undecodable broker message dropped");
            }
        }
    }

    /// Applies one broker command.
    ///
    /// `new` writes one notification per known node, in controller order,
    /// and asks the controller to rediscover each. `update` hands the
    /// payload to the controller unchanged.
    pub async fn dispatch(&mut self, message: InboundMessage) {
        tracing::debug!(kind = message.kind(), "dispatching broker command");
        match message {
            InboundMessage::New => {
                let nodes = self.controller.nodes().await;
                tracing::debug!(count = nodes.len(), "announcing known nodes");
                for node in &nodes {
                    let notification =
                        OutboundNotification::new_node(node.address.clone(), &self.origin);
                    if self.write(encode_outbound(&notification)).await {
                        self.stats.notifications_written += 1;
                    }
                    self.controller.discover_node(node).await;
                }
            }
            InboundMessage::Update { data } => {
                self.controller.send_data_to_node(&data).await;
            }
        }
    }

    /// Writes a pre-encoded controller message if connected, otherwise drops it.
    ///
    /// Returns `true` if the message was written.
    pub async fn forward(&mut self, message: String) -> bool {
        if !matches!(self.state, ConnectionState::Connected(_)) {
            self.stats.dropped += 1;
            tracing::debug!(%message, "no broker connection, message dropped");
            return false;
        }

        tracing::debug!(%message, "forwarding message to broker");
        let written = self.write(message).await;
        if written {
            self.stats.forwarded += 1;
        } else {
            self.stats.dropped += 1;
        }
        written
    }

    /// Writes through the connection handle; a failed write clears it.
    async fn write(&mut self, text: String) -> bool {
        let ConnectionState::Connected(sink) = &mut self.state else {
            return false;
        };
        match sink.send_text(text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "broker write failed, dropping connection handle");
                self.state = ConnectionState::Disconnected;
                false
            }
        }
    }
}
