//! Controller-to-broker message channel.
//!
//! [`Outbox`] wraps a [`tokio::sync::mpsc`] unbounded sender. Controllers
//! hold a clone and push pre-encoded frames; the bridge task drains the
//! receiving end and passes each frame to `Bridge::forward`, which keeps the
//! bridge the only writer on the broker connection.

use tokio::sync::mpsc;

use crate::protocol::{OutboundNotification, encode_outbound};

/// Receiving end of an [`Outbox`], owned by the bridge.
pub type OutboxReceiver = mpsc::UnboundedReceiver<String>;

/// Cloneable sender for frames destined to the broker.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: mpsc::UnboundedSender<String>,
}

impl Outbox {
    /// Creates an outbox and the receiver the bridge consumes.
    #[must_use]
    pub fn channel() -> (Self, OutboxReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queues a pre-encoded frame for the bridge.
    ///
    /// Returns `false` if the bridge is gone, in which case the frame is
    /// dropped. Delivery to the broker is best effort either way.
    pub fn send(&self, message: String) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Encodes and queues a notification.
    pub fn notify(&self, notification: &OutboundNotification) -> bool {
        self.send(encode_outbound(notification))
    }
}
