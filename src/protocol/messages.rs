//! Broker message types: inbound commands and outbound notifications.

use serde::Serialize;

use crate::domain::NodeAddress;

/// Command received from the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// `{"type": "new"}`: a broker client connected and wants every node.
    New,
    /// `{"type": "update", "data": ...}`: a broker client updates a node.
    Update {
        /// Controller-defined payload, passed through verbatim.
        data: serde_json::Value,
    },
}

impl InboundMessage {
    /// Wire name of the message type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Update { .. } => "update",
        }
    }
}

/// Discriminator for outbound notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundCommand {
    /// A node is available.
    New,
    /// A node resource changed value.
    Update,
    /// A node was declared dead.
    Out,
}

/// Notification sent to the broker.
///
/// The `node` field is a [`NodeAddress`], so it is never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundNotification {
    /// What happened to the node.
    pub command: OutboundCommand,
    /// Address of the node concerned.
    pub node: NodeAddress,
    /// Resource path, for `update` notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Resource value, for `update` notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Protocol family of the bridge (e.g. `"coap"`).
    pub origin: String,
}

impl OutboundNotification {
    /// `{"command": "new", "node": ..., "origin": ...}`.
    #[must_use]
    pub fn new_node(node: NodeAddress, origin: impl Into<String>) -> Self {
        Self {
            command: OutboundCommand::New,
            node,
            endpoint: None,
            data: None,
            origin: origin.into(),
        }
    }

    /// `{"command": "update", "node": ..., "endpoint": ..., "data": ..., "origin": ...}`.
    #[must_use]
    pub fn update(
        node: NodeAddress,
        endpoint: impl Into<String>,
        data: serde_json::Value,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            command: OutboundCommand::Update,
            node,
            endpoint: Some(endpoint.into()),
            data: Some(data),
            origin: origin.into(),
        }
    }

    /// `{"command": "out", "node": ..., "origin": ...}`.
    #[must_use]
    pub fn out(node: NodeAddress, origin: impl Into<String>) -> Self {
        Self {
            command: OutboundCommand::Out,
            node,
            endpoint: None,
            data: None,
            origin: origin.into(),
        }
    }
}
