//! Bridge error types.
//!
//! Every failure the bridge can observe is absorbed where it happens and
//! logged; only [`BridgeError::Connect`] is ever returned to the host.
//!
//! | Type                 | Raised by             | Recovery                          |
//! |----------------------|-----------------------|-----------------------------------|
//! | [`BridgeError`]      | `Bridge::connect/run` | fatal unless a reconnect policy   |
//! | [`ProtocolError`]    | codec                 | message dropped, loop continues   |
//! | [`TransportError`]   | transport             | write half cleared                |
//! | [`ControllerError`]  | device controller     | logged, next tick / message       |
//! | [`NodeAddressError`] | `NodeAddress::new`    | address rejected                  |

/// Errors returned from the bridge's connection lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The broker handshake failed or timed out.
    #[error("cannot connect to broker at {url}: {source}")]
    Connect {
        /// Broker URL that was dialled.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
}

/// Inbound broker message could not be turned into an action.
///
/// All variants except [`ProtocolError::UnknownType`] are decode errors;
/// `UnknownType` is a protocol violation (the message was well-formed but
/// names a command this bridge does not speak).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Payload is not valid JSON.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Payload is valid JSON but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// The `type` field is absent or not a string.
    #[error("message has no `type` field")]
    MissingType,

    /// An `update` message without a `data` field.
    #[error("`update` message has no `data` field")]
    MissingData,

    /// The `type` field names an unsupported command.
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

impl ProtocolError {
    /// Returns `true` for protocol violations, `false` for decode errors.
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        matches!(self, Self::UnknownType(_))
    }
}

/// Failures of the broker transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection attempt was refused or the handshake failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The handshake did not complete in time.
    #[error("connect timed out after {0} ms")]
    ConnectTimeout(u64),

    /// Writing to the connection failed (stale or closed handle).
    #[error("write failed: {0}")]
    Write(String),

    /// Reading from the connection failed.
    #[error("read failed: {0}")]
    Read(String),
}

/// Failures reported by a device controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    /// The payload addresses a node the controller does not know.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// The payload does not follow the controller's addressing convention.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The dead-node sweep could not complete.
    #[error("sweep failed: {0}")]
    Sweep(String),
}

/// A node address failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeAddressError {
    /// Address is empty or whitespace only.
    #[error("node address must not be empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unknown_type_is_a_violation() {
        assert!(ProtocolError::UnknownType("delete".to_string()).is_violation());
        assert!(!ProtocolError::MissingType.is_violation());
        assert!(!ProtocolError::MissingData.is_violation());
        assert!(!ProtocolError::NotAnObject.is_violation());
        assert!(!ProtocolError::Malformed("eof".to_string()).is_violation());
    }

    #[test]
    fn connect_error_names_url_and_cause() {
        let err = BridgeError::Connect {
            url: "ws://broker:8000/broker".to_string(),
            source: TransportError::ConnectTimeout(500),
        };
        let msg = err.to_string();
        assert!(msg.contains("ws://broker:8000/broker"));
        assert!(msg.contains("500 ms"));
    }
}
