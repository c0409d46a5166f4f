//! Pure mapping between broker wire text and message types.

use serde_json::Value;

use super::messages::{InboundMessage, OutboundNotification};
use crate::error::ProtocolError;

/// Decodes one inbound broker frame.
///
/// # Errors
///
/// - [`ProtocolError::Malformed`] if `bytes` is not JSON.
/// - [`ProtocolError::NotAnObject`] if the JSON is not an object.
/// - [`ProtocolError::MissingType`] if `type` is absent or not a string.
/// - [`ProtocolError::MissingData`] for an `update` without `data`.
/// - [`ProtocolError::UnknownType`] for any other `type`.
pub fn decode_inbound(bytes: &[u8]) -> Result<InboundMessage, ProtocolError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(ProtocolError::NotAnObject);
    };

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(ProtocolError::MissingType)?;

    match kind.as_str() {
        "new" => Ok(InboundMessage::New),
        "update" => {
            let data = object.remove("data").ok_or(ProtocolError::MissingData)?;
            Ok(InboundMessage::Update { data })
        }
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

/// Encodes an outbound notification as JSON text.
#[must_use]
pub fn encode_outbound(notification: &OutboundNotification) -> String {
    // Strings, an enum tag and an already-valid JSON value: cannot fail.
    serde_json::to_string(notification).unwrap_or_default()
}
