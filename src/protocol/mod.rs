//! Broker wire protocol: JSON text frames in both directions.
//!
//! Inbound (broker → bridge):
//!
//! ```text
//! {"type": "new"}
//! {"type": "update", "data": <controller-defined payload>}
//! ```
//!
//! Outbound (bridge → broker):
//!
//! ```text
//! {"command": "new", "node": "<address>", "origin": "<tag>"}
//! ```

pub mod codec;
pub mod messages;

pub use codec::{decode_inbound, encode_outbound};
pub use messages::{InboundMessage, OutboundCommand, OutboundNotification};
