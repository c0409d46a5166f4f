//! # coap-broker-bridge
//!
//! Bridges a local device-network controller (CoAP nodes in the reference
//! deployment) to a remote broker over a single persistent WebSocket.
//!
//! The bridge keeps one broker connection, turns broker commands into
//! controller calls, forwards controller events to the broker, and sweeps
//! dead nodes on a fixed period.
//!
//! ## Architecture
//!
//! ```text
//! Broker (WebSocket)
//!     │
//!     ├── Transport (transport/)      WsConnector, ChannelConnector
//!     ├── Codec (protocol/)           {"type": ...} in, {"command": ...} out
//!     │
//!     ├── Bridge (bridge/)            read loop, dispatch, forward, Outbox
//!     ├── LivenessScheduler           periodic check_dead_nodes
//!     │
//!     └── DeviceController (controller/)
//! ```

pub mod bridge;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod transport;
