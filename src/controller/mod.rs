//! Device controller seam.
//!
//! The bridge never talks to the device network directly. It drives a
//! [`DeviceController`], which owns the node table and node liveness, and it
//! hands the controller an [`crate::bridge::Outbox`] for anything the
//! controller wants to say to the broker.

pub mod memory;

use async_trait::async_trait;

use crate::domain::Node;
use crate::error::ControllerError;

pub use memory::InMemoryController;

/// Operations the bridge needs from the device-network controller.
///
/// Implementations must keep each call short or cooperative: the bridge
/// awaits them inline, so a long call delays inbound dispatch.
#[async_trait]
pub trait DeviceController: Send + Sync {
    /// Snapshot of currently known nodes, in a stable enumeration order.
    async fn nodes(&self) -> Vec<Node>;

    /// Pushes a full discovery notification for `node` toward the broker.
    async fn discover_node(&self, node: &Node);

    /// Delivers an opaque payload; the target node is named inside it.
    async fn send_data_to_node(&self, data: &serde_json::Value);

    /// Declares nodes silent for longer than the controller's timeout dead.
    ///
    /// Returns how many nodes were removed.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Sweep`] if the sweep could not complete.
    async fn check_dead_nodes(&self) -> Result<usize, ControllerError>;
}
