//! Domain layer: node identity shared by the bridge and controllers.

pub mod node;

pub use node::{Node, NodeAddress};
