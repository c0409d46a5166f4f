//! Device-network node identity.
//!
//! [`NodeAddress`] is a validated newtype so that every address the bridge
//! puts on the wire is non-empty. [`Node`] is the read-only view of a device
//! that controllers hand to the bridge.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NodeAddressError;

/// Opaque, stable identifier of a node on the device network.
///
/// Guaranteed non-empty: the only constructors go through
/// [`NodeAddress::new`], including deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Creates an address from any string-like value.
    ///
    /// # Errors
    ///
    /// Returns [`NodeAddressError::Empty`] if the value is empty or only
    /// whitespace.
    pub fn new(address: impl Into<String>) -> Result<Self, NodeAddressError> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(NodeAddressError::Empty);
        }
        Ok(Self(address))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeAddress {
    type Err = NodeAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = NodeAddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeAddress> for String {
    fn from(address: NodeAddress) -> Self {
        address.0
    }
}

/// A device known to a controller.
///
/// Created and removed by the controller; the bridge only reads the
/// address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    /// Network address of the node.
    pub address: NodeAddress,
}

impl Node {
    /// Creates a node view for the given address.
    #[must_use]
    pub const fn new(address: NodeAddress) -> Self {
        Self { address }
    }
}
