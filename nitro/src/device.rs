//! Identity of a discovered hub.

use std::fmt;

use nitro_proto::DeviceInfo;
use serde::{Deserialize, Serialize};

/// Immutable identity of a remote hub, as chosen by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Radio address (opaque to the session).
    address: String,
    /// Human-readable name.
    name: String,
}

impl DeviceDescriptor {
    /// Creates a descriptor.
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    /// The radio address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The display name; falls back to the address for unnamed peers.
    pub fn name(&self) -> &str {
        if self.name.is_empty() {
            &self.address
        } else {
            &self.name
        }
    }

    /// Returns `true` if the peer advertised a usable name.
    pub fn is_named(&self) -> bool {
        !self.name.is_empty() && self.name != "Unknown"
    }
}

impl From<DeviceInfo> for DeviceDescriptor {
    fn from(info: DeviceInfo) -> Self {
        Self::new(info.address, info.name)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name(), self.address)
    }
}
