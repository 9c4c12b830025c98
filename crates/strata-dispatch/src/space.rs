//! Memory space identities

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an accelerator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Create a new device id
    pub const fn new(id: u32) -> Self {
        DeviceId(id)
    }

    /// Get the ordinal
    pub const fn ordinal(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device{}", self.0)
    }
}

/// Where a sequence lives and where work on it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Space {
    /// Host memory, sequential host execution
    Host,
    /// Memory owned by one accelerator
    Device(DeviceId),
}

impl Space {
    pub const fn is_host(self) -> bool {
        matches!(self, Space::Host)
    }

    pub const fn is_device(self) -> bool {
        matches!(self, Space::Device(_))
    }

    /// Device id when this is a device space
    pub const fn device(self) -> Option<DeviceId> {
        match self {
            Space::Device(id) => Some(id),
            Space::Host => None,
        }
    }

    /// Whether bytes written by this space can be read as-is by `other`.
    ///
    /// All spaces in this runtime share endianness, pointer width and
    /// alignment rules, so the byte image of a value is portable between them.
    pub const fn shares_byte_layout_with(self, other: Space) -> bool {
        match (self, other) {
            (Space::Host, _) | (_, Space::Host) => true,
            (Space::Device(_), Space::Device(_)) => true,
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Host => f.write_str("host"),
            Space::Device(id) => write!(f, "{id}"),
        }
    }
}
