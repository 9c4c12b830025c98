//! Error types for dispatch operations

use std::fmt;

use crate::space::Space;

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Status reported by a device queue when a primitive fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueStatus {
    /// The kernel was rejected before any index ran
    LaunchFailure,
    /// The kernel ran and faulted; reported at synchronization
    ExecutionFault,
    /// A byte copy between spaces failed
    CopyFault,
}

impl QueueStatus {
    /// Numeric code, stable across releases
    pub const fn code(self) -> u32 {
        match self {
            Self::LaunchFailure => 1,
            Self::ExecutionFault => 2,
            Self::CopyFault => 3,
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LaunchFailure => "launch failure",
            Self::ExecutionFault => "execution fault",
            Self::CopyFault => "copy fault",
        };
        write!(f, "{name} (status {})", self.code())
    }
}

/// Errors that can occur while relocating or transforming sequences
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A copy, launch or synchronization primitive reported a failure
    #[error("{operation}: {status}")]
    Transport {
        operation: &'static str,
        status: QueueStatus,
    },

    /// Device or staging allocation could not be satisfied
    #[error("out of memory: requested {requested} bytes, {available} bytes available")]
    OutOfMemory { requested: usize, available: usize },

    /// A sequence view does not live in the space of the context it was used with
    #[error("space mismatch: context runs in {expected}, sequence lives in {actual}")]
    SpaceMismatch { expected: Space, actual: Space },

    /// A sequence is shorter than the element count of the call
    #[error("{role} sequence too short: need {required} elements, have {actual}")]
    RangeTooShort {
        role: &'static str,
        required: usize,
        actual: usize,
    },

    /// A staging buffer was filled while it still owned elements
    #[error("staging buffer already owns {owned} elements")]
    StagingOccupied { owned: usize },

    /// An allocation handle was freed twice or never issued
    #[error("unknown allocation handle {0}")]
    UnknownAllocation(u64),

    /// Configuration could not be parsed or is inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a transport error for `operation`
    pub fn transport(operation: &'static str, status: QueueStatus) -> Self {
        Self::Transport { operation, status }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether this error came from the device queue
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::OutOfMemory { .. })
    }
}

pub(crate) fn ensure_len(role: &'static str, required: usize, actual: usize) -> Result<()> {
    if actual < required {
        return Err(Error::RangeTooShort {
            role,
            required,
            actual,
        });
    }
    Ok(())
}

pub(crate) fn ensure_space(expected: Space, actual: Space) -> Result<()> {
    if expected != actual {
        return Err(Error::SpaceMismatch { expected, actual });
    }
    Ok(())
}
