//! Hart state-machine errors.

use core::fmt;

use rpmi_wire::Status;

use crate::HartState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HsmError {
    /// Hart id not in this instance's table.
    UnknownHart(u32),
    /// Operation already satisfied or in flight for this hart.
    Already { hart_id: u32, state: HartState },
    /// Operation not permitted from the hart's current state.
    Denied { hart_id: u32, state: HartState },
    /// Suspend type id not in the suspend-type table.
    UnknownSuspendType(u32),
    /// The platform does not implement the required callback.
    NotSupported,
    /// No harts were supplied at construction.
    NoHarts,
    /// The same hart id appears twice in the table.
    DuplicateHart(u32),
    /// A composite was built without children.
    NoChildren,
    /// A child's suspend-type table differs from the first child's.
    SuspendTypeMismatch { child: usize },
    /// A platform callback failed with the given status.
    Platform(Status),
}

impl HsmError {
    /// Wire status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            Self::UnknownHart(_) | Self::UnknownSuspendType(_) => Status::InvalidParam,
            Self::Already { .. } => Status::Already,
            Self::Denied { .. } => Status::Denied,
            Self::NotSupported => Status::NotSupported,
            Self::NoHarts | Self::DuplicateHart(_) | Self::NoChildren => Status::InvalidParam,
            Self::SuspendTypeMismatch { .. } => Status::InvalidParam,
            Self::Platform(s) => *s,
        }
    }
}

impl fmt::Display for HsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownHart(id) => write!(f, "unknown hart id {}", id),
            Self::Already { hart_id, state } => {
                write!(f, "hart {} already {}", hart_id, state)
            }
            Self::Denied { hart_id, state } => {
                write!(f, "operation not allowed for hart {} in state {}", hart_id, state)
            }
            Self::UnknownSuspendType(id) => write!(f, "unknown suspend type {}", id),
            Self::NotSupported => write!(f, "platform callback not supported"),
            Self::NoHarts => write!(f, "hart table is empty"),
            Self::DuplicateHart(id) => write!(f, "duplicate hart id {}", id),
            Self::NoChildren => write!(f, "composite has no children"),
            Self::SuspendTypeMismatch { child } => {
                write!(f, "child {} suspend-type table differs from child 0", child)
            }
            Self::Platform(s) => write!(f, "platform callback failed: {}", s),
        }
    }
}

impl std::error::Error for HsmError {}
