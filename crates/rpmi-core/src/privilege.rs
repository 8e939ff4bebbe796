//! Privilege levels and group privilege gating.

use core::fmt;

use bitflags::bitflags;

/// Privilege level a context executes requests under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrivilegeLevel {
    /// Machine mode.
    Machine,
    /// Supervisor mode.
    Supervisor,
}

impl PrivilegeLevel {
    /// The bitmap bit for this level.
    pub fn mask(self) -> PrivilegeMask {
        match self {
            PrivilegeLevel::Machine => PrivilegeMask::MACHINE,
            PrivilegeLevel::Supervisor => PrivilegeMask::SUPERVISOR,
        }
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivilegeLevel::Machine => write!(f, "M-mode"),
            PrivilegeLevel::Supervisor => write!(f, "S-mode"),
        }
    }
}

bitflags! {
    /// Levels a service group may be registered under.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PrivilegeMask: u32 {
        const MACHINE = 1 << 0;
        const SUPERVISOR = 1 << 1;
    }
}

impl PrivilegeMask {
    /// Groups usable from any level.
    pub const ANY: PrivilegeMask = PrivilegeMask::MACHINE.union(PrivilegeMask::SUPERVISOR);

    /// True when the bitmap admits `level`.
    pub fn permits(self, level: PrivilegeLevel) -> bool {
        self.contains(level.mask())
    }
}
