//! Hart states and suspend-type descriptors.

use core::fmt;

/// Cached lifecycle state of one hart.
///
/// `Uninit` means the hart has not been polled from hardware yet; the first
/// pass of the event pump replaces it with the observed state.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HartState {
    Uninit = -1,
    Started = 0,
    Stopped = 1,
    Suspended = 2,
    StartPending = 3,
    StopPending = 4,
    SuspendPending = 5,
}

impl HartState {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            -1 => HartState::Uninit,
            0 => HartState::Started,
            1 => HartState::Stopped,
            2 => HartState::Suspended,
            3 => HartState::StartPending,
            4 => HartState::StopPending,
            5 => HartState::SuspendPending,
            _ => return None,
        })
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Two's-complement wire representation.
    pub fn as_u32(self) -> u32 {
        self as i32 as u32
    }

    pub fn is_pending(self) -> bool {
        matches!(
            self,
            HartState::StartPending | HartState::StopPending | HartState::SuspendPending
        )
    }
}

impl fmt::Display for HartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HartState::Uninit => "uninit",
            HartState::Started => "started",
            HartState::Stopped => "stopped",
            HartState::Suspended => "suspended",
            HartState::StartPending => "start-pending",
            HartState::StopPending => "stop-pending",
            HartState::SuspendPending => "suspend-pending",
        };
        f.write_str(s)
    }
}

/// State the platform hardware reports for a hart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HwState {
    Started,
    Stopped,
    Suspended,
}

impl fmt::Display for HwState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HwState::Started => write!(f, "started"),
            HwState::Stopped => write!(f, "stopped"),
            HwState::Suspended => write!(f, "suspended"),
        }
    }
}

/// One platform-defined suspend state.
///
/// Latencies and residency are microseconds. Composite instances require
/// every child to publish an identical table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuspendType {
    pub id: u32,
    pub flags: u32,
    pub entry_latency_us: u32,
    pub exit_latency_us: u32,
    pub wakeup_latency_us: u32,
    pub min_residency_us: u32,
}

impl SuspendType {
    /// A zero-latency default suspend state with the given id.
    pub fn simple(id: u32) -> Self {
        Self {
            id,
            flags: 0,
            entry_latency_us: 0,
            exit_latency_us: 0,
            wakeup_latency_us: 0,
            min_residency_us: 0,
        }
    }
}
