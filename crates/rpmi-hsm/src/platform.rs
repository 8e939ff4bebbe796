//! Platform callbacks for a leaf hart-state manager.

use crate::{HsmError, HwState, SuspendType};

/// Hardware operations the embedder supplies for a leaf instance.
///
/// `hart_get_hw_state` is the only mandatory operation; the prepare hooks
/// default to "not supported", which disables the corresponding request,
/// and the finalize hooks default to no-ops.
///
/// Callbacks run with the targeted hart's lock held and must not re-enter
/// the same instance.
pub trait HsmPlatform: Send + Sync {
    /// Current hardware state of the hart.
    fn hart_get_hw_state(&self, hart_id: u32) -> Result<HwState, HsmError>;

    /// Arrange for the hart to begin executing at `start_addr`.
    fn hart_start_prepare(&self, _hart_id: u32, _start_addr: u64) -> Result<(), HsmError> {
        Err(HsmError::NotSupported)
    }

    /// Called once when a started hart leaves the start-pending state.
    fn hart_start_finalize(&self, _hart_id: u32, _start_addr: u64) {}

    /// Arrange for the hart to stop.
    fn hart_stop_prepare(&self, _hart_id: u32) -> Result<(), HsmError> {
        Err(HsmError::NotSupported)
    }

    /// Called once when a stopped hart leaves the stop-pending state.
    fn hart_stop_finalize(&self, _hart_id: u32) {}

    /// Arrange for the hart to enter `suspend_type`, resuming at
    /// `resume_addr`.
    fn hart_suspend_prepare(
        &self,
        _hart_id: u32,
        _suspend_type: &SuspendType,
        _resume_addr: u64,
    ) -> Result<(), HsmError> {
        Err(HsmError::NotSupported)
    }

    /// Called once when a suspended hart leaves the suspend-pending state.
    fn hart_suspend_finalize(
        &self,
        _hart_id: u32,
        _suspend_type: &SuspendType,
        _resume_addr: u64,
    ) {
    }
}
