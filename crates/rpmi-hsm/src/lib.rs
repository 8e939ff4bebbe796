//! Hart state management.
//!
//! Tracks the lifecycle of every hart behind a platform-management channel:
//! cached states with pending transitions, hardware polling to finalize
//! them, and platform callbacks at the edges. An instance is either a
//! [`HsmLeaf`] (a hart table plus callbacks) or a [`HsmComposite`] (an
//! ordered set of child instances); [`Hsm`] is the public face of both.
//!
//! No threads and no waiting: `process_state_changes` polls once and
//! returns, and callers drive it from their event pump.

#![forbid(unsafe_code)]

mod composite;
mod error;
mod leaf;
mod platform;
mod state;

pub use composite::HsmComposite;
pub use error::HsmError;
pub use leaf::HsmLeaf;
pub use platform::HsmPlatform;
pub use state::{HartState, HwState, SuspendType};

/// A hart-state manager: one hart table with callbacks, or a tree of them.
pub enum Hsm {
    Leaf(HsmLeaf),
    Composite(HsmComposite),
}

impl Hsm {
    /// Total number of harts managed by this instance.
    pub fn hart_count(&self) -> usize {
        match self {
            Hsm::Leaf(leaf) => leaf.hart_count(),
            Hsm::Composite(c) => c.hart_count(),
        }
    }

    /// Library-assigned index to platform hart id.
    pub fn hart_index_to_id(&self, index: usize) -> Option<u32> {
        match self {
            Hsm::Leaf(leaf) => leaf.hart_index_to_id(index),
            Hsm::Composite(c) => c.hart_index_to_id(index),
        }
    }

    /// Platform hart id to library-assigned index.
    pub fn hart_id_to_index(&self, hart_id: u32) -> Option<usize> {
        match self {
            Hsm::Leaf(leaf) => leaf.hart_id_to_index(hart_id),
            Hsm::Composite(c) => c.hart_id_to_index(hart_id),
        }
    }

    /// Cached state of a hart; no hardware access.
    pub fn get_state(&self, hart_id: u32) -> Result<HartState, HsmError> {
        match self {
            Hsm::Leaf(leaf) => leaf.get_state(hart_id),
            Hsm::Composite(c) => c.get_state(hart_id),
        }
    }

    /// Bring a stopped hart up at `start_addr`.
    pub fn start(&self, hart_id: u32, start_addr: u64) -> Result<(), HsmError> {
        match self {
            Hsm::Leaf(leaf) => leaf.start(hart_id, start_addr),
            Hsm::Composite(c) => c.start(hart_id, start_addr),
        }
    }

    /// Take a started hart down.
    pub fn stop(&self, hart_id: u32) -> Result<(), HsmError> {
        match self {
            Hsm::Leaf(leaf) => leaf.stop(hart_id),
            Hsm::Composite(c) => c.stop(hart_id),
        }
    }

    /// Put a started hart into a suspend state.
    pub fn suspend(
        &self,
        hart_id: u32,
        suspend_type_id: u32,
        resume_addr: u64,
    ) -> Result<(), HsmError> {
        match self {
            Hsm::Leaf(leaf) => leaf.suspend(hart_id, suspend_type_id, resume_addr),
            Hsm::Composite(c) => c.suspend(hart_id, suspend_type_id, resume_addr),
        }
    }

    /// Number of platform suspend states.
    pub fn suspend_type_count(&self) -> usize {
        match self {
            Hsm::Leaf(leaf) => leaf.suspend_types().len(),
            Hsm::Composite(c) => c.suspend_type_count(),
        }
    }

    /// Suspend-type descriptor by table position.
    pub fn suspend_type_at(&self, index: usize) -> Option<SuspendType> {
        match self {
            Hsm::Leaf(leaf) => leaf.suspend_types().get(index).copied(),
            Hsm::Composite(c) => c.suspend_type_at(index),
        }
    }

    /// Suspend-type descriptor by id.
    pub fn find_suspend_type(&self, id: u32) -> Option<SuspendType> {
        (0..self.suspend_type_count())
            .filter_map(|i| self.suspend_type_at(i))
            .find(|t| t.id == id)
    }

    /// Poll hardware for every hart (recursing into children) and advance
    /// pending transitions.
    pub fn process_state_changes(&self) {
        match self {
            Hsm::Leaf(leaf) => leaf.process_state_changes(),
            Hsm::Composite(c) => c.process_state_changes(),
        }
    }
}
