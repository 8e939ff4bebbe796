//! Leaf hart-state manager: a hart table driven by platform callbacks.

use parking_lot::Mutex;

use crate::{HartState, HsmError, HsmPlatform, HwState, SuspendType};

/// Lock-protected record for one hart.
#[derive(Debug)]
struct HartRecord {
    state: HartState,
    start_addr: u64,
    suspend_type: Option<u32>,
    resume_addr: u64,
}

impl HartRecord {
    fn new() -> Self {
        Self {
            state: HartState::Uninit,
            start_addr: 0,
            suspend_type: None,
            resume_addr: 0,
        }
    }
}

/// A leaf instance: hart-id table, per-hart records, suspend types and the
/// platform that actually moves the harts.
pub struct HsmLeaf {
    hart_ids: Vec<u32>,
    harts: Vec<Mutex<HartRecord>>,
    suspend_types: Vec<SuspendType>,
    platform: Box<dyn HsmPlatform>,
}

impl HsmLeaf {
    pub fn new(
        hart_ids: Vec<u32>,
        suspend_types: Vec<SuspendType>,
        platform: Box<dyn HsmPlatform>,
    ) -> Result<Self, HsmError> {
        if hart_ids.is_empty() {
            return Err(HsmError::NoHarts);
        }
        for (i, id) in hart_ids.iter().enumerate() {
            if hart_ids[..i].contains(id) {
                return Err(HsmError::DuplicateHart(*id));
            }
        }
        let harts = hart_ids.iter().map(|_| Mutex::new(HartRecord::new())).collect();
        Ok(Self {
            hart_ids,
            harts,
            suspend_types,
            platform,
        })
    }

    #[inline]
    pub fn hart_count(&self) -> usize {
        self.hart_ids.len()
    }

    pub fn hart_index_to_id(&self, index: usize) -> Option<u32> {
        self.hart_ids.get(index).copied()
    }

    // The table is small; a scan beats carrying an index map.
    pub fn hart_id_to_index(&self, hart_id: u32) -> Option<usize> {
        self.hart_ids.iter().position(|&id| id == hart_id)
    }

    #[inline]
    pub fn suspend_types(&self) -> &[SuspendType] {
        &self.suspend_types
    }

    pub fn find_suspend_type(&self, id: u32) -> Option<&SuspendType> {
        self.suspend_types.iter().find(|t| t.id == id)
    }

    fn record(&self, hart_id: u32) -> Result<&Mutex<HartRecord>, HsmError> {
        let index = self
            .hart_id_to_index(hart_id)
            .ok_or(HsmError::UnknownHart(hart_id))?;
        Ok(&self.harts[index])
    }

    pub fn get_state(&self, hart_id: u32) -> Result<HartState, HsmError> {
        Ok(self.record(hart_id)?.lock().state)
    }

    /// Bring a stopped hart up at `start_addr`.
    pub fn start(&self, hart_id: u32, start_addr: u64) -> Result<(), HsmError> {
        let record = self.record(hart_id)?;
        let mut rec = record.lock();
        match rec.state {
            HartState::Started | HartState::StartPending => {
                return Err(HsmError::Already {
                    hart_id,
                    state: rec.state,
                });
            }
            HartState::Stopped => {}
            state => return Err(HsmError::Denied { hart_id, state }),
        }

        self.platform.hart_start_prepare(hart_id, start_addr)?;
        rec.start_addr = start_addr;
        rec.state = HartState::StartPending;
        tracing::debug!(hart_id, start_addr, "hart start pending");
        self.progress(hart_id, &mut rec);
        Ok(())
    }

    /// Take a started hart down.
    pub fn stop(&self, hart_id: u32) -> Result<(), HsmError> {
        let record = self.record(hart_id)?;
        let mut rec = record.lock();
        match rec.state {
            HartState::Stopped | HartState::StopPending => {
                return Err(HsmError::Already {
                    hart_id,
                    state: rec.state,
                });
            }
            HartState::Started => {}
            state => return Err(HsmError::Denied { hart_id, state }),
        }

        self.platform.hart_stop_prepare(hart_id)?;
        rec.state = HartState::StopPending;
        tracing::debug!(hart_id, "hart stop pending");
        self.progress(hart_id, &mut rec);
        Ok(())
    }

    /// Put a started hart into `suspend_type_id`, resuming at
    /// `resume_addr`.
    pub fn suspend(
        &self,
        hart_id: u32,
        suspend_type_id: u32,
        resume_addr: u64,
    ) -> Result<(), HsmError> {
        let suspend_type = *self
            .find_suspend_type(suspend_type_id)
            .ok_or(HsmError::UnknownSuspendType(suspend_type_id))?;

        let record = self.record(hart_id)?;
        let mut rec = record.lock();
        match rec.state {
            HartState::Suspended | HartState::SuspendPending => {
                return Err(HsmError::Already {
                    hart_id,
                    state: rec.state,
                });
            }
            HartState::Started => {}
            state => return Err(HsmError::Denied { hart_id, state }),
        }

        self.platform
            .hart_suspend_prepare(hart_id, &suspend_type, resume_addr)?;
        rec.suspend_type = Some(suspend_type_id);
        rec.resume_addr = resume_addr;
        rec.state = HartState::SuspendPending;
        tracing::debug!(hart_id, suspend_type_id, "hart suspend pending");
        self.progress(hart_id, &mut rec);
        Ok(())
    }

    /// Poll hardware for every hart and advance pending transitions.
    pub fn process_state_changes(&self) {
        for (index, record) in self.harts.iter().enumerate() {
            let hart_id = self.hart_ids[index];
            let mut rec = record.lock();
            self.progress(hart_id, &mut rec);
        }
    }

    /// One progress step against the observed hardware state. Finalize
    /// hooks fire exactly here, on the pending-to-terminal edge.
    fn progress(&self, hart_id: u32, rec: &mut HartRecord) {
        let hw = match self.platform.hart_get_hw_state(hart_id) {
            Ok(hw) => hw,
            Err(err) => {
                tracing::warn!(hart_id, %err, "hardware state poll failed");
                return;
            }
        };

        let next = match (rec.state, hw) {
            (HartState::Uninit, HwState::Started) => HartState::Started,
            (HartState::Uninit, HwState::Stopped) => HartState::Stopped,
            (HartState::Uninit, HwState::Suspended) => HartState::Suspended,
            (HartState::StartPending, HwState::Started) => {
                self.platform.hart_start_finalize(hart_id, rec.start_addr);
                HartState::Started
            }
            (HartState::StopPending, HwState::Stopped | HwState::Suspended) => {
                self.platform.hart_stop_finalize(hart_id);
                HartState::Stopped
            }
            (HartState::SuspendPending, HwState::Suspended) => {
                if let Some(ty) = rec.suspend_type.and_then(|id| self.find_suspend_type(id)) {
                    self.platform
                        .hart_suspend_finalize(hart_id, ty, rec.resume_addr);
                }
                HartState::Suspended
            }
            // A suspended hart the hardware reports running again resumed
            // on its own (wakeup event); no finalize.
            (HartState::Suspended, HwState::Started) => HartState::Started,
            (state, _) => state,
        };

        if next != rec.state {
            tracing::debug!(hart_id, from = %rec.state, to = %next, "hart state change");
            rec.state = next;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Platform whose hardware states the test scripts by hand.
    pub(crate) struct FakePlatform {
        pub hw: Mutex<HashMap<u32, HwState>>,
        pub start_finalized: AtomicU32,
        pub stop_finalized: AtomicU32,
        pub suspend_finalized: AtomicU32,
        pub fail_start_prepare: bool,
    }

    impl FakePlatform {
        pub fn new(harts: &[u32], initial: HwState) -> Arc<Self> {
            Arc::new(Self {
                hw: Mutex::new(harts.iter().map(|&h| (h, initial)).collect()),
                start_finalized: AtomicU32::new(0),
                stop_finalized: AtomicU32::new(0),
                suspend_finalized: AtomicU32::new(0),
                fail_start_prepare: false,
            })
        }

        pub fn set_hw(&self, hart_id: u32, state: HwState) {
            self.hw.lock().insert(hart_id, state);
        }
    }

    impl HsmPlatform for Arc<FakePlatform> {
        fn hart_get_hw_state(&self, hart_id: u32) -> Result<HwState, HsmError> {
            self.hw
                .lock()
                .get(&hart_id)
                .copied()
                .ok_or(HsmError::UnknownHart(hart_id))
        }

        fn hart_start_prepare(&self, _hart_id: u32, _addr: u64) -> Result<(), HsmError> {
            if self.fail_start_prepare {
                return Err(HsmError::Platform(rpmi_wire::Status::HwFault));
            }
            Ok(())
        }

        fn hart_start_finalize(&self, _hart_id: u32, _addr: u64) {
            self.start_finalized.fetch_add(1, Ordering::Relaxed);
        }

        fn hart_stop_prepare(&self, _hart_id: u32) -> Result<(), HsmError> {
            Ok(())
        }

        fn hart_stop_finalize(&self, _hart_id: u32) {
            self.stop_finalized.fetch_add(1, Ordering::Relaxed);
        }

        fn hart_suspend_prepare(
            &self,
            _hart_id: u32,
            _ty: &SuspendType,
            _addr: u64,
        ) -> Result<(), HsmError> {
            Ok(())
        }

        fn hart_suspend_finalize(&self, _hart_id: u32, _ty: &SuspendType, _addr: u64) {
            self.suspend_finalized.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn leaf(
        harts: &[u32],
        initial: HwState,
    ) -> (HsmLeaf, Arc<FakePlatform>) {
        let platform = FakePlatform::new(harts, initial);
        let hsm = HsmLeaf::new(
            harts.to_vec(),
            vec![SuspendType::simple(0), SuspendType::simple(1)],
            Box::new(platform.clone()),
        )
        .unwrap();
        (hsm, platform)
    }

    #[test]
    fn construction_validates_hart_table() {
        let platform = FakePlatform::new(&[], HwState::Stopped);
        assert_eq!(
            HsmLeaf::new(vec![], vec![], Box::new(platform.clone())).err(),
            Some(HsmError::NoHarts)
        );
        assert_eq!(
            HsmLeaf::new(vec![0, 1, 0], vec![], Box::new(platform)).err(),
            Some(HsmError::DuplicateHart(0))
        );
    }

    #[test]
    fn index_id_mappings() {
        let (hsm, _) = leaf(&[10, 20, 30], HwState::Stopped);
        assert_eq!(hsm.hart_count(), 3);
        assert_eq!(hsm.hart_index_to_id(1), Some(20));
        assert_eq!(hsm.hart_index_to_id(3), None);
        assert_eq!(hsm.hart_id_to_index(30), Some(2));
        assert_eq!(hsm.hart_id_to_index(99), None);
    }

    #[test]
    fn first_poll_publishes_hardware_state() {
        let (hsm, _) = leaf(&[0, 1], HwState::Started);
        assert_eq!(hsm.get_state(0).unwrap(), HartState::Uninit);
        hsm.process_state_changes();
        assert_eq!(hsm.get_state(0).unwrap(), HartState::Started);
        assert_eq!(hsm.get_state(1).unwrap(), HartState::Started);
    }

    #[test]
    fn start_from_stopped_completes_when_hw_reports_started() {
        let (hsm, platform) = leaf(&[0], HwState::Stopped);
        hsm.process_state_changes();

        // Hardware stays stopped after prepare, so the transition parks in
        // start-pending.
        hsm.start(0, 0x8000_0000).unwrap();
        assert_eq!(hsm.get_state(0).unwrap(), HartState::StartPending);
        assert_eq!(platform.start_finalized.load(Ordering::Relaxed), 0);

        platform.set_hw(0, HwState::Started);
        hsm.process_state_changes();
        assert_eq!(hsm.get_state(0).unwrap(), HartState::Started);
        assert_eq!(platform.start_finalized.load(Ordering::Relaxed), 1);

        // Finalize fires exactly once.
        hsm.process_state_changes();
        assert_eq!(platform.start_finalized.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn start_completes_immediately_if_hw_is_fast() {
        let (hsm, platform) = leaf(&[0], HwState::Stopped);
        hsm.process_state_changes();
        // Hardware flips before the initiator's progress step runs.
        platform.set_hw(0, HwState::Started);
        hsm.start(0, 0x1000).unwrap();
        assert_eq!(hsm.get_state(0).unwrap(), HartState::Started);
        assert_eq!(platform.start_finalized.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn start_error_taxonomy() {
        let (hsm, platform) = leaf(&[0], HwState::Started);
        hsm.process_state_changes();
        assert_eq!(
            hsm.start(0, 0).unwrap_err(),
            HsmError::Already {
                hart_id: 0,
                state: HartState::Started
            }
        );

        platform.set_hw(0, HwState::Suspended);
        hsm.stop(0).unwrap();
        // Stop-pending resolves to stopped via the suspended column too.
        assert_eq!(hsm.get_state(0).unwrap(), HartState::Stopped);

        assert_eq!(
            hsm.suspend(0, 0, 0).unwrap_err(),
            HsmError::Denied {
                hart_id: 0,
                state: HartState::Stopped
            }
        );
        assert_eq!(hsm.start(99, 0).unwrap_err(), HsmError::UnknownHart(99));
    }

    #[test]
    fn prepare_failure_propagates_and_leaves_state() {
        let failing = Arc::new(FakePlatform {
            hw: Mutex::new([(0, HwState::Stopped)].into_iter().collect()),
            start_finalized: AtomicU32::new(0),
            stop_finalized: AtomicU32::new(0),
            suspend_finalized: AtomicU32::new(0),
            fail_start_prepare: true,
        });
        let hsm = HsmLeaf::new(
            vec![0],
            vec![SuspendType::simple(0)],
            Box::new(failing),
        )
        .unwrap();
        hsm.process_state_changes();
        assert_eq!(
            hsm.start(0, 0).unwrap_err(),
            HsmError::Platform(rpmi_wire::Status::HwFault)
        );
        assert_eq!(hsm.get_state(0).unwrap(), HartState::Stopped);
    }

    #[test]
    fn stop_then_stop_reports_already() {
        let (hsm, platform) = leaf(&[0], HwState::Started);
        hsm.process_state_changes();

        platform.set_hw(0, HwState::Stopped);
        hsm.stop(0).unwrap();
        assert_eq!(hsm.get_state(0).unwrap(), HartState::Stopped);
        assert_eq!(platform.stop_finalized.load(Ordering::Relaxed), 1);

        assert_eq!(
            hsm.stop(0).unwrap_err(),
            HsmError::Already {
                hart_id: 0,
                state: HartState::Stopped
            }
        );
    }

    #[test]
    fn suspend_and_self_resume() {
        let (hsm, platform) = leaf(&[0], HwState::Started);
        hsm.process_state_changes();

        hsm.suspend(0, 1, 0x2000).unwrap();
        assert_eq!(hsm.get_state(0).unwrap(), HartState::SuspendPending);

        platform.set_hw(0, HwState::Suspended);
        hsm.process_state_changes();
        assert_eq!(hsm.get_state(0).unwrap(), HartState::Suspended);
        assert_eq!(platform.suspend_finalized.load(Ordering::Relaxed), 1);

        // Wakeup: hardware reports started again.
        platform.set_hw(0, HwState::Started);
        hsm.process_state_changes();
        assert_eq!(hsm.get_state(0).unwrap(), HartState::Started);
    }

    #[test]
    fn suspend_rejects_unknown_type() {
        let (hsm, _) = leaf(&[0], HwState::Started);
        hsm.process_state_changes();
        assert_eq!(
            hsm.suspend(0, 7, 0).unwrap_err(),
            HsmError::UnknownSuspendType(7)
        );
    }
}
